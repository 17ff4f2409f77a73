#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use dotenv::dotenv;
use poem_mcpserver::McpServer;

use ssh_relay::relay::audit::TracingAuditSink;
use ssh_relay::relay::commands::{DefaultEngine, RelayTools};
use ssh_relay::relay::config::RelayConfig;
use ssh_relay::relay::transport::SshConnector;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = RelayConfig::from_env();
    let connector = SshConnector::new(config.transport.clone());
    let engine: Arc<DefaultEngine> =
        Arc::new(DefaultEngine::new(config, connector, TracingAuditSink));

    poem_mcpserver::stdio::stdio(McpServer::new().tools(RelayTools::new(engine))).await?;
    Ok(())
}
