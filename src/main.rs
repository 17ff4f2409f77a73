#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use dotenv::dotenv;
use poem::{EndpointExt, Route, Server, listener::TcpListener, middleware::Tracing};
use poem_mcpserver::{McpServer, streamable_http};
use tracing::info;

use ssh_relay::relay::audit::TracingAuditSink;
use ssh_relay::relay::commands::{DefaultEngine, RelayTools};
use ssh_relay::relay::config::RelayConfig;
use ssh_relay::relay::transport::SshConnector;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Initialize logging with proper tracing default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .init();

    let config = RelayConfig::from_env();
    info!("Relay target is {}", config.target.key());

    let connector = SshConnector::new(config.transport.clone());
    let engine: Arc<DefaultEngine> =
        Arc::new(DefaultEngine::new(config, connector, TracingAuditSink));

    // Setup MCP server
    let mcp_port: u16 = std::env::var("MCP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let mcp_addr = format!("0.0.0.0:{}", mcp_port);
    info!("Starting MCP server on {}", mcp_addr);

    // Setup the poem-mcpserver endpoint with the relay tools
    let app = Route::new()
        .at("/", {
            let engine = engine.clone();
            streamable_http::endpoint(move |_| {
                McpServer::new().tools(RelayTools::new(engine.clone()))
            })
        })
        .with(Tracing);

    info!("MCP server with SSH relay support is ready");
    info!("Use ssh_run to execute commands, ssh_upload/ssh_download to move files");

    // Run the MCP server
    Server::new(TcpListener::bind(mcp_addr))
        .name("SSH Relay Server")
        .run(app)
        .await?;

    Ok(())
}
