//! Bounded session pool with idle expiry and LIFO reuse.
//!
//! Idle sessions are kept per target key in an ordered list used as a stack:
//! the most recently returned session is handed out first. The recency bias
//! is deliberate — it keeps the hottest session warm and lets the rest age
//! toward the idle TTL, at the cost of LRU entries going stale fastest.
//!
//! Ownership discipline: a session moves out of the map on acquire and is
//! only ever held by one operation; the pool never validates liveness on
//! acquire (a dead reused session surfaces as an execution-time failure and
//! the engine discards it). Bookkeeping mutations happen under a dashmap
//! entry guard with no await inside; the actual close of evicted or excess
//! sessions runs after the guard is dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::relay::config::{PoolConfig, Target};
use crate::relay::error::RelayError;
use crate::relay::transport::{Connector, RemoteSession};

struct PoolEntry<S> {
    session: S,
    last_used: Instant,
}

/// Bounded pool of idle, authenticated sessions keyed by target.
pub struct SessionPool<C: Connector> {
    config: PoolConfig,
    connector: C,
    idle: DashMap<String, Vec<PoolEntry<C::Session>>>,
    opened: AtomicU64,
}

impl<C: Connector> SessionPool<C> {
    pub fn new(config: PoolConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            idle: DashMap::new(),
            opened: AtomicU64::new(0),
        }
    }

    /// Hand out a session for `target`: a pooled one when available (after
    /// pruning idle-expired entries), else a fresh connection.
    pub async fn acquire(&self, target: &Target) -> Result<C::Session, RelayError> {
        if !self.config.enabled {
            return self.connect_fresh(target).await;
        }

        let (expired, reused) = {
            let mut entries = self.idle.entry(target.key()).or_default();
            let now = Instant::now();

            let mut kept = Vec::with_capacity(entries.len());
            let mut expired = Vec::new();
            for entry in entries.drain(..) {
                if now.duration_since(entry.last_used) > self.config.idle_ttl {
                    expired.push(entry);
                } else {
                    kept.push(entry);
                }
            }
            *entries = kept;

            // LIFO: most recently returned first.
            (expired, entries.pop())
        };

        if !expired.is_empty() {
            debug!(count = expired.len(), "closing idle-expired sessions");
            join_all(expired.into_iter().map(|e| async move {
                e.session.close().await;
            }))
            .await;
        }

        match reused {
            Some(entry) => {
                debug!(target = %target.key(), "reusing pooled session");
                Ok(entry.session)
            }
            None => self.connect_fresh(target).await,
        }
    }

    /// Return a verifiably idle session to the pool. Closed instead when
    /// pooling is disabled or the pool is at capacity — excess capacity is
    /// never queued.
    pub async fn release(&self, target: &Target, session: C::Session) {
        if !self.config.enabled {
            session.close().await;
            return;
        }

        let overflow = {
            let mut entries = self.idle.entry(target.key()).or_default();
            if entries.len() < self.config.max_size {
                entries.push(PoolEntry {
                    session,
                    last_used: Instant::now(),
                });
                None
            } else {
                Some(session)
            }
        };

        if let Some(session) = overflow {
            debug!(target = %target.key(), "pool at capacity, closing released session");
            session.close().await;
        }
    }

    /// Close a session whose state is unknown. Never returns it to the pool.
    pub async fn discard(&self, session: C::Session) {
        session.close().await;
    }

    /// Close every pooled session and clear the pool. Idempotent.
    pub async fn shutdown(&self) {
        let mut drained = Vec::new();
        for mut entry in self.idle.iter_mut() {
            drained.append(entry.value_mut());
        }
        self.idle.clear();

        if !drained.is_empty() {
            info!(count = drained.len(), "closing pooled sessions on shutdown");
            join_all(drained.into_iter().map(|e| async move {
                e.session.close().await;
            }))
            .await;
        }
    }

    /// Number of idle sessions currently pooled across all targets.
    pub fn idle_count(&self) -> usize {
        self.idle.iter().map(|entry| entry.value().len()).sum()
    }

    /// Total sessions successfully opened over the pool's lifetime.
    pub fn opened_count(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    async fn connect_fresh(&self, target: &Target) -> Result<C::Session, RelayError> {
        debug!(target = %target.key(), "creating fresh session");
        let session = self.connector.connect(target).await?;
        // Counted only on success so the opened counter tracks sessions
        // that actually existed, not failed attempts.
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(session)
    }
}
