use anyhow::{Context, Result};
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Distributed run lease backed by Redis.
///
/// Guards batch work against double execution when several service instances
/// share the same schedule: `SET key token NX PX ttl` acquires, the holder
/// renews between units of work, and release only deletes the key while it
/// still carries this holder's token.
pub struct RunLease {
    client: redis::Client,
    key: String,
    token: String,
    ttl: Duration,
}

impl RunLease {
    pub fn new(client: redis::Client, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            client,
            key: key.into(),
            token: Uuid::new_v4().to_string(),
            ttl,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .context("failed to get Redis connection for run lease")
    }

    /// Try to take the lease. Returns false when another holder owns it.
    pub async fn try_acquire(&self) -> Result<bool> {
        let mut conn = self.connection().await?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg(&self.token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .context("SET NX PX failed for run lease")?;

        let acquired = reply.is_some();
        if acquired {
            debug!(key = %self.key, "run lease acquired");
        } else {
            debug!(key = %self.key, "run lease held elsewhere");
        }
        Ok(acquired)
    }

    /// Push the expiry forward. Returns false when the lease was lost
    /// (expired or taken over), in which case the caller must stop.
    pub async fn renew(&self) -> Result<bool> {
        let mut conn = self.connection().await?;

        let current: Option<String> = redis::cmd("GET")
            .arg(&self.key)
            .query_async(&mut conn)
            .await
            .context("GET failed while renewing run lease")?;

        if current.as_deref() != Some(self.token.as_str()) {
            warn!(key = %self.key, "run lease lost before renewal");
            return Ok(false);
        }

        let _: bool = redis::cmd("PEXPIRE")
            .arg(&self.key)
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .context("PEXPIRE failed while renewing run lease")?;

        Ok(true)
    }

    /// Drop the lease if this holder still owns it.
    pub async fn release(&self) -> Result<()> {
        let mut conn = self.connection().await?;

        let current: Option<String> = redis::cmd("GET")
            .arg(&self.key)
            .query_async(&mut conn)
            .await
            .context("GET failed while releasing run lease")?;

        if current.as_deref() == Some(self.token.as_str()) {
            let _: i64 = redis::cmd("DEL")
                .arg(&self.key)
                .query_async(&mut conn)
                .await
                .context("DEL failed while releasing run lease")?;
            debug!(key = %self.key, "run lease released");
        }

        Ok(())
    }
}
