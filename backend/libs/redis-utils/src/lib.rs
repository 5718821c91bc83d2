//! Redis connection bootstrap shared by the image cache and the task queue.
//!
//! Both consumers talk to the same Redis deployment but want different
//! connection shapes: the cache shares one multiplexed manager across every
//! request, while each queue worker unit needs a connection of its own so a
//! blocking pop never stalls the others.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::Client;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Handle onto the shared multiplexed connection.
///
/// The guard is released before returning; commands issued on the handle
/// never hold the mutex while waiting on Redis.
pub async fn checkout(shared: &SharedConnectionManager) -> ConnectionManager {
    shared.lock().await.clone()
}

/// How long the startup PING may take before the store is considered unreachable.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(3);

/// Address, credentials and logical database of a Redis deployment.
#[derive(Clone, Debug)]
pub struct RedisSettings {
    /// `host:port`
    pub addr: String,
    pub password: Option<String>,
    pub db: i64,
}

impl RedisSettings {
    pub fn new(addr: impl Into<String>, password: Option<String>, db: i64) -> Self {
        Self {
            addr: addr.into(),
            password: password.filter(|p| !p.is_empty()),
            db,
        }
    }

    /// Connection URL in the form understood by `redis::Client::open`.
    pub fn url(&self) -> String {
        let addr = self.host();
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}/{}",
                urlencoding::encode(password),
                addr,
                self.db
            ),
            None => format!("redis://{}/{}", addr, self.db),
        }
    }

    /// URL with the password replaced, safe to log.
    pub fn redacted_url(&self) -> String {
        match &self.password {
            Some(_) => format!("redis://:***@{}/{}", self.host(), self.db),
            None => self.url(),
        }
    }

    fn host(&self) -> &str {
        self.addr
            .trim_start_matches("redis://")
            .trim_start_matches("rediss://")
    }

    pub fn client(&self) -> Result<Client> {
        Client::open(self.url()).context("failed to construct Redis client")
    }
}

/// Redis client plus a shared connection manager that passed a PING.
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
    manager: SharedConnectionManager,
}

impl RedisPool {
    /// Connect and verify the server answers a PING within `ping_timeout`.
    pub async fn connect(settings: &RedisSettings, ping_timeout: Duration) -> Result<Self> {
        info!(addr = %settings.redacted_url(), "Checking Redis connection");

        let client = settings.client()?;
        let mut manager = timeout(ping_timeout, ConnectionManager::new(client.clone()))
            .await
            .context("timed out connecting to Redis")?
            .context("failed to initialize Redis connection manager")?;

        match timeout(ping_timeout, ping(&mut manager)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(error = %err, "Redis PING failed");
                return Err(err).context("redis ping");
            }
            Err(_) => {
                warn!(timeout = ?ping_timeout, "Redis PING timed out");
                anyhow::bail!("redis ping timed out after {:?}", ping_timeout);
            }
        }

        info!("Redis connection established");
        Ok(Self {
            client,
            manager: Arc::new(Mutex::new(manager)),
        })
    }

    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }

    /// Underlying client, for callers that need dedicated connections.
    pub fn client(&self) -> Client {
        self.client.clone()
    }
}

async fn ping(conn: &mut ConnectionManager) -> redis::RedisResult<()> {
    let reply: String = redis::cmd("PING").query_async(conn).await?;
    if reply.eq_ignore_ascii_case("PONG") {
        Ok(())
    } else {
        Err(redis::RedisError::from((
            redis::ErrorKind::ResponseError,
            "unexpected PING reply",
            reply,
        )))
    }
}
