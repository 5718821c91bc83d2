/// Configuration management for the image resizer
///
/// Loads configuration from environment variables with sensible defaults.
/// Malformed values fall back to the default instead of failing startup.
use redis_utils::RedisSettings;
use std::time::Duration;
use task_queue::{EnqueueOptions, WorkerConfig};

#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppConfig,
    pub redis: RedisConfig,
    pub http: HttpConfig,
    pub server: ServerConfig,
    pub worker: WorkerSettings,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Lower-cased environment name
    pub env: String,
    /// Debug mode makes an unreachable Redis fatal at startup
    pub debug: bool,
}

#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub addr: String,
    pub password: String,
    pub db: i64,
    pub ttl: Duration,
}

#[derive(Clone, Debug)]
pub struct HttpConfig {
    /// Outbound fetch timeout
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen port, `:8080` or `8080` or `host:port`
    pub port: String,
}

#[derive(Clone, Debug)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub max_retry: u32,
    pub task_timeout: Duration,
    pub queue_name: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let int = |key: &str, default: i64| -> i64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        let positive = |key: &str, default: u64| -> u64 {
            u64::try_from(int(key, default as i64))
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };

        Config {
            app: AppConfig {
                env: string("APP_ENV", "development").to_lowercase(),
                debug: parse_bool(lookup("APP_DEBUG").as_deref(), true),
            },
            redis: RedisConfig {
                addr: string("REDIS_ADDR", "localhost:6379"),
                password: string("REDIS_PASSWORD", ""),
                db: int("REDIS_DB", 0),
                ttl: Duration::from_secs(positive("REDIS_TTL_HOURS", 1) * 3600),
            },
            http: HttpConfig {
                timeout: Duration::from_secs(positive("HTTP_TIMEOUT_SECONDS", 10)),
            },
            server: ServerConfig {
                port: string("SERVER_PORT", ":8080"),
            },
            worker: WorkerSettings {
                concurrency: positive("WORKER_CONCURRENCY", 5) as usize,
                max_retry: u32::try_from(positive("WORKER_MAX_RETRY", 3)).unwrap_or(3),
                task_timeout: Duration::from_secs(positive("WORKER_TASK_TIMEOUT_SECONDS", 60)),
                queue_name: lookup("WORKER_QUEUE_NAME")
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| "images".to_string()),
            },
        }
    }

    pub fn is_production(&self) -> bool {
        self.app.env == "production"
    }

    /// Log the loaded configuration with the Redis password masked.
    pub fn log_summary(&self) {
        tracing::info!(
            env = %self.app.env,
            debug = self.app.debug,
            redis_addr = %self.redis.addr,
            redis_password = %mask(&self.redis.password),
            redis_db = self.redis.db,
            redis_ttl_secs = self.redis.ttl.as_secs(),
            http_timeout_secs = self.http.timeout.as_secs(),
            server_port = %self.server.port,
            worker_concurrency = self.worker.concurrency,
            worker_max_retry = self.worker.max_retry,
            worker_task_timeout_secs = self.worker.task_timeout.as_secs(),
            worker_queue = %self.worker.queue_name,
            "Configuration loaded"
        );
    }
}

impl RedisConfig {
    pub fn settings(&self) -> RedisSettings {
        RedisSettings::new(self.addr.clone(), Some(self.password.clone()), self.db)
    }
}

impl ServerConfig {
    /// Socket address to bind. A bare `:port` binds all interfaces.
    pub fn bind_address(&self) -> String {
        let port = self.port.trim();
        if let Some(port) = port.strip_prefix(':') {
            format!("0.0.0.0:{port}")
        } else if port.contains(':') {
            port.to_string()
        } else {
            format!("0.0.0.0:{port}")
        }
    }
}

impl WorkerSettings {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: self.concurrency,
            queue_name: self.queue_name.clone(),
            max_retry: self.max_retry,
            task_timeout: self.task_timeout,
            ..Default::default()
        }
    }

    /// Options stamped on every task the server submits
    pub fn enqueue_options(&self) -> EnqueueOptions {
        EnqueueOptions {
            max_retry: self.max_retry,
            timeout: self.task_timeout,
        }
    }
}

fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on" | "da") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "********"
    }
}
