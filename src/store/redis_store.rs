use super::KeyValueStore;
use crate::error::{GuardError, GuardResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Cmd, FromRedisValue, IntoConnectionInfo};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Minimum gap between connection attempts while the server is down.
const RECONNECT_COOLDOWN: Duration = Duration::from_secs(1);

#[derive(Default)]
struct ConnectionState {
    connection: Option<MultiplexedConnection>,
    last_failure: Option<Instant>,
}

/// Redis-backed store over a lazily established multiplexed connection.
///
/// A connection that fails with an I/O error is dropped and re-established
/// by a later call.
pub struct RedisStore {
    client: Client,
    state: Mutex<ConnectionState>,
}

impl RedisStore {
    /// Prepare a client for `url`, using `token` as the password when supplied.
    ///
    /// Only a malformed URL is an error. An unreachable server is logged and
    /// left for later calls to retry.
    pub async fn connect(url: &str, token: Option<&str>) -> GuardResult<Self> {
        let mut info = url
            .into_connection_info()
            .map_err(|e| GuardError::Configuration(format!("Invalid store URL: {}", e)))?;
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            info.redis.password = Some(token.to_string());
        }

        let client = Client::open(info).map_err(|e| {
            GuardError::Configuration(format!("Failed to create Redis client: {}", e))
        })?;
        let store = Self {
            client,
            state: Mutex::new(ConnectionState::default()),
        };

        match store.conn().await {
            Ok(_) => info!("connected to store"),
            Err(e) => warn!(error = %e, "store unreachable at startup, continuing without it"),
        }
        Ok(store)
    }

    async fn conn(&self) -> GuardResult<MultiplexedConnection> {
        let mut state = self.state.lock().await;
        if let Some(connection) = &state.connection {
            return Ok(connection.clone());
        }
        if state
            .last_failure
            .is_some_and(|at| at.elapsed() < RECONNECT_COOLDOWN)
        {
            return Err(GuardError::Store("Redis unavailable".to_string()));
        }

        let attempt =
            tokio::time::timeout(CONNECT_TIMEOUT, self.client.get_multiplexed_async_connection())
                .await;
        match attempt {
            Ok(Ok(connection)) => {
                state.connection = Some(connection.clone());
                state.last_failure = None;
                Ok(connection)
            }
            Ok(Err(e)) => {
                state.last_failure = Some(Instant::now());
                Err(GuardError::Store(format!("Failed to connect to Redis: {}", e)))
            }
            Err(_) => {
                state.last_failure = Some(Instant::now());
                Err(GuardError::Store("Timed out connecting to Redis".to_string()))
            }
        }
    }

    /// Run `cmd`, dropping the shared connection if the failure left it broken.
    async fn query<T: FromRedisValue>(&self, name: &str, cmd: &Cmd) -> GuardResult<T> {
        let mut conn = self.conn().await?;
        match cmd.query_async(&mut conn).await {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
                    let mut state = self.state.lock().await;
                    state.connection = None;
                    state.last_failure = Some(Instant::now());
                    warn!(command = name, error = %e, "store connection lost");
                }
                Err(GuardError::Store(format!("{} failed: {}", name, e)))
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> GuardResult<Option<String>> {
        self.query("GET", redis::cmd("GET").arg(key)).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> GuardResult<()> {
        let _: String = self
            .query(
                "SETEX",
                redis::cmd("SETEX").arg(key).arg(ttl_secs.max(1)).arg(value),
            )
            .await?;
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> GuardResult<i64> {
        self.query("INCRBY", redis::cmd("INCRBY").arg(key).arg(delta))
            .await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> GuardResult<bool> {
        let updated: i64 = self
            .query("EXPIRE", redis::cmd("EXPIRE").arg(key).arg(ttl_secs))
            .await?;
        Ok(updated == 1)
    }

    async fn exists(&self, key: &str) -> GuardResult<bool> {
        let count: i64 = self.query("EXISTS", redis::cmd("EXISTS").arg(key)).await?;
        Ok(count > 0)
    }

    async fn delete(&self, key: &str) -> GuardResult<bool> {
        let deleted: i64 = self.query("DEL", redis::cmd("DEL").arg(key)).await?;
        Ok(deleted > 0)
    }

    async fn ping(&self) -> GuardResult<()> {
        let _: String = self.query("PING", &redis::cmd("PING")).await?;
        Ok(())
    }
}
