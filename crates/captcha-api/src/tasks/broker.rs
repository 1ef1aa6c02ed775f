//! Redis task broker and result backend.
//!
//! Queue: `LPUSH` on enqueue, `BRPOP` on consume (FIFO). Results are JSON
//! under a per-task key with a TTL. Connections open on first use.

use captcha_common::constants::{TASK_RESULT_TTL_SECS, redis_keys};
use captcha_common::{CaptchaError, TaskMessage, TaskResult};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::TaskRunnerConfig;

fn broker_err(e: impl std::fmt::Display) -> CaptchaError {
    CaptchaError::Broker(e.to_string())
}

#[derive(Clone)]
pub struct RedisBroker {
    config: TaskRunnerConfig,
    broker_client: redis::Client,
    backend_client: redis::Client,
    broker_conn: Arc<OnceCell<ConnectionManager>>,
    backend_conn: Arc<OnceCell<ConnectionManager>>,
}

impl RedisBroker {
    /// Validate both URLs; does not connect
    pub fn new(config: TaskRunnerConfig) -> Result<Self, CaptchaError> {
        let broker_client = redis::Client::open(config.broker_url.as_str())
            .map_err(|e| CaptchaError::Config(format!("Invalid broker URL: {}", e)))?;
        let backend_client = redis::Client::open(config.result_backend.as_str())
            .map_err(|e| CaptchaError::Config(format!("Invalid result backend URL: {}", e)))?;

        Ok(Self {
            config,
            broker_client,
            backend_client,
            broker_conn: Arc::new(OnceCell::new()),
            backend_conn: Arc::new(OnceCell::new()),
        })
    }

    pub fn config(&self) -> &TaskRunnerConfig {
        &self.config
    }

    async fn broker(&self) -> Result<ConnectionManager, CaptchaError> {
        self.broker_conn
            .get_or_try_init(|| ConnectionManager::new(self.broker_client.clone()))
            .await
            .cloned()
            .map_err(broker_err)
    }

    async fn backend(&self) -> Result<ConnectionManager, CaptchaError> {
        self.backend_conn
            .get_or_try_init(|| ConnectionManager::new(self.backend_client.clone()))
            .await
            .cloned()
            .map_err(broker_err)
    }

    /// Enqueue a task message
    pub async fn push(&self, message: &TaskMessage) -> Result<(), CaptchaError> {
        let payload = serde_json::to_string(message).map_err(broker_err)?;
        let mut conn = self.broker().await?;
        let _: () = conn
            .lpush(redis_keys::TASK_QUEUE, payload)
            .await
            .map_err(broker_err)?;
        Ok(())
    }

    /// Wait up to `timeout_secs` for the next task message.
    ///
    /// Malformed payloads are logged and skipped.
    pub async fn pop(&self, timeout_secs: u64) -> Result<Option<TaskMessage>, CaptchaError> {
        let mut conn = self.broker().await?;
        let reply: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(redis_keys::TASK_QUEUE)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await
            .map_err(broker_err)?;

        let Some((_, payload)) = reply else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                tracing::error!(error = %e, payload = %payload, "Discarding malformed task message");
                Ok(None)
            }
        }
    }

    pub async fn store_result(&self, result: &TaskResult) -> Result<(), CaptchaError> {
        let key = format!("{}{}", redis_keys::RESULT_PREFIX, result.task_id);
        let value = serde_json::to_string(result).map_err(broker_err)?;
        let mut conn = self.backend().await?;
        conn.set_ex::<_, _, ()>(&key, value, TASK_RESULT_TTL_SECS)
            .await
            .map_err(broker_err)
    }

    /// Claim a scheduler slot so concurrent workers enqueue a periodic task
    /// at most once per fire time.
    pub async fn claim_slot(&self, task: &str, fire_at: i64, ttl_secs: u64) -> Result<bool, CaptchaError> {
        let key = format!("{}{}:{}", redis_keys::BEAT_PREFIX, task, fire_at);
        let mut conn = self.broker().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async(&mut conn)
            .await
            .map_err(broker_err)?;
        Ok(reply.is_some())
    }
}
