//! Background task runner.
//!
//! The runner is an explicit object built once at startup and injected
//! wherever tasks are dispatched. When `USE_CELERY` is off it is built in
//! disabled mode and dispatching becomes a logged no-op.
//!
//! Tasks are registered through [`TaskRegistry::register`], which binds each
//! task to an [`AppContext`] so it runs with the same configuration and
//! datastore a request handler gets.

use futures::future::BoxFuture;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

use captcha_common::{CaptchaError, TaskMessage, TaskResult};

use crate::config::{AppConfig, Settings};
use crate::state::AppContext;

mod broker;
pub mod cleanup;
pub mod schedule;
pub mod worker;

pub use broker::RedisBroker;

/// Broker and result backend locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRunnerConfig {
    pub broker_url: String,
    pub result_backend: String,
}

impl TaskRunnerConfig {
    /// `None` when tasks are disabled; an error when enabled without URLs
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>, CaptchaError> {
        if !settings.use_celery {
            return Ok(None);
        }

        let broker_url = settings.celery_broker_url.clone().ok_or_else(|| {
            CaptchaError::Config("CELERY_BROKER_URL is required when USE_CELERY is true".into())
        })?;
        let result_backend = settings.celery_result_backend.clone().ok_or_else(|| {
            CaptchaError::Config("CELERY_RESULT_BACKEND is required when USE_CELERY is true".into())
        })?;

        Ok(Some(Self {
            broker_url,
            result_backend,
        }))
    }
}

struct Enabled {
    broker: RedisBroker,
    /// Full application configuration, merged into the runner's own
    conf: Arc<AppConfig>,
}

/// Dispatches tasks to the broker, or drops them when disabled
pub struct TaskRunner {
    enabled: Option<Enabled>,
}

impl TaskRunner {
    pub fn disabled() -> Self {
        Self { enabled: None }
    }

    /// Configure from application settings. Never connects to Redis.
    pub fn configure(config: &Arc<AppConfig>) -> Result<Self, CaptchaError> {
        match TaskRunnerConfig::from_settings(&config.settings)? {
            Some(runner_config) => {
                tracing::info!(
                    broker = %runner_config.broker_url,
                    backend = %runner_config.result_backend,
                    "Task runner configured"
                );
                Ok(Self {
                    enabled: Some(Enabled {
                        broker: RedisBroker::new(runner_config)?,
                        conf: config.clone(),
                    }),
                })
            }
            None => {
                tracing::warn!("Task runner is disabled!");
                Ok(Self::disabled())
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.is_some()
    }

    pub fn broker_url(&self) -> Option<&str> {
        self.enabled
            .as_ref()
            .map(|e| e.broker.config().broker_url.as_str())
    }

    pub fn result_backend(&self) -> Option<&str> {
        self.enabled
            .as_ref()
            .map(|e| e.broker.config().result_backend.as_str())
    }

    /// Application configuration the runner was configured with
    pub fn conf(&self) -> Option<&AppConfig> {
        self.enabled.as_ref().map(|e| e.conf.as_ref())
    }

    pub(crate) fn broker(&self) -> Option<&RedisBroker> {
        self.enabled.as_ref().map(|e| &e.broker)
    }

    /// Enqueue a task. Returns the task id, or `None` when disabled.
    pub async fn dispatch(&self, task: &str, args: Value) -> Result<Option<String>, CaptchaError> {
        let Some(broker) = self.broker() else {
            tracing::warn!(task = %task, "Task runner is disabled, dropping task");
            return Ok(None);
        };

        let message = TaskMessage::new(generate_task_id(), task, args);
        broker.push(&message).await?;

        tracing::debug!(task = %task, task_id = %message.id, "Task dispatched");
        Ok(Some(message.id))
    }
}

fn generate_task_id() -> String {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

type BoundTask = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, CaptchaError>> + Send + Sync>;

/// Named tasks, each already bound to the application context
pub struct TaskRegistry {
    context: AppContext,
    tasks: HashMap<String, BoundTask>,
}

impl TaskRegistry {
    pub fn new(context: AppContext) -> Self {
        Self {
            context,
            tasks: HashMap::new(),
        }
    }

    /// Register a task; it will be invoked with a fresh context clone
    pub fn register<F, Fut>(&mut self, name: &str, task: F)
    where
        F: Fn(AppContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CaptchaError>> + Send + 'static,
    {
        let bound = in_app_context(self.context.clone(), name, task);
        self.tasks.insert(name.to_string(), bound);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Run a message to completion. Failures become a failure result.
    pub async fn execute(&self, message: &TaskMessage) -> TaskResult {
        let Some(task) = self.tasks.get(&message.task) else {
            tracing::error!(task = %message.task, task_id = %message.id, "Unknown task");
            return TaskResult::failure(message, format!("Unknown task: {}", message.task));
        };

        match (**task)(message.args.clone()).await {
            Ok(value) => {
                tracing::info!(task = %message.task, task_id = %message.id, "Task succeeded");
                TaskResult::success(message, value)
            }
            Err(e) => {
                tracing::error!(task = %message.task, task_id = %message.id, error = %e, "Task failed");
                TaskResult::failure(message, e.to_string())
            }
        }
    }
}

/// Wrap a task so every invocation runs inside the application context
fn in_app_context<F, Fut>(context: AppContext, name: &str, task: F) -> BoundTask
where
    F: Fn(AppContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, CaptchaError>> + Send + 'static,
{
    let name = name.to_string();
    Arc::new(move |args: Value| -> BoxFuture<'static, Result<Value, CaptchaError>> {
        let span = tracing::info_span!("task", name = %name);
        Box::pin(task(context.clone(), args).instrument(span))
    })
}
