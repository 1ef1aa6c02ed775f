//! Shared constants for the CAPTCHA API components.

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8888";

/// Local file-backed store used when no connection string is supplied
pub const DEFAULT_DATABASE_URI: &str = "sqlite://db.sqlite3";

/// Base configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/captcha.example.toml";

/// Number of characters in a CAPTCHA answer
pub const DEFAULT_CAPTCHA_LENGTH: usize = 6;

/// How long a challenge can be answered (5 minutes)
pub const DEFAULT_CAPTCHA_VALIDITY_SECS: u64 = 300;

/// How long a record is kept before the cleanup task removes it (1 day)
pub const DEFAULT_CAPTCHA_RETENTION_SECS: u64 = 86_400;

/// Task results expire from the result backend after a day
pub const TASK_RESULT_TTL_SECS: u64 = 86_400;

/// Seconds a worker blocks on the queue before re-checking for shutdown
pub const BROKER_POLL_TIMEOUT_SECS: u64 = 1;

/// Where the documentation UI is mounted
pub const SWAGGER_UI_PATH: &str = "/swagger-ui";

/// Where the OpenAPI document is served
pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

/// Environment variables read at startup
pub mod env {
    /// Path to an overlay configuration file
    pub const CAPTCHA_API_CONFIG: &str = "CAPTCHA_API_CONFIG";

    /// Datastore connection string
    pub const DATABASE_URI: &str = "SQLALCHEMY_DATABASE_URI";
}

/// Task names known to the worker
pub mod tasks {
    /// Deletes CAPTCHA records older than the retention window
    pub const DELETE_OLD_CAPTCHAS: &str = "delete_old_captchas";
}

/// Redis key layout for the task broker
pub mod redis_keys {
    /// Pending task messages (list, LPUSH / BRPOP)
    pub const TASK_QUEUE: &str = "captcha_api:tasks";

    /// Task result: captcha_api:result:{task_id}
    pub const RESULT_PREFIX: &str = "captcha_api:result:";

    /// Scheduler slot claim: captcha_api:beat:{task}:{fire_ts}
    pub const BEAT_PREFIX: &str = "captcha_api:beat:";
}
