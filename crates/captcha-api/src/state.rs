//! Application state and shared resources.

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::captcha::{CaptchaGenerator, CaptchaVerifier};
use crate::config::{AppConfig, Settings};
use crate::db::CaptchaStore;
use crate::tasks::TaskRunner;

/// What every request handler and every task run sees: configuration plus
/// the datastore.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub db: SqlitePool,
}

impl AppContext {
    pub fn settings(&self) -> &Settings {
        &self.config.settings
    }
}

/// Shared HTTP state
#[derive(Clone)]
pub struct AppState {
    /// Configuration + datastore
    pub context: AppContext,

    /// CAPTCHA record store
    pub captchas: CaptchaStore,

    /// CAPTCHA generator
    pub captcha_generator: Arc<CaptchaGenerator>,

    /// CAPTCHA verifier
    pub captcha_verifier: Arc<CaptchaVerifier>,

    /// Background task runner (possibly disabled)
    pub tasks: Arc<TaskRunner>,
}

impl AppState {
    pub fn new(context: AppContext, tasks: Arc<TaskRunner>) -> Self {
        let settings = context.settings();
        let captcha_generator = Arc::new(CaptchaGenerator::new(
            settings.captcha_length,
            settings.captcha_validity_secs,
        ));
        let captcha_verifier = Arc::new(CaptchaVerifier::new(settings.captcha_validity_secs));
        let captchas = CaptchaStore::new(context.db.clone());

        Self {
            context,
            captchas,
            captcha_generator,
            captcha_verifier,
            tasks,
        }
    }

    pub fn settings(&self) -> &Settings {
        self.context.settings()
    }
}
