//! # CAPTCHA Common
//!
//! Shared types, errors, and constants used by the CAPTCHA API server and
//! its task worker.
//!
//! ## Modules
//! - `types` - CAPTCHA records and task broker messages
//! - `error` - Common error type
//! - `constants` - Defaults, environment variable names, Redis keys

pub mod constants;
pub mod error;
pub mod types;

pub use error::CaptchaError;
pub use types::*;
