//! CAPTCHA verification logic.

use captcha_common::CaptchaError;

use super::hash_answer;
use crate::db::CaptchaStore;

/// CAPTCHA verifier service
pub struct CaptchaVerifier {
    /// Challenge validity in seconds
    validity_secs: u64,
}

impl CaptchaVerifier {
    pub fn new(validity_secs: u64) -> Self {
        Self { validity_secs }
    }

    /// Check an answer against a stored challenge.
    ///
    /// The challenge is consumed before comparing, so each id gets exactly
    /// one attempt.
    pub async fn verify(
        &self,
        store: &CaptchaStore,
        challenge_id: &str,
        answer: &str,
    ) -> Result<(), CaptchaError> {
        let record = store
            .take(challenge_id)
            .await?
            .ok_or_else(|| CaptchaError::NotFound(challenge_id.to_string()))?;

        let now = chrono::Utc::now().timestamp();
        if record.is_expired(self.validity_secs, now) {
            tracing::debug!(challenge_id = %challenge_id, "CAPTCHA expired");
            return Err(CaptchaError::Expired(challenge_id.to_string()));
        }

        if hash_answer(challenge_id, answer) != record.answer_hash {
            tracing::debug!(challenge_id = %challenge_id, "CAPTCHA verification failed");
            return Err(CaptchaError::IncorrectAnswer);
        }

        tracing::info!(challenge_id = %challenge_id, "CAPTCHA verified successfully");
        Ok(())
    }
}
