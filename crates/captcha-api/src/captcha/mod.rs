//! CAPTCHA generation and verification.
//!
//! Challenges are text CAPTCHAs rendered as SVG. Only a salted hash of the
//! answer is stored; validation consumes the record whatever the outcome.

mod generator;
mod verifier;

pub use generator::{CaptchaGenerator, IssuedCaptcha};
pub use verifier::CaptchaVerifier;

use base64::{Engine, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};

/// Hash an answer for storage. Case and surrounding whitespace are ignored.
pub(crate) fn hash_answer(challenge_id: &str, answer: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(challenge_id.as_bytes());
    hasher.update(b":");
    hasher.update(answer.trim().to_uppercase().as_bytes());
    STANDARD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_answer_normalizes_case_and_whitespace() {
        assert_eq!(hash_answer("id", "ab12"), hash_answer("id", " AB12 "));
        assert_ne!(hash_answer("id", "AB12"), hash_answer("other", "AB12"));
    }
}
