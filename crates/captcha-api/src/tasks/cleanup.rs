//! Periodic cleanup of old CAPTCHA records.

use captcha_common::CaptchaError;
use serde_json::{Value, json};

use crate::db::CaptchaStore;
use crate::state::AppContext;

/// Delete every CAPTCHA older than `CAPTCHA_RETENTION_SECS`.
///
/// Takes no arguments. Returns `{"deleted": n, "remaining": m, "cutoff": ts}`.
pub async fn delete_old_captchas(ctx: AppContext, _args: Value) -> Result<Value, CaptchaError> {
    let retention = ctx.settings().captcha_retention_secs as i64;
    let cutoff = chrono::Utc::now().timestamp() - retention;

    let store = CaptchaStore::new(ctx.db.clone());
    let deleted = store.delete_created_before(cutoff).await?;
    let remaining = store.count().await?;

    tracing::info!(deleted = deleted, remaining = remaining, cutoff = cutoff, "Deleted old CAPTCHAs");

    Ok(json!({ "deleted": deleted, "remaining": remaining, "cutoff": cutoff }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::db::tests::memory_pool;
    use captcha_common::CaptchaRecord;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_deletes_only_records_past_retention() {
        let ctx = AppContext {
            config: Arc::new(test_config(&[("CAPTCHA_RETENTION_SECS", "3600")])),
            db: memory_pool().await,
        };
        let store = CaptchaStore::new(ctx.db.clone());
        let now = chrono::Utc::now().timestamp();

        for (id, age) in [("ancient", 7_200), ("recent", 60)] {
            let record = CaptchaRecord {
                id: id.to_string(),
                answer_hash: "h".to_string(),
                created_at: now - age,
            };
            store.insert(&record, "<svg/>").await.unwrap();
        }

        let outcome = delete_old_captchas(ctx.clone(), Value::Null).await.unwrap();
        assert_eq!(outcome["deleted"], 1);
        assert_eq!(outcome["remaining"], 1);
        assert!(store.find("ancient").await.unwrap().is_none());
        assert!(store.find("recent").await.unwrap().is_some());
    }
}
