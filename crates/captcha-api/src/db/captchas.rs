//! CAPTCHA record persistence.

use captcha_common::{CaptchaError, CaptchaRecord};
use sqlx::SqlitePool;

type Row = (String, String, i64);

fn from_row((id, answer_hash, created_at): Row) -> CaptchaRecord {
    CaptchaRecord {
        id,
        answer_hash,
        created_at,
    }
}

fn db_err(e: sqlx::Error) -> CaptchaError {
    CaptchaError::Database(e.to_string())
}

/// SQLite-backed store for issued challenges
#[derive(Clone)]
pub struct CaptchaStore {
    pool: SqlitePool,
}

impl CaptchaStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &CaptchaRecord, image: &str) -> Result<(), CaptchaError> {
        sqlx::query(
            "INSERT INTO captchas (id, answer_hash, image, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.answer_hash)
        .bind(image)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Rendered SVG for a challenge that has not been consumed yet
    pub async fn image(&self, id: &str) -> Result<Option<String>, CaptchaError> {
        sqlx::query_scalar("SELECT image FROM captchas WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Look up a challenge without consuming it
    pub async fn find(&self, id: &str) -> Result<Option<CaptchaRecord>, CaptchaError> {
        let row: Option<Row> =
            sqlx::query_as("SELECT id, answer_hash, created_at FROM captchas WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.map(from_row))
    }

    /// Remove and return a challenge in one statement (single-use)
    pub async fn take(&self, id: &str) -> Result<Option<CaptchaRecord>, CaptchaError> {
        let row: Option<Row> = sqlx::query_as(
            "DELETE FROM captchas WHERE id = ? RETURNING id, answer_hash, created_at",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(from_row))
    }

    /// Delete every record created before `cutoff` (unix seconds)
    pub async fn delete_created_before(&self, cutoff: i64) -> Result<u64, CaptchaError> {
        let result = sqlx::query("DELETE FROM captchas WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<i64, CaptchaError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM captchas")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }
}
