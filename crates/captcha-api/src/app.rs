//! Application bootstrap.
//!
//! Startup is sequential: configuration, datastore, task runner, then the
//! HTTP router. Every failure before serving is fatal.

use anyhow::{Context, Result};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;

use captcha_common::constants::DEFAULT_CONFIG_PATH;

use crate::config::{AppConfig, ConfigLoader};
use crate::db::{self, DatabaseSettings};
use crate::routes;
use crate::state::{AppContext, AppState};
use crate::tasks::TaskRunner;

/// Inputs to [`create_app`]
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Base configuration file; must exist
    pub config_path: PathBuf,
    /// Overlay the file named by `CAPTCHA_API_CONFIG`
    pub use_env_config: bool,
    /// Explicit settings that beat every file
    pub overrides: Vec<(String, String)>,
    /// Defaults to `SQLALCHEMY_DATABASE_URI` or the local file store
    pub database: Option<DatabaseSettings>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            use_env_config: true,
            overrides: Vec::new(),
            database: None,
        }
    }
}

impl AppOptions {
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut loader = ConfigLoader::new(&self.config_path);
        if self.use_env_config {
            loader = loader.with_env_overlay();
        }
        for (key, value) in &self.overrides {
            loader = loader.set_override(key.as_str(), value.as_str());
        }

        let config = loader.load()?;
        tracing::info!(
            path = %self.config_path.display(),
            api_version = %config.settings.api_version,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn database(&self) -> DatabaseSettings {
        self.database.clone().unwrap_or_else(DatabaseSettings::from_env)
    }
}

/// A fully initialized application
pub struct Application {
    pub state: AppState,
}

impl Application {
    pub fn router(&self) -> Router {
        routes::create_router(self.state.clone())
    }
}

/// Configuration plus datastore, shared by the server and the worker
pub async fn create_context(options: &AppOptions) -> Result<AppContext> {
    let config = Arc::new(options.load_config()?);
    let db = db::setup(&options.database()).await?;
    Ok(AppContext { config, db })
}

/// Build the web application
pub async fn create_app(options: AppOptions) -> Result<Application> {
    let context = create_context(&options).await?;

    let tasks = TaskRunner::configure(&context.config)
        .context("Failed to configure task runner")?;

    Ok(Application {
        state: AppState::new(context, Arc::new(tasks)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::write_config;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn test_app(overrides: &[(&str, &str)]) -> Application {
        let dir = tempfile::tempdir().unwrap();
        let base = write_config(&dir, "base.toml", "API_VERSION = \"v1\"\n");

        create_app(AppOptions {
            config_path: base,
            use_env_config: false,
            overrides: overrides
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            database: Some(DatabaseSettings::resolve(Some("sqlite::memory:".into()))),
        })
        .await
        .unwrap()
    }

    async fn send(app: &Application, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = app.router().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_env_overlay_does_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_config(&dir, "base.toml", "API_VERSION = \"v1\"\n");

        let app = create_app(AppOptions {
            config_path: base,
            use_env_config: false,
            database: Some(DatabaseSettings::resolve(Some("sqlite::memory:".into()))),
            ..Default::default()
        })
        .await;
        assert!(app.is_ok());

        // Same as a CAPTCHA_API_CONFIG that points nowhere
        let config = ConfigLoader::new(dir.path().join("base.toml"))
            .overlay(dir.path().join("nowhere.toml"))
            .load();
        assert!(config.is_ok());
    }

    #[tokio::test]
    async fn test_api_mounted_under_version_prefix() {
        let app = test_app(&[]).await;

        let (status, _, body) = send(&app, get("/api/v1/captcha")).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert!(body["img"].as_str().unwrap().starts_with("data:image/svg+xml;base64,"));

        let (status, _, _) = send(&app, get("/api/v2/captcha")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_other_api_version() {
        let app = test_app(&[("API_VERSION", "v7")]).await;
        let (status, _, _) = send(&app, get("/api/v7/captcha")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_trailing_slash_is_not_significant() {
        let app = test_app(&[]).await;

        let (status, _, _) = send(&app, get("/api/v1/captcha/")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) = send(&app, get("/health/")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_root_redirects_to_swagger_for_any_method() {
        let app = test_app(&[]).await;

        for method in [Method::GET, Method::POST, Method::DELETE, Method::PUT] {
            let request = Request::builder()
                .method(method.clone())
                .uri("/")
                .body(Body::empty())
                .unwrap();
            let (status, headers, _) = send(&app, request).await;
            assert_eq!(status, StatusCode::FOUND, "{}", method);
            assert_eq!(headers[header::LOCATION], "/swagger-ui");
        }
    }

    #[tokio::test]
    async fn test_openapi_document_served() {
        let app = test_app(&[]).await;
        let (status, _, body) = send(&app, get("/api-docs/openapi.json")).await;
        assert_eq!(status, StatusCode::OK);

        let doc: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(doc["info"]["version"], "v1");
        assert_eq!(doc["servers"][0]["url"], "/api/v1");
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let app = test_app(&[]).await;
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "https://somewhere.example")
            .body(Body::empty())
            .unwrap();

        let (_, headers, _) = send(&app, request).await;
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_image_url_uses_forwarded_host() {
        let app = test_app(&[]).await;
        let request = Request::builder()
            .uri("/api/v1/captcha")
            .header("X-Forwarded-Proto", "https")
            .header("X-Forwarded-Host", "captcha.example.org")
            .body(Body::empty())
            .unwrap();

        let (_, _, body) = send(&app, request).await;
        let body: Value = serde_json::from_slice(&body).unwrap();
        let id = body["id"].as_str().unwrap();
        assert_eq!(
            body["image_url"],
            format!("https://captcha.example.org/api/v1/captcha/{}/image", id)
        );
    }

    #[tokio::test]
    async fn test_issue_then_validate_once() {
        let app = test_app(&[]).await;

        let (_, _, body) = send(&app, get("/api/v1/captcha")).await;
        let issued: Value = serde_json::from_slice(&body).unwrap();
        let id = issued["id"].as_str().unwrap().to_string();

        let (status, headers, svg) = send(&app, get(&format!("/api/v1/captcha/{}/image", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "image/svg+xml");
        assert!(svg.starts_with(b"<svg"));

        // The answer only exists inside the image; pin a known one
        let known = crate::captcha::hash_answer(&id, "abc123");
        sqlx::query("UPDATE captchas SET answer_hash = ? WHERE id = ?")
            .bind(&known)
            .bind(&id)
            .execute(&app.state.context.db)
            .await
            .unwrap();

        let (status, _, body) = send(
            &app,
            post_json("/api/v1/captcha", json!({ "id": id, "answer": "ABC123" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["success"], true);

        let (status, _, _) = send(
            &app,
            post_json("/api/v1/captcha", json!({ "id": id, "answer": "ABC123" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wrong_answer_consumes_challenge() {
        let app = test_app(&[]).await;

        let (_, _, body) = send(&app, get("/api/v1/captcha")).await;
        let issued: Value = serde_json::from_slice(&body).unwrap();
        let id = issued["id"].as_str().unwrap();

        let (status, _, body) = send(
            &app,
            post_json("/api/v1/captcha", json!({ "id": id, "answer": "definitely wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "Incorrect answer");

        let (status, _, _) = send(&app, get(&format!("/api/v1/captcha/{}/image", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let app = test_app(&[]).await;

        let (status, _, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "ok");

        let (status, _, body) = send(&app, get("/ready")).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["database"], true);
        assert_eq!(body["task_runner"], "disabled");
    }

    #[tokio::test]
    async fn test_enabled_task_runner_reported_without_redis() {
        let app = test_app(&[
            ("USE_CELERY", "true"),
            ("CELERY_BROKER_URL", "redis://127.0.0.1:6399/0"),
            ("CELERY_RESULT_BACKEND", "redis://127.0.0.1:6399/1"),
        ])
        .await;

        assert!(app.state.tasks.is_enabled());
        let (_, _, body) = send(&app, get("/ready")).await;
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["task_runner"], "enabled");
    }
}
