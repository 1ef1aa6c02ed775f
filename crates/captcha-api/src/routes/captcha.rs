//! CAPTCHA issuing and validation endpoints.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use captcha_common::CaptchaError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::{ApiError, ErrorResponse};
use crate::proxy::ForwardedRequest;
use crate::state::AppState;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CaptchaResponse {
    /// Challenge id, sent back with the answer
    pub id: String,
    /// `data:image/svg+xml;base64,...`
    pub img: String,
    /// Where the same image can be fetched
    pub image_url: String,
    pub expires_in_secs: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct ValidateRequest {
    pub id: String,
    pub answer: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    pub success: bool,
}

/// Issue a new CAPTCHA challenge
#[utoipa::path(
    get,
    path = "/captcha",
    tag = "Captcha",
    responses(
        (status = 200, body = CaptchaResponse),
        (status = 503, body = ErrorResponse)
    )
)]
pub async fn create_captcha(
    State(state): State<AppState>,
    forwarded: Option<Extension<ForwardedRequest>>,
) -> Result<Json<CaptchaResponse>, ApiError> {
    let issued = state.captcha_generator.issue(&state.captchas).await?;

    let image_path = format!("{}/captcha/{}/image", state.settings().api_prefix(), issued.id);
    let image_url = match forwarded {
        Some(Extension(forwarded)) => forwarded.absolute_url(&image_path),
        None => image_path,
    };

    let now = chrono::Utc::now().timestamp();
    Ok(Json(CaptchaResponse {
        id: issued.id,
        img: issued.image_data,
        image_url,
        expires_in_secs: (issued.expires_at - now).max(0) as u64,
    }))
}

/// SVG image of an unused challenge
#[utoipa::path(
    get,
    path = "/captcha/{id}/image",
    tag = "Captcha",
    params(("id" = String, Path, description = "Challenge id")),
    responses(
        (status = 200, content_type = "image/svg+xml", body = String),
        (status = 404, body = ErrorResponse)
    )
)]
pub async fn captcha_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let svg = state
        .captchas
        .image(&id)
        .await?
        .ok_or(CaptchaError::NotFound(id))?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        svg,
    ))
}

/// Validate an answer. The challenge is consumed either way.
#[utoipa::path(
    post,
    path = "/captcha",
    tag = "Captcha",
    request_body = ValidateRequest,
    responses(
        (status = 200, body = ValidateResponse),
        (status = 400, body = ErrorResponse, description = "Wrong answer"),
        (status = 404, body = ErrorResponse, description = "Unknown or already used"),
        (status = 410, body = ErrorResponse, description = "Expired")
    )
)]
pub async fn validate_captcha(
    State(state): State<AppState>,
    Json(payload): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, ApiError> {
    state
        .captcha_verifier
        .verify(&state.captchas, &payload.id, &payload.answer)
        .await?;

    Ok(Json(ValidateResponse { success: true }))
}
