//! Root route.

use axum::{
    http::{StatusCode, header},
    response::IntoResponse,
};

use captcha_common::constants::SWAGGER_UI_PATH;

/// Any method on `/` lands on the API documentation
pub async fn index() -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, SWAGGER_UI_PATH)])
}
