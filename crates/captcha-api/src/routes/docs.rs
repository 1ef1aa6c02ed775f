//! OpenAPI document and Swagger UI.

use utoipa::OpenApi;
use utoipa::openapi::server::Server;
use utoipa_swagger_ui::SwaggerUi;

use captcha_common::constants::{OPENAPI_JSON_PATH, SWAGGER_UI_PATH};

use super::captcha::{CaptchaResponse, ValidateRequest, ValidateResponse};
use super::error::ErrorResponse;
use crate::config::Settings;

#[derive(OpenApi)]
#[openapi(
    info(title = "CAPTCHA API"),
    paths(
        super::captcha::create_captcha,
        super::captcha::captcha_image,
        super::captcha::validate_captcha,
    ),
    components(schemas(CaptchaResponse, ValidateRequest, ValidateResponse, ErrorResponse)),
    tags((name = "Captcha", description = "Issue and validate CAPTCHA challenges"))
)]
pub struct ApiDoc;

/// Document for the mounted API version; paths are relative to the prefix
pub fn openapi(settings: &Settings) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.version = settings.api_version.clone();
    doc.servers = Some(vec![Server::new(settings.api_prefix())]);
    doc
}

pub fn swagger_ui(settings: &Settings) -> SwaggerUi {
    SwaggerUi::new(SWAGGER_UI_PATH).url(OPENAPI_JSON_PATH, openapi(settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;

    #[test]
    fn test_document_tracks_api_version() {
        let config = test_config(&[("API_VERSION", "v2")]);
        let doc = openapi(&config.settings);

        assert_eq!(doc.info.version, "v2");
        let servers = doc.servers.unwrap();
        assert_eq!(servers[0].url, "/api/v2");
        assert!(doc.paths.paths.contains_key("/captcha"));
        assert!(doc.paths.paths.contains_key("/captcha/{id}/image"));
    }
}
