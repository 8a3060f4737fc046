use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use boardcp_auth::AuthzError;
use boardcp_infra::StoreError;

use crate::app::services::PanelError;

pub fn panel_error_to_response(err: PanelError) -> axum::response::Response {
    match err {
        PanelError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        PanelError::Forbidden(e @ AuthzError::Forbidden(_)) => {
            json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string())
        }
        PanelError::Forbidden(e @ AuthzError::ScopeMismatch { .. }) => {
            tracing::error!(error = %e, "permission check used the wrong scope");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "authorization_error", e.to_string())
        }
        PanelError::Validation { errors, input } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "validation_error",
                "message": "the given data was invalid",
                "errors": errors,
                "input": input,
            })),
        )
            .into_response(),
        PanelError::Store(StoreError::NotFound(msg)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", msg)
        }
        PanelError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
