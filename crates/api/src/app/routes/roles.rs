//! Board role management: listing, creation and the permission editor.
//!
//! Mutations answer to `PATCH`, and to `POST` carrying `_method=PATCH` for
//! plain HTML forms.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};

use boardcp_core::{BoardUri, RoleId};

use crate::app::dto::{self, CreateRoleForm};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

type FormPairs = Form<Vec<(String, String)>>;

pub fn router() -> Router {
    Router::new()
        .route("/", get(index).patch(create).post(create_via_post))
        .route(
            "/permissions/:role",
            get(permissions).patch(commit_permissions).post(commit_permissions_via_post),
        )
}

fn board_uri(raw: &str) -> Result<BoardUri, Response> {
    BoardUri::parse(raw).map_err(|_| {
        errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("board '{raw}' not found"))
    })
}

fn role_id(raw: &str) -> Result<RoleId, Response> {
    raw.parse().map_err(|_| {
        errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("role {raw} not found"))
    })
}

fn method_not_allowed() -> Response {
    errors::json_error(
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        "POST requires _method=PATCH",
    )
}

/// GET /cp/boards/:board/roles
pub async fn index(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(board): Path<String>,
) -> Response {
    let board = match board_uri(&board) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    match services.role_index(&board, principal.principal()).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::panel_error_to_response(e),
    }
}

/// PATCH /cp/boards/:board/roles
pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(board): Path<String>,
    Form(pairs): FormPairs,
) -> Response {
    let board = match board_uri(&board) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let form = CreateRoleForm::from_pairs(&pairs);
    match services.create_role(&board, principal.principal(), &form).await {
        Ok(_) => Redirect::to(&format!("/cp/boards/{board}/roles")).into_response(),
        Err(e) => errors::panel_error_to_response(e),
    }
}

/// POST /cp/boards/:board/roles (`_method=PATCH`)
pub async fn create_via_post(
    services: Extension<Arc<AppServices>>,
    principal: Extension<PrincipalContext>,
    board: Path<String>,
    form: FormPairs,
) -> Response {
    if !dto::emulates_patch(&form.0) {
        return method_not_allowed();
    }
    create(services, principal, board, form).await
}

/// GET /cp/boards/:board/roles/permissions/:role
pub async fn permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((board, role)): Path<(String, String)>,
) -> Response {
    let (board, role) = match board_uri(&board).and_then(|b| Ok((b, role_id(&role)?))) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };

    match services.permission_editor(&board, role, principal.principal()).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::panel_error_to_response(e),
    }
}

/// PATCH /cp/boards/:board/roles/permissions/:role
pub async fn commit_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((board, role)): Path<(String, String)>,
    Form(pairs): FormPairs,
) -> Response {
    let (board, role) = match board_uri(&board).and_then(|b| Ok((b, role_id(&role)?))) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };

    let submitted = dto::permission_entries(&pairs);
    match services
        .commit_permissions(&board, role, principal.principal(), &submitted)
        .await
    {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::panel_error_to_response(e),
    }
}

/// POST /cp/boards/:board/roles/permissions/:role (`_method=PATCH`)
pub async fn commit_permissions_via_post(
    services: Extension<Arc<AppServices>>,
    principal: Extension<PrincipalContext>,
    path: Path<(String, String)>,
    form: FormPairs,
) -> Response {
    if !dto::emulates_patch(&form.0) {
        return method_not_allowed();
    }
    commit_permissions(services, principal, path, form).await
}
