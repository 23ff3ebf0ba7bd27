use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};

use campus_auth::Permission;
use campus_infra::object_storage::extension_for;

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

/// Account, balance and (once the first enrollment created it) the student profile.
pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    let account = match services.identity.account_by_id(principal.account_id()).await {
        Ok(Some(account)) => account,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "account not found"),
        Err(e) => return errors::store_error_to_response(e),
    };
    let profile = match services.profiles.profile_for_account(account.id).await {
        Ok(profile) => profile,
        Err(e) => return errors::store_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "account": dto::account_to_json(&account),
            "balance": account.credit_balance.amount(),
            "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
            "profile": profile.as_ref().map(dto::profile_to_json),
        })),
    )
        .into_response()
}

/// Replace the caller's avatar with the raw image in the request body.
pub async fn upload_avatar(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = match CmdAuth::new(body, Permission::PROFILE_UPDATE).authorize(&principal) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
        .unwrap_or_default();

    let profile = match services.profiles.profile_for_account(principal.account_id()).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            return errors::json_error(
                StatusCode::NOT_FOUND,
                "not_found",
                "student profile not found; it is created with the first enrollment",
            );
        }
        Err(e) => return errors::store_error_to_response(e),
    };

    let key = format!("students/{}.{}", profile.id, extension_for(&content_type));
    let url = match services.storage.put(&key, body.to_vec(), &content_type).await {
        Ok(url) => url,
        Err(e) => return errors::storage_error_to_response(e),
    };

    match services.profiles.set_avatar_url(principal.account_id(), &url).await {
        Ok(profile) => (StatusCode::OK, Json(dto::profile_to_json(&profile))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
