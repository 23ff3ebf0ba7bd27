use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use campus_auth::{hash_password, validate_password_policy, verify_password};
use campus_core::{AccountId, Credits, error::require_non_blank};
use campus_enrollment::Account;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterRequest>,
) -> Response {
    let name = match require_non_blank("name", &body.name) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let email = body.email.trim().to_lowercase();
    if !looks_like_email(&email) {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "email is invalid");
    }
    if let Err(e) = validate_password_policy(&body.password) {
        return errors::password_error_to_response(e);
    }
    let password_hash = match hash_password(&body.password) {
        Ok(h) => h,
        Err(e) => return errors::password_error_to_response(e),
    };

    let account = Account {
        id: AccountId::new(),
        name,
        email,
        password_hash,
        credit_balance: Credits::ZERO,
        created_at: Utc::now(),
    };

    match services.identity.create_account(account).await {
        Ok(account) => {
            tracing::info!(account_id = %account.id, "account registered");
            (StatusCode::CREATED, Json(dto::account_to_json(&account))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::LoginRequest>,
) -> Response {
    let account = match services.identity.account_by_email(&body.email).await {
        Ok(Some(account)) => account,
        Ok(None) => return invalid_credentials(),
        Err(e) => return errors::store_error_to_response(e),
    };

    match verify_password(&body.password, &account.password_hash) {
        Ok(true) => {}
        Ok(false) => return invalid_credentials(),
        Err(e) => return errors::password_error_to_response(e),
    }

    let roles = services.roles_for(&account.email);
    let issued = match services.open_session(account.id, roles).await {
        Ok(issued) => issued,
        Err(e) => return errors::session_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "token": issued.token,
            "token_type": "Bearer",
            "expires_at": issued.claims.expires_at.to_rfc3339(),
            "roles": issued.claims.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
            "account": dto::account_to_json(&account),
        })),
    )
        .into_response()
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    match services
        .sessions
        .revoke_session(principal.session_id(), Utc::now())
        .await
    {
        Ok(_) => {
            tracing::info!(account_id = %principal.account_id(), session_id = %principal.session_id(), "session revoked");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

fn invalid_credentials() -> Response {
    errors::json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", "email or password is incorrect")
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}
