use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use campus_auth::Permission;
use campus_enrollment::NewPayment;

use crate::app::errors;
use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// Buy credits; the balance and the payment record change together.
pub async fn top_up(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewPayment>,
) -> Response {
    let body = match CmdAuth::new(body, Permission::PAYMENTS_CREATE).authorize(&principal) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.top_up(principal.account_id(), body).await {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "payment": outcome.payment,
                "balance": outcome.balance.amount(),
            })),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_payments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    match services.ledger.payments_for_account(principal.account_id()).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
