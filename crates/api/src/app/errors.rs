use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use campus_auth::{AuthzError, PasswordError};
use campus_core::DomainError;
use campus_enrollment::LedgerError;
use campus_infra::object_storage::StorageError;
use campus_infra::store::StoreError;

use crate::app::services::SessionIssueError;

/// Where a client can buy more credits.
pub const TOP_UP_PATH: &str = "/payments";

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// 503 with `Retry-After: 1`; the request is safe to repeat.
fn transient(code: &'static str, message: impl Into<String>) -> Response {
    let mut response = json_error(StatusCode::SERVICE_UNAVAILABLE, code, message);
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
    response
}

pub fn ledger_error_to_response(err: LedgerError) -> Response {
    let code = err.code();
    let message = err.to_string();
    match err {
        LedgerError::CapacityExceeded { .. } | LedgerError::DuplicateEnrollment => {
            json_error(StatusCode::CONFLICT, code, message)
        }
        LedgerError::InsufficientCredits { balance, required } => (
            StatusCode::PAYMENT_REQUIRED,
            axum::Json(json!({
                "error": code,
                "message": message,
                "balance": balance.amount(),
                "required": required.amount(),
                "top_up": TOP_UP_PATH,
            })),
        )
            .into_response(),
        LedgerError::Configuration(_) | LedgerError::RefundTargetMissing => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, code, message)
        }
        LedgerError::NotFound(_) => json_error(StatusCode::NOT_FOUND, code, message),
        LedgerError::Validation(_) => json_error(StatusCode::BAD_REQUEST, code, message),
        LedgerError::TransientStore(_) => {
            tracing::warn!(error = %message, "ledger store unavailable");
            transient(code, "the store is temporarily unavailable, retry the request")
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Invalid(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        StoreError::Unavailable(msg) => {
            tracing::warn!(error = %msg, "store unavailable");
            transient("transient_store_error", "the store is temporarily unavailable, retry the request")
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    match err {
        DomainError::Validation(msg) | DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
    }
}

pub fn authz_error_to_response(err: AuthzError) -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn password_error_to_response(err: PasswordError) -> Response {
    match err {
        PasswordError::Policy => json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string()),
        other => {
            tracing::error!(error = %other, "password hashing failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn session_error_to_response(err: SessionIssueError) -> Response {
    match err {
        SessionIssueError::Store(e) => store_error_to_response(e),
        SessionIssueError::Token(e) => {
            tracing::error!(error = %e, "failed to sign session token");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn storage_error_to_response(err: StorageError) -> Response {
    let message = err.to_string();
    match err {
        StorageError::UnsupportedContentType(_) => {
            json_error(StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type", message)
        }
        StorageError::TooLarge { .. } => json_error(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message),
        StorageError::Empty => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        StorageError::Backend(_) => {
            tracing::error!(error = %message, "object storage failed");
            json_error(StatusCode::BAD_GATEWAY, "storage_error", "object storage is unavailable")
        }
    }
}

pub fn invalid_id(what: &str) -> Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::{Credits, SectionId};

    #[test]
    fn ledger_errors_map_to_distinct_statuses() {
        let cases = [
            (
                LedgerError::CapacityExceeded {
                    section_id: SectionId::new(),
                    capacity: 30,
                },
                StatusCode::CONFLICT,
            ),
            (LedgerError::DuplicateEnrollment, StatusCode::CONFLICT),
            (
                LedgerError::InsufficientCredits {
                    balance: Credits::ZERO,
                    required: Credits::new(1).unwrap(),
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (LedgerError::Configuration("no price".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (LedgerError::RefundTargetMissing, StatusCode::UNPROCESSABLE_ENTITY),
            (LedgerError::not_found("enrollment"), StatusCode::NOT_FOUND),
            (LedgerError::TransientStore("pool".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(ledger_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn transient_errors_ask_clients_to_retry() {
        let response = ledger_error_to_response(LedgerError::TransientStore("40001".into()));
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1");
    }
}
