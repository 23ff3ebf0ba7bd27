use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use campus_auth::Permission;
use campus_core::{EnrollmentId, SectionId};
use campus_enrollment::EnrollmentStatus;
use campus_infra::store::EnrollmentFilter;

use crate::app::routes::common::{CmdAuth, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

/// Enroll the caller into a section, paying with their credit balance.
pub async fn enroll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::EnrollRequest>,
) -> Response {
    let body = match CmdAuth::new(body, Permission::ENROLLMENTS_CREATE).authorize(&principal) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let section_id: SectionId = match parse_id(&body.section_id, "section") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .ledger
        .enroll(principal.account_id(), section_id, body.profile())
        .await
    {
        Ok(outcome) => (StatusCode::CREATED, Json(dto::enroll_outcome_to_json(&outcome))).into_response(),
        Err(e) => {
            tracing::info!(
                account_id = %principal.account_id(),
                section_id = %section_id,
                reason = e.code(),
                "enrollment rejected"
            );
            errors::ledger_error_to_response(e)
        }
    }
}

/// Cancel an enrollment and refund its owner. Owners and admins only.
pub async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let enrollment_id: EnrollmentId = match parse_id(&id, "enrollment") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let enrollment_id = match CmdAuth::new(enrollment_id, Permission::ENROLLMENTS_CANCEL).authorize(&principal) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.enrollment_owner(enrollment_id).await {
        Ok(Some(owner)) => {
            if let Err(e) = crate::authz::authorize_owner(&principal, owner) {
                return errors::authz_error_to_response(e);
            }
        }
        // No resolvable owner: only admins get to see why (missing or orphaned).
        Ok(None) if crate::authz::resolve(&principal).is_admin() => {}
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "enrollment not found"),
        Err(e) => return errors::store_error_to_response(e),
    }

    match services.ledger.cancel(enrollment_id).await {
        Ok(outcome) => (StatusCode::OK, Json(dto::cancel_outcome_to_json(&outcome))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Dashboard: the caller's enrollments with course, section, instructor and term.
pub async fn list_mine(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::EnrollmentQuery>,
) -> Response {
    let filter = match filter_from_query(query) {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    match services
        .ledger
        .enrollments_for_account(principal.account_id(), &filter)
        .await
    {
        Ok(details) => {
            let items = details.iter().map(dto::enrollment_detail_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

fn filter_from_query(query: dto::EnrollmentQuery) -> Result<EnrollmentFilter, Response> {
    let term_id = match query.term_id.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(parse_id(raw, "term")?),
        None => None,
    };
    let status = match query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(
            raw.trim()
                .to_lowercase()
                .parse::<EnrollmentStatus>()
                .map_err(errors::domain_error_to_response)?,
        ),
        None => None,
    };
    Ok(EnrollmentFilter {
        course: query.course.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        term_id,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_filters_are_ignored() {
        let filter = filter_from_query(dto::EnrollmentQuery {
            course: Some("  ".to_string()),
            term_id: Some(String::new()),
            status: Some("Active".to_string()),
        })
        .unwrap();
        assert_eq!(filter.course, None);
        assert_eq!(filter.term_id, None);
        assert_eq!(filter.status, Some(EnrollmentStatus::Active));
    }

    #[test]
    fn malformed_filters_are_rejected() {
        let bad_term = filter_from_query(dto::EnrollmentQuery {
            term_id: Some("not-a-uuid".to_string()),
            ..Default::default()
        });
        assert_eq!(bad_term.unwrap_err().status(), StatusCode::BAD_REQUEST);

        let bad_status = filter_from_query(dto::EnrollmentQuery {
            status: Some("pending".to_string()),
            ..Default::default()
        });
        assert_eq!(bad_status.unwrap_err().status(), StatusCode::BAD_REQUEST);
    }
}
