use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use campus_auth::Permission;
use campus_catalog::NewCourse;
use campus_core::{CourseId, Credits};

use crate::app::routes::common::{CmdAuth, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub async fn list_courses(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.catalog.list_courses().await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Course page: the course plus every section with live seat counts.
pub async fn get_course(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let course_id: CourseId = match parse_id(&id, "course") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let course = match services.catalog.get_course(course_id).await {
        Ok(Some(course)) => course,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "course not found"),
        Err(e) => return errors::store_error_to_response(e),
    };
    let sections = match services.catalog.sections_for_course(course_id).await {
        Ok(views) => views.iter().map(dto::section_view_to_json).collect::<Vec<_>>(),
        Err(e) => return errors::store_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "course": course,
            "sections": sections,
        })),
    )
        .into_response()
}

pub async fn create_course(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewCourse>,
) -> Response {
    let body = match CmdAuth::new(body, Permission::CATALOG_WRITE).authorize(&principal) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course = match body.into_course(CourseId::new()) {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.create_course(course).await {
        Ok(course) => {
            tracing::info!(course_id = %course.id, code = %course.code, "course created");
            (StatusCode::CREATED, Json(course)).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Reprice a course. Existing enrollments keep the amount they were charged.
pub async fn update_cost(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateCostRequest>,
) -> Response {
    let body = match CmdAuth::new(body, Permission::CATALOG_WRITE).authorize(&principal) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_id: CourseId = match parse_id(&id, "course") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cost = match Credits::new(body.credit_cost) {
        Ok(c) if !c.is_zero() => c,
        _ => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                "credit_cost must be positive",
            );
        }
    };

    match services.catalog.update_course_cost(course_id, cost).await {
        Ok(course) => {
            tracing::info!(course_id = %course.id, credit_cost = cost.amount(), "course repriced");
            (StatusCode::OK, Json(course)).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}
