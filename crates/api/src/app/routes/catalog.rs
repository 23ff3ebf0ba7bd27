//! Instructors, terms and sections.

use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use campus_auth::Permission;
use campus_catalog::{NewInstructor, NewSection, NewTerm};
use campus_core::{InstructorId, SectionId, TermId};

use crate::app::errors;
use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub async fn list_instructors(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.catalog.list_instructors().await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn create_instructor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewInstructor>,
) -> Response {
    let body = match CmdAuth::new(body, Permission::CATALOG_WRITE).authorize(&principal) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let instructor = match body.into_instructor(InstructorId::new()) {
        Ok(i) => i,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.create_instructor(instructor).await {
        Ok(instructor) => (StatusCode::CREATED, Json(instructor)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_terms(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.catalog.list_terms().await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn create_term(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewTerm>,
) -> Response {
    let body = match CmdAuth::new(body, Permission::CATALOG_WRITE).authorize(&principal) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let term = match body.into_term(TermId::new()) {
        Ok(t) => t,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.create_term(term).await {
        Ok(term) => (StatusCode::CREATED, Json(term)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn create_section(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewSection>,
) -> Response {
    let body = match CmdAuth::new(body, Permission::CATALOG_WRITE).authorize(&principal) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let section = match body.into_section(SectionId::new()) {
        Ok(s) => s,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.create_section(section).await {
        Ok(section) => {
            tracing::info!(section_id = %section.id, course_id = %section.course_id, capacity = section.capacity, "section created");
            (StatusCode::CREATED, Json(section)).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}
