use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

pub mod auth;
pub mod catalog;
pub mod common;
pub mod courses;
pub mod enrollments;
pub mod me;
pub mod payments;
pub mod system;

/// Endpoints that need no session: sign-up, login and catalog browsing.
pub fn public_router() -> Router {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/courses", get(courses::list_courses))
        .route("/courses/:id", get(courses::get_course))
        .route("/instructors", get(catalog::list_instructors))
        .route("/terms", get(catalog::list_terms))
}

/// Router for all authenticated endpoints.
///
/// Shares some paths with [`public_router`] under different methods; axum
/// merges the method routers.
pub fn protected_router() -> Router {
    Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/me", get(me::whoami))
        .route("/me/enrollments", get(enrollments::list_mine))
        .route("/me/avatar", put(me::upload_avatar))
        .route("/courses", post(courses::create_course))
        .route("/courses/:id/cost", patch(courses::update_cost))
        .route("/instructors", post(catalog::create_instructor))
        .route("/terms", post(catalog::create_term))
        .route("/sections", post(catalog::create_section))
        .route("/enrollments", post(enrollments::enroll))
        .route("/enrollments/:id", delete(enrollments::cancel))
        .route("/payments", post(payments::top_up).get(payments::list_payments))
}
