//! `campus-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    AccountId, CourseId, EnrollmentId, InstructorId, PaymentId, SectionId, SessionId, StudentId,
    TermId,
};
pub use value_object::{Credits, ValueObject};
