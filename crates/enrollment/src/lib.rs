//! `campus-enrollment` — the enrollment ledger.
//!
//! Decides whether a student may enroll in (or cancel from) a section and how
//! the account's credit balance moves with it. Everything here is pure: the
//! store reads a snapshot inside its transaction, asks this crate for a
//! decision, and applies the decision's writes in the same transaction.

pub mod account;
pub mod enrollment;
pub mod error;
pub mod ledger;
pub mod payment;

pub use account::{Account, AccountBalance, ProfileFields, StudentProfile};
pub use enrollment::{Enrollment, EnrollmentStatus};
pub use error::LedgerError;
pub use ledger::{
    CancelDecision, CancelSnapshot, EnrollCommand, EnrollDecision, EnrollSnapshot, PriceDrift,
    RefundPolicy, SectionTerms, TopUpDecision, decide_cancel, decide_enroll, decide_top_up,
};
pub use payment::{NewPayment, Payment};
