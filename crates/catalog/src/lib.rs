//! Catalog domain module: courses and their scheduled sections.
//!
//! Pure validation and data shapes only (no IO, no HTTP, no storage).

pub mod course;
pub mod instructor;
pub mod section;
pub mod term;

pub use course::{Course, NewCourse};
pub use instructor::{Instructor, NewInstructor};
pub use section::{DayOfWeek, NewSection, ScheduleSlot, Section, SectionView};
pub use term::{NewTerm, Term};
