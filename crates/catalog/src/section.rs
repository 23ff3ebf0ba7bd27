use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use campus_core::{CourseId, DomainError, Entity, InstructorId, SectionId, TermId, error::require_non_blank};

use crate::{Course, Instructor, Term};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn as_str(self) -> &'static str {
        match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        }
    }
}

impl core::str::FromStr for DayOfWeek {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monday" => Ok(DayOfWeek::Monday),
            "tuesday" => Ok(DayOfWeek::Tuesday),
            "wednesday" => Ok(DayOfWeek::Wednesday),
            "thursday" => Ok(DayOfWeek::Thursday),
            "friday" => Ok(DayOfWeek::Friday),
            "saturday" => Ok(DayOfWeek::Saturday),
            "sunday" => Ok(DayOfWeek::Sunday),
            other => Err(DomainError::validation(format!("unknown day of week '{other}'"))),
        }
    }
}

/// One weekly meeting of a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub day: DayOfWeek,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    pub room: String,
}

impl ScheduleSlot {
    fn overlaps(&self, other: &ScheduleSlot) -> bool {
        self.day == other.day && self.starts_at < other.ends_at && other.starts_at < self.ends_at
    }
}

/// A scheduled, capacity-bounded offering of a course.
///
/// The number of occupied seats is not stored here: it is always derived by
/// counting active enrollments, inside the same transaction that admits a
/// new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub course_id: CourseId,
    pub instructor_id: InstructorId,
    pub term_id: TermId,
    pub number: i32,
    pub capacity: u32,
    pub schedules: Vec<ScheduleSlot>,
}

impl Entity for Section {
    type Id = SectionId;

    fn id(&self) -> SectionId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSection {
    pub course_id: CourseId,
    pub instructor_id: InstructorId,
    pub term_id: TermId,
    pub number: i32,
    pub capacity: u32,
    #[serde(default)]
    pub schedules: Vec<ScheduleSlot>,
}

impl NewSection {
    pub fn into_section(self, id: SectionId) -> Result<Section, DomainError> {
        if self.number <= 0 {
            return Err(DomainError::validation("section number must be positive"));
        }
        if self.capacity == 0 {
            return Err(DomainError::validation("capacity must be positive"));
        }

        let mut schedules = Vec::with_capacity(self.schedules.len());
        for slot in self.schedules {
            if slot.ends_at <= slot.starts_at {
                return Err(DomainError::validation(format!(
                    "schedule on {} must end after it starts",
                    slot.day.as_str()
                )));
            }
            let slot = ScheduleSlot {
                room: require_non_blank("room", &slot.room)?,
                ..slot
            };
            if schedules.iter().any(|s: &ScheduleSlot| s.overlaps(&slot)) {
                return Err(DomainError::validation(format!(
                    "overlapping schedules on {}",
                    slot.day.as_str()
                )));
            }
            schedules.push(slot);
        }
        schedules.sort_by_key(|s| (s.day, s.starts_at));

        Ok(Section {
            id,
            course_id: self.course_id,
            instructor_id: self.instructor_id,
            term_id: self.term_id,
            number: self.number,
            capacity: self.capacity,
            schedules,
        })
    }
}

/// Read model: a section joined with everything a course page shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionView {
    pub section: Section,
    pub course: Course,
    pub instructor: Instructor,
    pub term: Term,
    pub seats_taken: u32,
}

impl SectionView {
    pub fn seats_remaining(&self) -> u32 {
        self.section.capacity.saturating_sub(self.seats_taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn slot(day: DayOfWeek, from: (u32, u32), to: (u32, u32)) -> ScheduleSlot {
        ScheduleSlot {
            day,
            starts_at: NaiveTime::from_hms_opt(from.0, from.1, 0).unwrap(),
            ends_at: NaiveTime::from_hms_opt(to.0, to.1, 0).unwrap(),
            room: "B-204".to_string(),
        }
    }

    fn new_section(capacity: u32, schedules: Vec<ScheduleSlot>) -> NewSection {
        NewSection {
            course_id: CourseId::new(),
            instructor_id: InstructorId::new(),
            term_id: TermId::new(),
            number: 1,
            capacity,
            schedules,
        }
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(
            new_section(0, vec![]).into_section(SectionId::new()),
            Err(DomainError::validation("capacity must be positive"))
        );
    }

    #[test]
    fn overlapping_slots_on_the_same_day_are_rejected() {
        let input = new_section(
            30,
            vec![
                slot(DayOfWeek::Monday, (8, 0), (10, 0)),
                slot(DayOfWeek::Monday, (9, 30), (11, 0)),
            ],
        );
        assert!(input.into_section(SectionId::new()).is_err());
    }

    #[test]
    fn back_to_back_slots_are_fine_and_sorted() {
        let section = new_section(
            30,
            vec![
                slot(DayOfWeek::Wednesday, (8, 0), (10, 0)),
                slot(DayOfWeek::Monday, (10, 0), (12, 0)),
                slot(DayOfWeek::Monday, (8, 0), (10, 0)),
            ],
        )
        .into_section(SectionId::new())
        .unwrap();

        let days: Vec<_> = section.schedules.iter().map(|s| (s.day, s.starts_at)).collect();
        assert_eq!(days[0].0, DayOfWeek::Monday);
        assert!(days[0].1 < days[1].1);
        assert_eq!(days[2].0, DayOfWeek::Wednesday);
    }

    fn any_slot() -> impl Strategy<Value = ScheduleSlot> {
        (0usize..7, 6u32..21, 1u32..4).prop_map(|(day, start, len)| {
            let days = [
                DayOfWeek::Monday,
                DayOfWeek::Tuesday,
                DayOfWeek::Wednesday,
                DayOfWeek::Thursday,
                DayOfWeek::Friday,
                DayOfWeek::Saturday,
                DayOfWeek::Sunday,
            ];
            slot(days[day], (start, 0), (start + len, 0))
        })
    }

    proptest! {
        #[test]
        fn accepted_sections_never_hold_overlapping_slots(
            slots in proptest::collection::vec(any_slot(), 0..8)
        ) {
            if let Ok(section) = new_section(10, slots).into_section(SectionId::new()) {
                for pair in section.schedules.windows(2) {
                    prop_assert!((pair[0].day, pair[0].starts_at) <= (pair[1].day, pair[1].starts_at));
                    prop_assert!(!pair[0].overlaps(&pair[1]));
                }
            }
        }
    }

    #[test]
    fn days_parse_case_insensitively() {
        assert_eq!("Friday".parse::<DayOfWeek>().unwrap(), DayOfWeek::Friday);
        assert_eq!(
            serde_json::to_value(DayOfWeek::Sunday).unwrap(),
            serde_json::json!("sunday")
        );
    }
}
