//! Interval-scoped relationships between entities.
//!
//! A relationship is an SCD-style row: a start day, an optional end day, and
//! a derived `is_current` flag. Closing a relationship (setting its end day)
//! is the only mutation a stored relationship ever sees.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{EntityId, EntityType};
use crate::error::ValidationError;
use crate::time::{DateRange, IntervalStatus};

/// Unique identifier for a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipId(Uuid);

impl RelationshipId {
    /// Creates a new random relationship ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RelationshipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of relationship.
///
/// Party A/B roles: `Employment` and `BoardSeat` link a person (A) to a
/// company (B); `PeFirmEmployment` links a person (A) to a PE firm (B);
/// `Ownership` links an owner (A, PE firm or company) to an owned company (B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Employment,
    Ownership,
    BoardSeat,
    PeFirmEmployment,
}

impl RelationshipKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Employment,
        Self::Ownership,
        Self::BoardSeat,
        Self::PeFirmEmployment,
    ];

    /// Returns true if the kind ties a person to an organization.
    #[must_use]
    pub const fn is_employment_like(self) -> bool {
        matches!(self, Self::Employment | Self::BoardSeat | Self::PeFirmEmployment)
    }

    /// Checks that the party types fit this kind.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::PartyMismatch` when they do not.
    pub fn validate_parties(self, party_a: EntityType, party_b: EntityType) -> Result<(), ValidationError> {
        let ok = match self {
            Self::Employment | Self::BoardSeat => {
                party_a == EntityType::Person && party_b == EntityType::Company
            }
            Self::PeFirmEmployment => party_a == EntityType::Person && party_b == EntityType::PeFirm,
            Self::Ownership => {
                matches!(party_a, EntityType::PeFirm | EntityType::Company)
                    && party_b == EntityType::Company
            }
        };
        if ok {
            Ok(())
        } else {
            Err(ValidationError::PartyMismatch {
                kind: self,
                party_a,
                party_b,
            })
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Employment => write!(f, "employment"),
            Self::Ownership => write!(f, "ownership"),
            Self::BoardSeat => write!(f, "board_seat"),
            Self::PeFirmEmployment => write!(f, "pe_firm_employment"),
        }
    }
}

/// A dated relationship between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,

    pub kind: RelationshipKind,

    pub party_a: EntityId,

    pub party_b: EntityId,

    range: DateRange,

    is_current: bool,

    /// Job title or seat name, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub source_tag: String,

    pub recorded_at: DateTime<Utc>,
}

impl Relationship {
    /// Creates a relationship over `range`.
    #[must_use]
    pub fn new(kind: RelationshipKind, party_a: EntityId, party_b: EntityId, range: DateRange) -> Self {
        Self {
            id: RelationshipId::new(),
            kind,
            party_a,
            party_b,
            is_current: range.is_open_ended(),
            range,
            title: None,
            source_tag: String::new(),
            recorded_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_source_tag(mut self, tag: impl Into<String>) -> Self {
        self.source_tag = tag.into();
        self
    }

    #[must_use]
    pub const fn range(&self) -> &DateRange {
        &self.range
    }

    #[must_use]
    pub const fn start_date(&self) -> NaiveDate {
        self.range.start
    }

    #[must_use]
    pub const fn end_date(&self) -> Option<NaiveDate> {
        self.range.end
    }

    /// True while no end date is set.
    #[must_use]
    pub const fn is_current(&self) -> bool {
        self.is_current
    }

    /// Status of this relationship on `day`.
    #[must_use]
    pub fn status_on(&self, day: NaiveDate) -> IntervalStatus {
        self.range.status_on(day)
    }

    /// Returns true if the interval contains `day`.
    #[must_use]
    pub fn holds_on(&self, day: NaiveDate) -> bool {
        self.range.contains(day)
    }

    /// Returns true if `id` is one of the two parties.
    #[must_use]
    pub fn involves(&self, id: EntityId) -> bool {
        self.party_a == id || self.party_b == id
    }

    /// The party on the other side of `id`, if `id` is a party.
    #[must_use]
    pub fn other_party(&self, id: EntityId) -> Option<EntityId> {
        if self.party_a == id {
            Some(self.party_b)
        } else if self.party_b == id {
            Some(self.party_a)
        } else {
            None
        }
    }

    /// Sets the end day and recomputes `is_current`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidInterval` if `end` precedes the start.
    pub fn close(&mut self, end: NaiveDate) -> Result<(), ValidationError> {
        self.range.close_on(end)?;
        self.recompute_derived();
        Ok(())
    }

    pub(crate) fn recompute_derived(&mut self) {
        self.is_current = self.range.is_open_ended();
    }
}

impl PartialEq for Relationship {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Relationship {}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_open_relationship_is_current() {
        let rel = Relationship::new(
            RelationshipKind::Employment,
            EntityId::new(),
            EntityId::new(),
            DateRange::starting_on(day(2020, 1, 1)),
        );
        assert!(rel.is_current());
        assert_eq!(rel.end_date(), None);
    }

    #[test]
    fn test_close_recomputes_current() {
        let mut rel = Relationship::new(
            RelationshipKind::Ownership,
            EntityId::new(),
            EntityId::new(),
            DateRange::starting_on(day(2020, 1, 1)),
        );
        rel.close(day(2023, 6, 30)).unwrap();
        assert!(!rel.is_current());
        assert_eq!(rel.end_date(), Some(day(2023, 6, 30)));
        assert_eq!(rel.status_on(day(2024, 1, 1)), IntervalStatus::Former);
        assert!(rel.holds_on(day(2023, 6, 30)));
    }

    #[test]
    fn test_close_before_start_is_rejected() {
        let mut rel = Relationship::new(
            RelationshipKind::Employment,
            EntityId::new(),
            EntityId::new(),
            DateRange::starting_on(day(2020, 1, 1)),
        );
        assert!(rel.close(day(2019, 1, 1)).is_err());
        assert!(rel.is_current());
    }

    #[test]
    fn test_other_party() {
        let a = EntityId::new();
        let b = EntityId::new();
        let rel = Relationship::new(
            RelationshipKind::BoardSeat,
            a,
            b,
            DateRange::starting_on(day(2020, 1, 1)),
        );
        assert_eq!(rel.other_party(a), Some(b));
        assert_eq!(rel.other_party(b), Some(a));
        assert_eq!(rel.other_party(EntityId::new()), None);
    }

    #[test]
    fn test_validate_parties() {
        use EntityType::{Company, PeFirm, Person};

        assert!(RelationshipKind::Employment.validate_parties(Person, Company).is_ok());
        assert!(RelationshipKind::Employment.validate_parties(Company, Person).is_err());
        assert!(RelationshipKind::BoardSeat.validate_parties(Person, Company).is_ok());
        assert!(RelationshipKind::PeFirmEmployment.validate_parties(Person, PeFirm).is_ok());
        assert!(RelationshipKind::PeFirmEmployment.validate_parties(Person, Company).is_err());
        assert!(RelationshipKind::Ownership.validate_parties(PeFirm, Company).is_ok());
        assert!(RelationshipKind::Ownership.validate_parties(Company, Company).is_ok());
        assert!(RelationshipKind::Ownership.validate_parties(Company, PeFirm).is_err());
    }

    #[test]
    fn test_employment_like() {
        assert!(RelationshipKind::Employment.is_employment_like());
        assert!(RelationshipKind::PeFirmEmployment.is_employment_like());
        assert!(!RelationshipKind::Ownership.is_employment_like());
    }
}
