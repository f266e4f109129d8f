//! Entity types and identity management.
//!
//! Companies, people and PE firms share one `Entity` record: a stable id,
//! external identifiers, a display name, and a type-specific profile of
//! classification flags. The flags are independent fields rather than a
//! single category; a company may be a client, a prospect, both, or neither.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Well-known external identifier keys.
pub mod identifiers {
    /// Company or firm web domain.
    pub const DOMAIN: &str = "domain";
    /// Professional-network profile id or URL.
    pub const NETWORK_ID: &str = "network_id";
    /// Email address (people).
    pub const EMAIL: &str = "email";
}

/// Classification flag names accepted in import payloads.
pub mod flags {
    /// Company or PE firm is a client.
    pub const IS_CLIENT: &str = "is_client";
    /// Company is a prospect.
    pub const IS_PROSPECT: &str = "is_prospect";
    /// Person is a known contact.
    pub const IS_KNOWN_CONTACT: &str = "is_known_contact";
}

/// Globally unique, stable entity identifier.
///
/// # Examples
///
/// ```
/// use warmpath::EntityId;
///
/// let id = EntityId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Creates a new random entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an entity ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// The three kinds of entity tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// An operating company.
    Company,
    /// A human person.
    Person,
    /// A private-equity firm.
    PeFirm,
}

impl EntityType {
    /// Identifier keys in the order used to pick an identity lock key.
    #[must_use]
    pub const fn preferred_identifiers(self) -> &'static [&'static str] {
        match self {
            Self::Company | Self::PeFirm => &[identifiers::DOMAIN, identifiers::NETWORK_ID],
            Self::Person => &[identifiers::NETWORK_ID, identifiers::EMAIL],
        }
    }

    /// Returns true if the classification flag applies to this type.
    #[must_use]
    pub fn supports_flag(self, flag: &str) -> bool {
        match self {
            Self::Company => flag == flags::IS_CLIENT || flag == flags::IS_PROSPECT,
            Self::PeFirm => flag == flags::IS_CLIENT,
            Self::Person => flag == flags::IS_KNOWN_CONTACT,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Company => write!(f, "company"),
            Self::Person => write!(f, "person"),
            Self::PeFirm => write!(f, "pe_firm"),
        }
    }
}

/// Sales pipeline stage of a prospect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProspectStatus {
    /// Identified, not yet qualified.
    Researching,
    /// Confirmed as a fit.
    Qualified,
    /// Approached with an offer.
    Pitched,
    /// Became a client.
    ClosedWon,
    /// Declined or dropped.
    ClosedLost,
}

impl fmt::Display for ProspectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Researching => "RESEARCHING",
            Self::Qualified => "QUALIFIED",
            Self::Pitched => "PITCHED",
            Self::ClosedWon => "CLOSED_WON",
            Self::ClosedLost => "CLOSED_LOST",
        };
        f.write_str(s)
    }
}

impl FromStr for ProspectStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RESEARCHING" => Ok(Self::Researching),
            "QUALIFIED" => Ok(Self::Qualified),
            "PITCHED" => Ok(Self::Pitched),
            "CLOSED_WON" => Ok(Self::ClosedWon),
            "CLOSED_LOST" => Ok(Self::ClosedLost),
            other => Err(ValidationError::InvalidField {
                field: "prospect_status".to_string(),
                reason: format!("unknown status '{other}'"),
            }),
        }
    }
}

/// Client and prospect classification for a company.
///
/// `is_active_client` is derived. It is recomputed by every setter that
/// touches its inputs and cannot be written directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    is_client: bool,
    client_start_date: Option<NaiveDate>,
    client_end_date: Option<NaiveDate>,
    is_active_client: bool,
    is_prospect: bool,
    prospect_added_date: Option<NaiveDate>,
    prospect_status: Option<ProspectStatus>,
}

impl CompanyProfile {
    /// Client flag as last imported; see `is_active_client` for the window.
    #[must_use]
    pub const fn is_client(&self) -> bool {
        self.is_client
    }

    /// First day of the client relationship.
    #[must_use]
    pub const fn client_start_date(&self) -> Option<NaiveDate> {
        self.client_start_date
    }

    /// Last day of the client relationship; `None` while ongoing.
    #[must_use]
    pub const fn client_end_date(&self) -> Option<NaiveDate> {
        self.client_end_date
    }

    /// Derived flag as of the last write or refresh.
    #[must_use]
    pub const fn is_active_client(&self) -> bool {
        self.is_active_client
    }

    /// True while the company is being pursued.
    #[must_use]
    pub const fn is_prospect(&self) -> bool {
        self.is_prospect
    }

    /// Day the company entered the prospect list.
    #[must_use]
    pub const fn prospect_added_date(&self) -> Option<NaiveDate> {
        self.prospect_added_date
    }

    /// Pipeline stage, if tracked.
    #[must_use]
    pub const fn prospect_status(&self) -> Option<ProspectStatus> {
        self.prospect_status
    }

    /// Evaluates the active-client predicate against an arbitrary day.
    #[must_use]
    pub fn is_active_client_on(&self, day: NaiveDate) -> bool {
        self.is_client
            && self.client_start_date.is_some()
            && self.client_end_date.map_or(true, |end| end > day)
    }

    /// Replaces the client window and recomputes `is_active_client`.
    ///
    /// A company becoming a client without a start date starts `today`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidInterval` if the end precedes the start;
    /// the profile is left unchanged in that case.
    pub fn set_client_window(
        &mut self,
        is_client: bool,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<(), ValidationError> {
        let start = match start {
            Some(start) => Some(start),
            None if is_client => Some(today),
            None => None,
        };
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(ValidationError::InvalidInterval { start, end });
            }
        }
        self.is_client = is_client;
        self.client_start_date = start;
        self.client_end_date = end;
        self.refresh(today);
        Ok(())
    }

    /// Sets prospect status. Becoming a prospect defaults the added date to
    /// `today` and the status to `Researching` unless already known.
    pub fn set_prospect(
        &mut self,
        is_prospect: bool,
        status: Option<ProspectStatus>,
        added: Option<NaiveDate>,
        today: NaiveDate,
    ) {
        self.is_prospect = is_prospect;
        if let Some(status) = status {
            self.prospect_status = Some(status);
        }
        if let Some(added) = added {
            self.prospect_added_date = Some(added);
        }
        if is_prospect {
            self.prospect_added_date.get_or_insert(today);
            self.prospect_status.get_or_insert(ProspectStatus::Researching);
        }
    }

    /// Recomputes derived flags against `today`. Returns true if anything changed.
    pub fn refresh(&mut self, today: NaiveDate) -> bool {
        let active = self.is_active_client_on(today);
        let changed = active != self.is_active_client;
        self.is_active_client = active;
        changed
    }
}

/// Contact classification for a person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonProfile {
    is_known_contact: bool,
    contact_source: Option<String>,
}

impl PersonProfile {
    /// True if someone on the home side knows this person.
    #[must_use]
    pub const fn is_known_contact(&self) -> bool {
        self.is_known_contact
    }

    /// Where the contact came from, e.g. a CRM export.
    #[must_use]
    pub fn contact_source(&self) -> Option<&str> {
        self.contact_source.as_deref()
    }

    /// Sets the known-contact flag. Only import payloads call this.
    pub fn set_known_contact(&mut self, known: bool, source: Option<String>) {
        self.is_known_contact = known;
        if source.is_some() {
            self.contact_source = source;
        }
    }
}

/// Client classification for a PE firm, independent of company clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeFirmProfile {
    /// Firm is a client.
    pub is_client: bool,
}

/// Type-specific classification data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum EntityProfile {
    /// Company classification.
    Company(CompanyProfile),
    /// Person classification.
    Person(PersonProfile),
    /// PE firm classification.
    PeFirm(PeFirmProfile),
}

impl EntityProfile {
    /// Default (all flags false) profile for a type.
    #[must_use]
    pub fn for_type(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Company => Self::Company(CompanyProfile::default()),
            EntityType::Person => Self::Person(PersonProfile::default()),
            EntityType::PeFirm => Self::PeFirm(PeFirmProfile::default()),
        }
    }

    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        match self {
            Self::Company(_) => EntityType::Company,
            Self::Person(_) => EntityType::Person,
            Self::PeFirm(_) => EntityType::PeFirm,
        }
    }
}

/// A company, person or PE firm.
///
/// # Examples
///
/// ```
/// use warmpath::{Entity, EntityType};
///
/// let entity = Entity::new(EntityType::Company, "Acme Corp")
///     .with_identifier("domain", "acme.com");
/// assert_eq!(entity.entity_type(), EntityType::Company);
/// assert_eq!(entity.identifier("domain"), Some("acme.com"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Stable id; never reused.
    pub id: EntityId,

    /// Display name as first imported.
    pub name: String,

    /// External identifiers, values already normalized.
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,

    /// Type-specific classification flags.
    pub profile: EntityProfile,

    /// Provenance tag of the import that created the entity.
    #[serde(default)]
    pub source_tag: String,

    /// When the entity was first stored.
    pub created_at: DateTime<Utc>,
    /// When the entity last changed.
    pub updated_at: DateTime<Utc>,

    /// Bumped on every stored change; updates must increase it.
    pub version: u64,
}

impl Entity {
    /// Creates a new entity with all classification flags false.
    #[must_use]
    pub fn new(entity_type: EntityType, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            name: name.into(),
            identifiers: BTreeMap::new(),
            profile: EntityProfile::for_type(entity_type),
            source_tag: String::new(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Adds an identifier (builder style). The value is stored as given.
    #[must_use]
    pub fn with_identifier(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.identifiers.insert(key.into(), value.into());
        self
    }

    /// Sets the provenance tag (builder style).
    #[must_use]
    pub fn with_source_tag(mut self, tag: impl Into<String>) -> Self {
        self.source_tag = tag.into();
        self
    }

    /// Type, derived from the profile variant.
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        self.profile.entity_type()
    }

    /// Stored identifier value for `key`.
    #[must_use]
    pub fn identifier(&self, key: &str) -> Option<&str> {
        self.identifiers.get(key).map(String::as_str)
    }

    /// Company profile, if this is a company.
    #[must_use]
    pub const fn company(&self) -> Option<&CompanyProfile> {
        match &self.profile {
            EntityProfile::Company(p) => Some(p),
            _ => None,
        }
    }

    /// Mutable company profile, if this is a company.
    pub fn company_mut(&mut self) -> Option<&mut CompanyProfile> {
        match &mut self.profile {
            EntityProfile::Company(p) => Some(p),
            _ => None,
        }
    }

    /// Person profile, if this is a person.
    #[must_use]
    pub const fn person(&self) -> Option<&PersonProfile> {
        match &self.profile {
            EntityProfile::Person(p) => Some(p),
            _ => None,
        }
    }

    /// Mutable person profile, if this is a person.
    pub fn person_mut(&mut self) -> Option<&mut PersonProfile> {
        match &mut self.profile {
            EntityProfile::Person(p) => Some(p),
            _ => None,
        }
    }

    /// PE firm profile, if this is a PE firm.
    #[must_use]
    pub const fn pe_firm(&self) -> Option<&PeFirmProfile> {
        match &self.profile {
            EntityProfile::PeFirm(p) => Some(p),
            _ => None,
        }
    }

    /// Mutable PE firm profile, if this is a PE firm.
    pub fn pe_firm_mut(&mut self) -> Option<&mut PeFirmProfile> {
        match &mut self.profile {
            EntityProfile::PeFirm(p) => Some(p),
            _ => None,
        }
    }

    /// True for active client companies and client PE firms.
    #[must_use]
    pub fn is_home_network_member(&self, day: NaiveDate) -> bool {
        match &self.profile {
            EntityProfile::Company(p) => p.is_active_client_on(day),
            EntityProfile::PeFirm(p) => p.is_client,
            EntityProfile::Person(_) => false,
        }
    }

    /// Updates the `updated_at` timestamp and increments the version.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl std::hash::Hash for Entity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
