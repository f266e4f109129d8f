//! Import event payloads.
//!
//! The orchestration layer turns enrichment results into `ImportEvent`s and
//! hands them to the resolver. Classification flags travel explicitly in the
//! payload; nothing downstream infers them.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::entity::{EntityType, ProspectStatus};
use crate::error::ValidationError;
use crate::normalize::{name_key, normalize_identifier};

/// Optional typed attributes accompanying an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_start_date: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_end_date: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prospect_added_date: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prospect_status: Option<ProspectStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_source: Option<String>,
}

impl ImportAttributes {
    fn has_company_fields(&self) -> bool {
        self.client_start_date.is_some()
            || self.client_end_date.is_some()
            || self.prospect_added_date.is_some()
            || self.prospect_status.is_some()
    }
}

/// A structured record about one company, person or PE firm.
///
/// # Examples
///
/// ```
/// use warmpath::{EntityType, ImportEvent};
///
/// let event = ImportEvent::new(EntityType::Company, "Acme Corp")
///     .identifier("domain", "https://www.acme.com/")
///     .flag("is_client", true)
///     .source_tag("crm-sync");
/// assert!(event.validate().is_ok());
/// assert_eq!(event.normalized_identifiers()["domain"], "acme.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEvent {
    pub entity_type: EntityType,

    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,

    pub name: String,

    #[serde(default)]
    pub classification_flags: BTreeMap<String, bool>,

    #[serde(default)]
    pub attributes: ImportAttributes,

    #[serde(default)]
    pub source_tag: String,

    /// Cascade depth; 0 for imports that were not derived from another.
    #[serde(default)]
    pub depth: u32,
}

impl ImportEvent {
    /// Creates a depth-0 event with no identifiers or flags.
    #[must_use]
    pub fn new(entity_type: EntityType, name: impl Into<String>) -> Self {
        Self {
            entity_type,
            identifiers: BTreeMap::new(),
            name: name.into(),
            classification_flags: BTreeMap::new(),
            attributes: ImportAttributes::default(),
            source_tag: String::new(),
            depth: 0,
        }
    }

    #[must_use]
    pub fn identifier(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.identifiers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.classification_flags.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn attributes(mut self, attributes: ImportAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub fn source_tag(mut self, tag: impl Into<String>) -> Self {
        self.source_tag = tag.into();
        self
    }

    #[must_use]
    pub const fn depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Builds an event for an entity discovered while enriching this one.
    ///
    /// The child is one level deeper and inherits the source tag.
    #[must_use]
    pub fn derived(&self, entity_type: EntityType, name: impl Into<String>) -> Self {
        Self::new(entity_type, name)
            .source_tag(self.source_tag.clone())
            .depth(self.depth.saturating_add(1))
    }

    /// Explicit value of a classification flag, if the payload carries one.
    #[must_use]
    pub fn flag_value(&self, name: &str) -> Option<bool> {
        self.classification_flags.get(name).copied()
    }

    /// Identifiers with normalized values; empty values are dropped.
    #[must_use]
    pub fn normalized_identifiers(&self) -> BTreeMap<String, String> {
        self.identifiers
            .iter()
            .filter_map(|(key, value)| {
                let key = key.trim().to_lowercase();
                let value = normalize_identifier(&key, value);
                (!key.is_empty() && !value.is_empty()).then_some((key, value))
            })
            .collect()
    }

    /// Case-insensitive name key.
    #[must_use]
    pub fn name_key(&self) -> String {
        name_key(&self.name)
    }

    /// Rejects malformed payloads before anything touches the store.
    ///
    /// # Errors
    ///
    /// - `EmptyEntityName` if the name is blank
    /// - `EmptyIdentifier` if an identifier normalizes to nothing
    /// - `UnsupportedFlag` if a flag does not apply to the entity type
    /// - `InvalidField` if an attribute does not apply to the entity type
    /// - `InvalidInterval` if the client window ends before it starts
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyEntityName);
        }

        for (key, value) in &self.identifiers {
            if key.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    field: "identifier key".to_string(),
                });
            }
            if normalize_identifier(&key.trim().to_lowercase(), value).is_empty() {
                return Err(ValidationError::EmptyIdentifier { key: key.clone() });
            }
        }

        for flag in self.classification_flags.keys() {
            if !self.entity_type.supports_flag(flag) {
                return Err(ValidationError::UnsupportedFlag {
                    flag: flag.clone(),
                    entity_type: self.entity_type,
                });
            }
        }

        let attrs = &self.attributes;
        if self.entity_type != EntityType::Company && attrs.has_company_fields() {
            return Err(ValidationError::InvalidField {
                field: "attributes".to_string(),
                reason: format!("client and prospect dates only apply to companies, not {}", self.entity_type),
            });
        }
        if self.entity_type != EntityType::Person && attrs.contact_source.is_some() {
            return Err(ValidationError::InvalidField {
                field: "contact_source".to_string(),
                reason: format!("only applies to people, not {}", self.entity_type),
            });
        }
        if let (Some(start), Some(end)) = (attrs.client_start_date, attrs.client_end_date) {
            if end < start {
                return Err(ValidationError::InvalidInterval { start, end });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::flags;

    #[test]
    fn test_validate_ok() {
        let event = ImportEvent::new(EntityType::Person, "Jane Doe")
            .identifier("network_id", "linkedin.com/in/jane")
            .flag(flags::IS_KNOWN_CONTACT, true);
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_name() {
        let event = ImportEvent::new(EntityType::Company, "   ");
        assert!(matches!(event.validate(), Err(ValidationError::EmptyEntityName)));
    }

    #[test]
    fn test_validate_empty_identifier() {
        let event = ImportEvent::new(EntityType::Company, "Acme").identifier("domain", "https://");
        assert!(matches!(
            event.validate(),
            Err(ValidationError::EmptyIdentifier { .. })
        ));
    }

    #[test]
    fn test_validate_flag_for_wrong_type() {
        let event = ImportEvent::new(EntityType::Person, "Jane").flag(flags::IS_CLIENT, true);
        assert!(matches!(
            event.validate(),
            Err(ValidationError::UnsupportedFlag { .. })
        ));
    }

    #[test]
    fn test_validate_company_attributes_on_person() {
        let event = ImportEvent::new(EntityType::Person, "Jane").attributes(ImportAttributes {
            prospect_status: Some(ProspectStatus::Pitched),
            ..ImportAttributes::default()
        });
        assert!(matches!(
            event.validate(),
            Err(ValidationError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_validate_client_interval() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let event = ImportEvent::new(EntityType::Company, "Acme")
            .flag(flags::IS_CLIENT, true)
            .attributes(ImportAttributes {
                client_start_date: Some(start),
                client_end_date: Some(end),
                ..ImportAttributes::default()
            });
        assert!(matches!(
            event.validate(),
            Err(ValidationError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn test_derived_event_increments_depth() {
        let parent = ImportEvent::new(EntityType::PeFirm, "Summit").source_tag("pe-portfolio").depth(1);
        let child = parent.derived(EntityType::Company, "Portfolio Co");
        assert_eq!(child.depth, 2);
        assert_eq!(child.source_tag, "pe-portfolio");
        assert!(child.classification_flags.is_empty());
    }

    #[test]
    fn test_normalized_identifiers() {
        let event = ImportEvent::new(EntityType::Company, "Acme")
            .identifier("Domain", "WWW.ACME.COM")
            .identifier("network_id", "https://linkedin.com/company/acme/");
        let ids = event.normalized_identifiers();
        assert_eq!(ids["domain"], "acme.com");
        assert_eq!(ids["network_id"], "linkedin.com/company/acme");
    }

    #[test]
    fn test_deserialize_minimal_payload() {
        let json = r#"{"entity_type":"pe_firm","name":"Summit Partners"}"#;
        let event: ImportEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.entity_type, EntityType::PeFirm);
        assert_eq!(event.depth, 0);
        assert!(event.flag_value(flags::IS_CLIENT).is_none());
    }
}
