// 📨 Entity candidates - ephemeral observations from upstream sources
//
// Producers (campaign-finance, nonprofit-filing, corporate-registry and
// similar clients) hand these to the resolution cascade; nothing here is
// persisted as-is.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::entity::EntityType;

// ============================================================================
// STRONG IDENTIFIERS
// ============================================================================

/// Externally-issued unique codes usable for high-confidence matching
/// without name comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentifierKind {
    /// Tax identifier (EIN)
    TaxId,
    /// Corporate registry identifier
    RegistryId,
    /// Election-commission identifier
    ElectionId,
}

impl IdentifierKind {
    /// Fixed priority order the cascade checks identifiers in.
    pub const PRIORITY: [IdentifierKind; 3] = [
        IdentifierKind::TaxId,
        IdentifierKind::RegistryId,
        IdentifierKind::ElectionId,
    ];

    /// Attribute key the identifier value is stored under.
    pub fn attribute_key(&self) -> &'static str {
        match self {
            IdentifierKind::TaxId => "tax_id",
            IdentifierKind::RegistryId => "registry_id",
            IdentifierKind::ElectionId => "election_id",
        }
    }
}

/// The strong identifiers an observation may carry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrongIdentifiers {
    pub tax_id: Option<String>,
    pub registry_id: Option<String>,
    pub election_id: Option<String>,
}

impl StrongIdentifiers {
    fn get(&self, kind: IdentifierKind) -> Option<&str> {
        let value = match kind {
            IdentifierKind::TaxId => &self.tax_id,
            IdentifierKind::RegistryId => &self.registry_id,
            IdentifierKind::ElectionId => &self.election_id,
        };
        value.as_deref().filter(|v| !v.trim().is_empty())
    }

    /// Present identifiers in cascade priority order (blank values skipped).
    pub fn in_priority_order(&self) -> Vec<(IdentifierKind, &str)> {
        IdentifierKind::PRIORITY
            .iter()
            .filter_map(|&kind| self.get(kind).map(|v| (kind, v)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.in_priority_order().is_empty()
    }
}

// ============================================================================
// ENTITY CANDIDATE
// ============================================================================

/// One observation of an entity, as produced by an upstream source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCandidate {
    pub name: String,
    pub entity_type: EntityType,
    /// Name of the originating source (e.g. "fec", "irs-990")
    pub source: String,
    #[serde(default)]
    pub identifiers: StrongIdentifiers,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl EntityCandidate {
    pub fn new(
        name: impl Into<String>,
        entity_type: EntityType,
        source: impl Into<String>,
    ) -> Self {
        EntityCandidate {
            name: name.into(),
            entity_type,
            source: source.into(),
            identifiers: StrongIdentifiers::default(),
            attributes: HashMap::new(),
            aliases: Vec::new(),
        }
    }

    /// Builder: add an alternate name
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Builder: add a free-form attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Builder: set a strong identifier
    pub fn with_identifier(mut self, kind: IdentifierKind, value: impl Into<String>) -> Self {
        let value = value.into();
        match kind {
            IdentifierKind::TaxId => self.identifiers.tax_id = Some(value),
            IdentifierKind::RegistryId => self.identifiers.registry_id = Some(value),
            IdentifierKind::ElectionId => self.identifiers.election_id = Some(value),
        }
        self
    }
}

// ============================================================================
// RESOLUTION OUTCOME
// ============================================================================

/// Which cascade stage produced the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Exact,
    Identifier,
    Fuzzy,
    New,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Exact => "exact",
            MatchMethod::Identifier => "identifier",
            MatchMethod::Fuzzy => "fuzzy",
            MatchMethod::New => "new",
        }
    }
}

/// Outcome of resolving one candidate observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub entity_id: String,
    pub is_new: bool,
    /// 0-1; 1.0 for exact/new, 0.99 for identifier, the similarity score
    /// for fuzzy
    pub confidence: f64,
    pub matched_by: MatchMethod,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_priority_order() {
        let ids = StrongIdentifiers {
            tax_id: Some("12-3456789".to_string()),
            registry_id: Some("C0123".to_string()),
            election_id: Some("C00654321".to_string()),
        };

        let present = ids.in_priority_order();
        assert_eq!(present.len(), 3);
        assert_eq!(present[0], (IdentifierKind::TaxId, "12-3456789"));
        assert_eq!(present[1], (IdentifierKind::RegistryId, "C0123"));
        assert_eq!(present[2], (IdentifierKind::ElectionId, "C00654321"));
    }

    #[test]
    fn test_blank_identifiers_skipped() {
        let ids = StrongIdentifiers {
            tax_id: Some("  ".to_string()),
            registry_id: None,
            election_id: Some("C00654321".to_string()),
        };

        let present = ids.in_priority_order();
        assert_eq!(present, vec![(IdentifierKind::ElectionId, "C00654321")]);
        assert!(!ids.is_empty());
        assert!(StrongIdentifiers::default().is_empty());
    }

    #[test]
    fn test_candidate_builder() {
        let candidate = EntityCandidate::new("Acme Inc", EntityType::Organization, "registry")
            .with_alias("ACME")
            .with_attribute("state", serde_json::json!("DE"))
            .with_identifier(IdentifierKind::TaxId, "12-3456789");

        assert_eq!(candidate.aliases, vec!["ACME".to_string()]);
        assert_eq!(candidate.attributes["state"], serde_json::json!("DE"));
        assert_eq!(candidate.identifiers.tax_id.as_deref(), Some("12-3456789"));
    }
}
