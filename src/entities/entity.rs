// 🧩 Entity - a node in the public-records knowledge graph
//
// Identity (UUID) never changes; names, aliases, and attributes accumulate
// as new observations resolve to the same node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reserved attribute key: set of originating source names.
pub const ATTR_SOURCES: &str = "sources";

/// Reserved attribute key: timestamp of first sighting.
pub const ATTR_DISCOVERED_AT: &str = "discovered_at";

/// Reserved attribute key: timestamp of the latest attribute merge.
pub const ATTR_LAST_UPDATED: &str = "last_updated";

// ============================================================================
// ENTITY TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Organization,
    /// Political committee (stored as an organization in the graph)
    Committee,
    /// Contract or filing (stored as an event in the graph)
    Contract,
    Event,
    Location,
    Topic,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Committee => "committee",
            EntityType::Contract => "contract",
            EntityType::Event => "event",
            EntityType::Location => "location",
            EntityType::Topic => "topic",
        }
    }

    /// Parse a source-supplied type label. Unknown labels fall back to
    /// `Organization`.
    pub fn from_str_lossy(s: &str) -> EntityType {
        match s.trim().to_lowercase().as_str() {
            "person" => EntityType::Person,
            "organization" => EntityType::Organization,
            "committee" => EntityType::Committee,
            "contract" | "filing" => EntityType::Contract,
            "event" => EntityType::Event,
            "location" => EntityType::Location,
            "topic" => EntityType::Topic,
            _ => EntityType::Organization,
        }
    }

    /// Map a candidate type onto the graph type used at entity creation.
    ///
    /// Committees are stored as organizations, contracts/filings as events;
    /// everything else maps 1:1.
    pub fn graph_type(&self) -> EntityType {
        match self {
            EntityType::Committee => EntityType::Organization,
            EntityType::Contract => EntityType::Event,
            other => *other,
        }
    }
}

// ============================================================================
// ENTITY
// ============================================================================

/// A stored knowledge-graph node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identity (UUID) - assigned at creation, never changes
    pub id: String,

    /// Graph type (already mapped, see `EntityType::graph_type`)
    pub entity_type: EntityType,

    /// Canonical display name. Not changed by attribute merges; an entity
    /// merge preserves the primary's name.
    pub name: String,

    /// Canonical comparison form of `name`, backing the create-race
    /// idempotency index
    pub normalized_name: String,

    /// Alternate names. Grows monotonically, de-duplicated.
    pub aliases: Vec<String>,

    /// Open key→value map of source-specific fields plus the reserved
    /// keys `sources`, `discovered_at`, `last_updated`. Callers must not
    /// assume any key is present.
    pub attributes: HashMap<String, serde_json::Value>,

    /// Popularity/priority signal, 1-10
    pub importance: i64,

    /// Incremented on every observation that resolves to this entity
    pub mention_count: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Add an alias, skipping duplicates and the canonical name itself.
    pub fn add_alias(&mut self, alias: &str) {
        if alias != self.name && !self.aliases.iter().any(|a| a == alias) {
            self.aliases.push(alias.to_string());
        }
    }

    /// Originating source names recorded in the reserved `sources` key.
    pub fn sources(&self) -> Vec<String> {
        self.attributes
            .get(ATTR_SOURCES)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Look up a string attribute by key.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mapping() {
        assert_eq!(EntityType::Committee.graph_type(), EntityType::Organization);
        assert_eq!(EntityType::Contract.graph_type(), EntityType::Event);
        assert_eq!(EntityType::Person.graph_type(), EntityType::Person);
        assert_eq!(EntityType::Topic.graph_type(), EntityType::Topic);
    }

    #[test]
    fn test_type_parsing() {
        assert_eq!(EntityType::from_str_lossy("person"), EntityType::Person);
        assert_eq!(EntityType::from_str_lossy(" Committee "), EntityType::Committee);
        assert_eq!(EntityType::from_str_lossy("filing"), EntityType::Contract);
        // Unknown labels default to organization
        assert_eq!(EntityType::from_str_lossy("spaceship"), EntityType::Organization);
        assert_eq!(EntityType::from_str_lossy(""), EntityType::Organization);
    }

    #[test]
    fn test_add_alias_dedup() {
        let mut entity = Entity {
            id: "e1".to_string(),
            entity_type: EntityType::Organization,
            name: "Acme".to_string(),
            normalized_name: "acme".to_string(),
            aliases: vec![],
            attributes: HashMap::new(),
            importance: 5,
            mention_count: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        entity.add_alias("Acme Inc");
        entity.add_alias("Acme Inc");
        entity.add_alias("Acme"); // canonical name, skipped

        assert_eq!(entity.aliases, vec!["Acme Inc".to_string()]);
    }
}
