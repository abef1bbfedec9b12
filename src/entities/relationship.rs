// 🔗 Relationship - directed, typed edge between two entities
//
// Edges are owned by neither endpoint. Invariant: source and target must
// always reference live entities; the entity merger re-points every edge
// touching a duplicate before the duplicate is deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_entity_id: String,
    pub target_entity_id: String,
    /// Free-form edge label (e.g. "donated_to", "board_member_of")
    pub relationship_type: String,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// Does this edge touch the given entity on either end?
    pub fn references(&self, entity_id: &str) -> bool {
        self.source_entity_id == entity_id || self.target_entity_id == entity_id
    }
}
