// 🔍 Duplicate Scanner - batch sweep for likely-duplicate entities
//
// All-pairs similarity over a bounded sample of the entity population.
// Deliberately O(n²): this runs as a batch/operator job, never on the
// resolution hot path, and the sample cap keeps it tractable.

use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};

use crate::db::EntityStore;
use crate::similarity::similarity;

/// Upper bound on entities loaded for one scan.
pub const DEFAULT_SCAN_LIMIT: usize = 500;

/// A likely-duplicate pair surfaced for review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatePair {
    pub entity_id_1: String,
    pub entity_id_2: String,
    pub name_1: String,
    pub name_2: String,
    /// Name similarity, `threshold <= score < 1.0`
    pub score: f64,
}

pub struct DuplicateScanner {
    /// Entities loaded per scan (default: 500)
    pub scan_limit: usize,
}

impl DuplicateScanner {
    /// Create scanner with the default sample bound
    pub fn new() -> Self {
        DuplicateScanner {
            scan_limit: DEFAULT_SCAN_LIMIT,
        }
    }

    /// Find pairs of entities whose names score at or above `threshold`,
    /// sorted descending by score.
    ///
    /// Identical names (score 1.0) are excluded: those should already have
    /// collapsed through the exact-match stage, and surfacing them here
    /// would only drown the review queue.
    pub fn find_duplicates(
        &self,
        store: &EntityStore,
        threshold: f64,
    ) -> Result<Vec<DuplicatePair>> {
        let entities = store.list_entities(None, self.scan_limit)?;

        let mut pairs = Vec::new();
        for i in 0..entities.len() {
            for j in (i + 1)..entities.len() {
                let score = similarity(&entities[i].name, &entities[j].name);
                if score >= threshold && score < 1.0 {
                    pairs.push(DuplicatePair {
                        entity_id_1: entities[i].id.clone(),
                        entity_id_2: entities[j].id.clone(),
                        name_1: entities[i].name.clone(),
                        name_2: entities[j].name.clone(),
                        score,
                    });
                }
            }
        }

        pairs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        info!(
            "duplicate scan over {} entities found {} pairs at threshold {:.2}",
            entities.len(),
            pairs.len(),
            threshold
        );
        Ok(pairs)
    }
}

impl Default for DuplicateScanner {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
