// 🎯 Resolution Cascade - match an observation to the graph or create it
//
// Strategies in order, first hit wins:
//   1. Exact name   (confidence 1.00)
//   2. Identifier   (confidence 0.99)
//   3. Fuzzy name   (confidence = similarity score)
//   4. Create new   (confidence 1.00, is_new)

use anyhow::{bail, Result};
use chrono::Utc;
use log::{debug, info, warn};
use serde_json::json;

use crate::db::{EntityStore, Event, InsertOutcome};
use crate::entities::{
    Entity, EntityCandidate, EntityType, MatchMethod, ResolvedEntity, ATTR_DISCOVERED_AT,
    ATTR_LAST_UPDATED, ATTR_SOURCES,
};
use crate::normalize::normalize;
use crate::similarity::similarity;

/// Fuzzy acceptance threshold: a best score must strictly exceed this.
/// Trades recall against false-merge risk.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.85;

/// Upper bound on entities loaded for one fuzzy scan.
pub const DEFAULT_FUZZY_SCAN_LIMIT: usize = 500;

/// Importance assigned to freshly created entities, 1-10.
pub const DEFAULT_IMPORTANCE: i64 = 5;

pub struct ResolutionEngine {
    /// Minimum (exclusive) similarity for a fuzzy match (default: 0.85)
    pub fuzzy_threshold: f64,

    /// Entities loaded per fuzzy scan (default: 500)
    pub fuzzy_scan_limit: usize,
}

impl ResolutionEngine {
    /// Create engine with default thresholds
    pub fn new() -> Self {
        ResolutionEngine {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            fuzzy_scan_limit: DEFAULT_FUZZY_SCAN_LIMIT,
        }
    }

    /// Resolve one candidate observation against the graph.
    ///
    /// Storage errors in the match/create stages propagate and leave no
    /// partial entity behind; the caller owns retries. A failed attribute
    /// merge after a successful match is logged and swallowed.
    pub fn resolve(
        &self,
        store: &EntityStore,
        candidate: &EntityCandidate,
    ) -> Result<ResolvedEntity> {
        let normalized = normalize(&candidate.name);
        if normalized.is_empty() {
            bail!(
                "candidate name {:?} from source {:?} is empty after normalization",
                candidate.name,
                candidate.source
            );
        }

        // Stage 1: exact name
        if let Some(entity) = store.find_entity_by_exact_name(&candidate.name)? {
            debug!("exact match for {:?}: {}", candidate.name, entity.id);
            self.merge_into(store, &entity, candidate);
            return Ok(ResolvedEntity {
                entity_id: entity.id,
                is_new: false,
                confidence: 1.0,
                matched_by: MatchMethod::Exact,
            });
        }

        // Stage 2: strong identifiers, fixed priority order
        for (kind, value) in candidate.identifiers.in_priority_order() {
            if let Some(entity) = store.find_entity_by_identifier(kind, value)? {
                debug!(
                    "identifier match for {:?} on {}={}: {}",
                    candidate.name,
                    kind.attribute_key(),
                    value,
                    entity.id
                );
                self.merge_into(store, &entity, candidate);
                return Ok(ResolvedEntity {
                    entity_id: entity.id,
                    is_new: false,
                    confidence: 0.99,
                    matched_by: MatchMethod::Identifier,
                });
            }
        }

        // Stage 3: fuzzy name
        if let Some((entity, score)) = self.best_fuzzy_match(store, candidate)? {
            debug!(
                "fuzzy match for {:?}: {} ({:?}, score {:.3})",
                candidate.name, entity.id, entity.name, score
            );
            self.merge_into(store, &entity, candidate);
            return Ok(ResolvedEntity {
                entity_id: entity.id,
                is_new: false,
                confidence: score,
                matched_by: MatchMethod::Fuzzy,
            });
        }

        // Stage 4: create
        self.create_entity(store, candidate)
    }

    /// Scan a bounded pool for the highest-scoring entity, comparing the
    /// candidate name against each entity's name and every alias.
    ///
    /// Person/organization/committee candidates only scan their own mapped
    /// graph type; other types scan the whole pool. Entities arrive in
    /// insertion order, and only a strictly greater score displaces the
    /// running best, so exact ties keep the earliest entity.
    fn best_fuzzy_match(
        &self,
        store: &EntityStore,
        candidate: &EntityCandidate,
    ) -> Result<Option<(Entity, f64)>> {
        let type_filter = match candidate.entity_type {
            EntityType::Person | EntityType::Organization | EntityType::Committee => {
                Some(candidate.entity_type.graph_type())
            }
            _ => None,
        };

        let pool = store.list_entities(type_filter, self.fuzzy_scan_limit)?;

        let mut best: Option<(Entity, f64)> = None;
        for entity in pool {
            let mut score = similarity(&candidate.name, &entity.name);
            for alias in &entity.aliases {
                let alias_score = similarity(&candidate.name, alias);
                if alias_score > score {
                    score = alias_score;
                }
            }

            if best.as_ref().map_or(true, |(_, top)| score > *top) {
                best = Some((entity, score));
            }
        }

        Ok(best.filter(|(_, score)| *score > self.fuzzy_threshold))
    }

    fn create_entity(
        &self,
        store: &EntityStore,
        candidate: &EntityCandidate,
    ) -> Result<ResolvedEntity> {
        let graph_type = candidate.entity_type.graph_type();
        let now = Utc::now().to_rfc3339();

        let mut attributes = candidate.attributes.clone();
        for (kind, value) in candidate.identifiers.in_priority_order() {
            attributes.insert(kind.attribute_key().to_string(), json!(value));
        }
        attributes.insert(ATTR_SOURCES.to_string(), json!([candidate.source]));
        attributes.insert(ATTR_DISCOVERED_AT.to_string(), json!(now));
        attributes.insert(ATTR_LAST_UPDATED.to_string(), json!(now));

        let mut aliases: Vec<String> = Vec::new();
        for alias in &candidate.aliases {
            if *alias != candidate.name && !aliases.contains(alias) {
                aliases.push(alias.clone());
            }
        }

        let outcome = store.insert_entity(
            graph_type,
            &candidate.name,
            &aliases,
            &attributes,
            DEFAULT_IMPORTANCE,
            1,
        )?;

        match outcome {
            InsertOutcome::Created(entity_id) => {
                info!(
                    "created {} entity {} for {:?} (source {})",
                    graph_type.as_str(),
                    entity_id,
                    candidate.name,
                    candidate.source
                );
                self.record_event(
                    store,
                    "entity_created",
                    graph_type,
                    &entity_id,
                    json!({"name": candidate.name}),
                    candidate,
                );
                Ok(ResolvedEntity {
                    entity_id,
                    is_new: true,
                    confidence: 1.0,
                    matched_by: MatchMethod::New,
                })
            }
            // Lost the create race (or an equivalent canonical name already
            // exists): fold into the winning row instead of duplicating it.
            InsertOutcome::Existing(entity) => {
                debug!(
                    "create for {:?} collided with existing entity {}; merging",
                    candidate.name, entity.id
                );
                self.merge_into(store, &entity, candidate);
                Ok(ResolvedEntity {
                    entity_id: entity.id,
                    is_new: false,
                    confidence: 1.0,
                    matched_by: MatchMethod::Exact,
                })
            }
        }
    }

    // ========================================================================
    // ATTRIBUTE MERGER
    // ========================================================================

    /// Fold a matched candidate's attributes into the entity. A storage
    /// error here must not turn a successful match into a failure: it is
    /// logged and the resolved identity stands, at the cost of one missed
    /// attribute update.
    fn merge_into(&self, store: &EntityStore, entity: &Entity, candidate: &EntityCandidate) {
        if let Err(e) = self.apply_merge(store, entity, candidate) {
            warn!(
                "attribute merge into entity {} from source {} failed: {e:#}",
                entity.id, candidate.source
            );
        }
    }

    fn apply_merge(
        &self,
        store: &EntityStore,
        entity: &Entity,
        candidate: &EntityCandidate,
    ) -> Result<()> {
        // Candidate values win on key collision
        let mut attributes = entity.attributes.clone();
        for (key, value) in &candidate.attributes {
            attributes.insert(key.clone(), value.clone());
        }
        for (kind, value) in candidate.identifiers.in_priority_order() {
            attributes.insert(kind.attribute_key().to_string(), json!(value));
        }

        let mut sources = entity.sources();
        if !sources.contains(&candidate.source) {
            sources.push(candidate.source.clone());
        }
        attributes.insert(ATTR_SOURCES.to_string(), json!(sources));
        attributes.insert(ATTR_LAST_UPDATED.to_string(), json!(Utc::now().to_rfc3339()));

        let mut aliases = entity.aliases.clone();
        for alias in &candidate.aliases {
            if *alias != entity.name && !aliases.contains(alias) {
                aliases.push(alias.clone());
            }
        }

        store.update_entity(
            &entity.id,
            Some(&attributes),
            Some(&aliases),
            Some(entity.mention_count + 1),
        )?;

        self.record_event(
            store,
            "entity_matched",
            entity.entity_type,
            &entity.id,
            json!({"observed_name": candidate.name}),
            candidate,
        );
        Ok(())
    }

    /// Audit-trail append; failures are logged, never propagated.
    fn record_event(
        &self,
        store: &EntityStore,
        event_type: &str,
        entity_type: EntityType,
        entity_id: &str,
        data: serde_json::Value,
        candidate: &EntityCandidate,
    ) {
        let event = Event::new(
            event_type,
            entity_type.as_str(),
            entity_id,
            data,
            &candidate.source,
        );
        if let Err(e) = store.append_event(&event) {
            warn!("failed to append {event_type} event for entity {entity_id}: {e:#}");
        }
    }
}

impl Default for ResolutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
