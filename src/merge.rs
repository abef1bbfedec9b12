// 🧬 Entity Merger - fold a confirmed duplicate into its primary
//
// Step order is the correctness contract: relationships are re-pointed
// BEFORE the duplicate is deleted, so no edge ever references a dead id.

use anyhow::Result;
use chrono::Utc;
use log::{info, warn};
use serde_json::json;

use crate::db::{EntityStore, Event};
use crate::entities::ATTR_LAST_UPDATED;

/// Merge the duplicate entity into the primary:
///
/// 1. load both (no-op if either is missing, or if they are the same id)
/// 2. alias union: primary keeps its aliases and absorbs the duplicate's
///    name and aliases
/// 3. attribute merge: duplicate's values as base, primary's overriding
/// 4. write the merged aliases + attributes onto the primary
/// 5. re-point every relationship touching the duplicate to the primary
/// 6. delete the duplicate — only after step 5 has completed
pub fn merge_entities(store: &EntityStore, primary_id: &str, duplicate_id: &str) -> Result<()> {
    if primary_id == duplicate_id {
        warn!("refusing to merge entity {primary_id} into itself");
        return Ok(());
    }

    let Some(primary) = store.get_entity(primary_id)? else {
        warn!("merge skipped: primary entity {primary_id} not found");
        return Ok(());
    };
    let Some(duplicate) = store.get_entity(duplicate_id)? else {
        warn!("merge skipped: duplicate entity {duplicate_id} not found");
        return Ok(());
    };

    let mut aliases = primary.aliases.clone();
    let mut absorbed = vec![duplicate.name.clone()];
    absorbed.extend(duplicate.aliases.iter().cloned());
    for alias in absorbed {
        if alias != primary.name && !aliases.contains(&alias) {
            aliases.push(alias);
        }
    }

    // Primary wins on conflict; the duplicate only fills gaps
    let mut attributes = duplicate.attributes.clone();
    for (key, value) in &primary.attributes {
        attributes.insert(key.clone(), value.clone());
    }
    attributes.insert(ATTR_LAST_UPDATED.to_string(), json!(Utc::now().to_rfc3339()));

    store.update_entity(primary_id, Some(&attributes), Some(&aliases), None)?;

    let repointed = store.repoint_relationships(duplicate_id, primary_id)?;
    store.delete_entity(duplicate_id)?;

    info!(
        "merged entity {} ({:?}) into {} ({:?}), {} relationships re-pointed",
        duplicate_id, duplicate.name, primary_id, primary.name, repointed
    );

    let event = Event::new(
        "entities_merged",
        primary.entity_type.as_str(),
        primary_id,
        json!({
            "absorbed_entity_id": duplicate_id,
            "absorbed_name": duplicate.name,
            "relationships_repointed": repointed,
        }),
        "operator",
    );
    if let Err(e) = store.append_event(&event) {
        warn!("failed to append merge event for entity {primary_id}: {e:#}");
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
