// 🗄️ Entity store - SQLite-backed storage contract for the knowledge graph
//
// The store is constructed explicitly and passed by reference; there is no
// global connection. Open it at process start, drop it at shutdown.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::entities::{Entity, EntityType, IdentifierKind, Relationship};
use crate::normalize::normalize;

/// Columns selected for every entity read, in `entity_from_row` order.
const ENTITY_COLUMNS: &str = "id, entity_type, name, normalized_name, aliases, attributes, \
     importance, mention_count, created_at, updated_at";

// ============================================================================
// AUDIT EVENT
// ============================================================================

/// Append-only audit record for graph mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    /// Source name that triggered the mutation ("operator" for manual runs)
    pub source: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        source: &str,
    ) -> Self {
        Event {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            source: source.to_string(),
        }
    }
}

// ============================================================================
// INSERT OUTCOME
// ============================================================================

/// Result of an entity insert against the idempotency index.
///
/// Two concurrent resolutions of the same normalized name race between the
/// exact-match read and the create write; the unique index on
/// `(entity_type, normalized_name)` makes the loser observe `Existing`
/// instead of creating a duplicate.
#[derive(Debug)]
pub enum InsertOutcome {
    /// A new row was created with this id
    Created(String),
    /// An entity with the same type and normalized name already exists
    Existing(Entity),
}

// ============================================================================
// ENTITY STORE
// ============================================================================

pub struct EntityStore {
    conn: Connection,
}

impl EntityStore {
    /// Open (creating if needed) a file-backed store.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open entity store at {}", path.display()))?;
        Self::setup(&conn)?;
        Ok(EntityStore { conn })
    }

    /// Open an in-memory store (tests, throwaway runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory store")?;
        Self::setup(&conn)?;
        Ok(EntityStore { conn })
    }

    fn setup(conn: &Connection) -> Result<()> {
        // WAL mode for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                name TEXT NOT NULL,
                normalized_name TEXT NOT NULL,
                aliases TEXT NOT NULL,
                attributes TEXT NOT NULL,
                importance INTEGER NOT NULL DEFAULT 5,
                mention_count INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Idempotency index: at most one entity per (type, normalized name).
        // The resolution cascade relies on insert-or-fetch against this.
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_identity
             ON entities(entity_type, normalized_name)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entities_name
             ON entities(name COLLATE NOCASE)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS relationships (
                id TEXT PRIMARY KEY,
                source_entity_id TEXT NOT NULL,
                target_entity_id TEXT NOT NULL,
                relationship_type TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_relationships_source
             ON relationships(source_entity_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_relationships_target
             ON relationships(target_entity_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT UNIQUE NOT NULL,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                data TEXT NOT NULL,
                source TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_entity
             ON events(entity_id)",
            [],
        )?;

        Ok(())
    }

    // ========================================================================
    // ENTITY LOOKUPS
    // ========================================================================

    /// Case-insensitive equality lookup against stored entity names.
    /// Ties broken by insertion order.
    pub fn find_entity_by_exact_name(&self, name: &str) -> Result<Option<Entity>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE name = ?1 COLLATE NOCASE
             ORDER BY rowid LIMIT 1"
        );
        self.conn
            .query_row(&sql, params![name], entity_from_row)
            .optional()
            .context("failed to query entity by exact name")
    }

    /// Point lookup by a strong external identifier stored in the
    /// attributes column.
    pub fn find_entity_by_identifier(
        &self,
        kind: IdentifierKind,
        value: &str,
    ) -> Result<Option<Entity>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE json_extract(attributes, '$.{}') = ?1
             ORDER BY rowid LIMIT 1",
            kind.attribute_key()
        );
        self.conn
            .query_row(&sql, params![value], entity_from_row)
            .optional()
            .with_context(|| format!("failed to query entity by {}", kind.attribute_key()))
    }

    /// Lookup against the idempotency index (insert-or-fetch support).
    pub fn find_entity_by_normalized_name(
        &self,
        entity_type: EntityType,
        normalized_name: &str,
    ) -> Result<Option<Entity>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE entity_type = ?1 AND normalized_name = ?2"
        );
        self.conn
            .query_row(&sql, params![entity_type.as_str(), normalized_name], entity_from_row)
            .optional()
            .context("failed to query entity by normalized name")
    }

    pub fn get_entity(&self, id: &str) -> Result<Option<Entity>> {
        let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1");
        self.conn
            .query_row(&sql, params![id], entity_from_row)
            .optional()
            .context("failed to query entity by id")
    }

    /// List entities in insertion order, optionally restricted to one graph
    /// type, up to `limit` rows. Used by the fuzzy stage and the duplicate
    /// scanner; both bound their scans with `limit`.
    pub fn list_entities(
        &self,
        type_filter: Option<EntityType>,
        limit: usize,
    ) -> Result<Vec<Entity>> {
        let mut entities = Vec::new();

        match type_filter {
            Some(entity_type) => {
                let sql = format!(
                    "SELECT {ENTITY_COLUMNS} FROM entities
                     WHERE entity_type = ?1
                     ORDER BY rowid LIMIT ?2"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows =
                    stmt.query_map(params![entity_type.as_str(), limit as i64], entity_from_row)?;
                for row in rows {
                    entities.push(row?);
                }
            }
            None => {
                let sql =
                    format!("SELECT {ENTITY_COLUMNS} FROM entities ORDER BY rowid LIMIT ?1");
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![limit as i64], entity_from_row)?;
                for row in rows {
                    entities.push(row?);
                }
            }
        }

        Ok(entities)
    }

    pub fn count_entities(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))
            .context("failed to count entities")
    }

    /// Entity counts grouped by graph type, for operator summaries.
    pub fn count_entities_by_type(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_type, COUNT(*) FROM entities
             GROUP BY entity_type ORDER BY COUNT(*) DESC",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    // ========================================================================
    // ENTITY WRITES
    // ========================================================================

    /// Insert a new entity. The normalized name is derived here so the
    /// idempotency index can never drift from the display name.
    pub fn insert_entity(
        &self,
        entity_type: EntityType,
        name: &str,
        aliases: &[String],
        attributes: &HashMap<String, serde_json::Value>,
        importance: i64,
        mention_count: i64,
    ) -> Result<InsertOutcome> {
        let id = uuid::Uuid::new_v4().to_string();
        let normalized_name = normalize(name);
        let now = Utc::now().to_rfc3339();
        let aliases_json = serde_json::to_string(aliases)?;
        let attributes_json = serde_json::to_string(attributes)?;

        let result = self.conn.execute(
            "INSERT INTO entities (
                id, entity_type, name, normalized_name, aliases, attributes,
                importance, mention_count, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                entity_type.as_str(),
                name,
                normalized_name,
                aliases_json,
                attributes_json,
                importance,
                mention_count,
                now,
                now,
            ],
        );

        match result {
            Ok(_) => Ok(InsertOutcome::Created(id)),
            Err(rusqlite::Error::SqliteFailure(err, msg))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // Another writer holds this (type, normalized name); hand
                // the caller the winning row instead of a duplicate.
                match self.find_entity_by_normalized_name(entity_type, &normalized_name)? {
                    Some(existing) => Ok(InsertOutcome::Existing(existing)),
                    None => Err(rusqlite::Error::SqliteFailure(err, msg))
                        .context("entity insert hit a constraint but no existing row was found"),
                }
            }
            Err(e) => Err(e).context("failed to insert entity"),
        }
    }

    /// Partial update: only the supplied fields change; `updated_at` is
    /// always refreshed. The entity's name and type are not updatable
    /// through this contract.
    pub fn update_entity(
        &self,
        id: &str,
        attributes: Option<&HashMap<String, serde_json::Value>>,
        aliases: Option<&[String]>,
        mention_count: Option<i64>,
    ) -> Result<()> {
        let attributes_json = attributes.map(serde_json::to_string).transpose()?;
        let aliases_json = aliases.map(serde_json::to_string).transpose()?;
        let now = Utc::now().to_rfc3339();

        let changed = self.conn.execute(
            "UPDATE entities
             SET attributes = COALESCE(?1, attributes),
                 aliases = COALESCE(?2, aliases),
                 mention_count = COALESCE(?3, mention_count),
                 updated_at = ?4
             WHERE id = ?5",
            params![attributes_json, aliases_json, mention_count, now, id],
        )?;

        if changed == 0 {
            bail!("cannot update entity {id}: not found");
        }
        Ok(())
    }

    pub fn delete_entity(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM entities WHERE id = ?1", params![id])
            .with_context(|| format!("failed to delete entity {id}"))?;
        Ok(())
    }

    // ========================================================================
    // RELATIONSHIPS
    // ========================================================================

    pub fn insert_relationship(
        &self,
        source_entity_id: &str,
        target_entity_id: &str,
        relationship_type: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO relationships (
                id, source_entity_id, target_entity_id, relationship_type, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                source_entity_id,
                target_entity_id,
                relationship_type,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    /// All edges touching the entity, on either end.
    pub fn relationships_for_entity(&self, entity_id: &str) -> Result<Vec<Relationship>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_entity_id, target_entity_id, relationship_type, created_at
             FROM relationships
             WHERE source_entity_id = ?1 OR target_entity_id = ?1
             ORDER BY rowid",
        )?;
        let relationships = stmt
            .query_map(params![entity_id], |row| {
                let created_at: String = row.get(4)?;
                Ok(Relationship {
                    id: row.get(0)?,
                    source_entity_id: row.get(1)?,
                    target_entity_id: row.get(2)?,
                    relationship_type: row.get(3)?,
                    created_at: parse_timestamp(&created_at)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(relationships)
    }

    /// Rewrite every edge referencing `from_entity_id` (as source or
    /// target) to reference `to_entity_id`. Returns the number of edges
    /// rewritten. Must run before the referenced entity is deleted.
    pub fn repoint_relationships(&self, from_entity_id: &str, to_entity_id: &str) -> Result<usize> {
        let as_source = self.conn.execute(
            "UPDATE relationships SET source_entity_id = ?1 WHERE source_entity_id = ?2",
            params![to_entity_id, from_entity_id],
        )?;
        let as_target = self.conn.execute(
            "UPDATE relationships SET target_entity_id = ?1 WHERE target_entity_id = ?2",
            params![to_entity_id, from_entity_id],
        )?;
        Ok(as_source + as_target)
    }

    // ========================================================================
    // AUDIT EVENTS
    // ========================================================================

    pub fn append_event(&self, event: &Event) -> Result<()> {
        self.conn.execute(
            "INSERT INTO events (
                event_id, timestamp, event_type, entity_type, entity_id, data, source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.event_id,
                event.timestamp.to_rfc3339(),
                event.event_type,
                event.entity_type,
                event.entity_id,
                serde_json::to_string(&event.data)?,
                event.source,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_entity(&self, entity_id: &str) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, source
             FROM events
             WHERE entity_id = ?1
             ORDER BY rowid",
        )?;
        let events = stmt
            .query_map(params![entity_id], |row| {
                let timestamp: String = row.get(1)?;
                let data_json: String = row.get(5)?;
                Ok(Event {
                    event_id: row.get(0)?,
                    timestamp: parse_timestamp(&timestamp)?,
                    event_type: row.get(2)?,
                    entity_type: row.get(3)?,
                    entity_id: row.get(4)?,
                    data: serde_json::from_str(&data_json).unwrap_or_default(),
                    source: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn parse_timestamp(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| rusqlite::Error::InvalidQuery)
}

fn entity_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity> {
    let entity_type: String = row.get(1)?;
    let aliases_json: String = row.get(4)?;
    let attributes_json: String = row.get(5)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(Entity {
        id: row.get(0)?,
        entity_type: EntityType::from_str_lossy(&entity_type),
        name: row.get(2)?,
        normalized_name: row.get(3)?,
        aliases: serde_json::from_str(&aliases_json).unwrap_or_default(),
        attributes: serde_json::from_str(&attributes_json).unwrap_or_default(),
        importance: row.get(6)?,
        mention_count: row.get(7)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn insert_org(store: &EntityStore, name: &str) -> String {
        match store
            .insert_entity(EntityType::Organization, name, &[], &HashMap::new(), 5, 1)
            .unwrap()
        {
            InsertOutcome::Created(id) => id,
            InsertOutcome::Existing(e) => panic!("unexpected existing entity {}", e.id),
        }
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let store = EntityStore::open_in_memory().unwrap();

        let aliases = vec!["ACME".to_string(), "Acme Co".to_string()];
        let attributes = attrs(&[
            ("tax_id", json!("12-3456789")),
            ("sources", json!(["registry"])),
        ]);

        let outcome = store
            .insert_entity(EntityType::Organization, "Acme Inc", &aliases, &attributes, 5, 1)
            .unwrap();
        let id = match outcome {
            InsertOutcome::Created(id) => id,
            InsertOutcome::Existing(_) => panic!("expected a fresh insert"),
        };

        let entity = store.get_entity(&id).unwrap().unwrap();
        assert_eq!(entity.name, "Acme Inc");
        assert_eq!(entity.normalized_name, "acme");
        assert_eq!(entity.entity_type, EntityType::Organization);
        assert_eq!(entity.aliases, aliases);
        assert_eq!(entity.attributes["tax_id"], json!("12-3456789"));
        assert_eq!(entity.sources(), vec!["registry".to_string()]);
        assert_eq!(entity.mention_count, 1);
    }

    #[test]
    fn test_exact_name_lookup_is_case_insensitive() {
        let store = EntityStore::open_in_memory().unwrap();
        let id = insert_org(&store, "Acme Widget Company");

        let found = store.find_entity_by_exact_name("ACME WIDGET COMPANY").unwrap();
        assert_eq!(found.map(|e| e.id), Some(id));

        assert!(store.find_entity_by_exact_name("Acme Widget").unwrap().is_none());
    }

    #[test]
    fn test_identifier_lookup() {
        let store = EntityStore::open_in_memory().unwrap();
        let attributes = attrs(&[("tax_id", json!("98-7654321"))]);
        let outcome = store
            .insert_entity(EntityType::Organization, "Helix Fund", &[], &attributes, 5, 1)
            .unwrap();
        let id = match outcome {
            InsertOutcome::Created(id) => id,
            InsertOutcome::Existing(_) => panic!(),
        };

        let found = store
            .find_entity_by_identifier(IdentifierKind::TaxId, "98-7654321")
            .unwrap();
        assert_eq!(found.map(|e| e.id), Some(id));

        let missing = store
            .find_entity_by_identifier(IdentifierKind::RegistryId, "98-7654321")
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_normalized_name_conflict_returns_existing() {
        let store = EntityStore::open_in_memory().unwrap();
        let first_id = insert_org(&store, "Acme Inc");

        // Different display name, same canonical identity
        let outcome = store
            .insert_entity(EntityType::Organization, "Acme Corp", &[], &HashMap::new(), 5, 1)
            .unwrap();
        match outcome {
            InsertOutcome::Existing(existing) => assert_eq!(existing.id, first_id),
            InsertOutcome::Created(_) => panic!("expected the idempotency index to fire"),
        }

        // A different type with the same normalized name does not collide
        let outcome = store
            .insert_entity(EntityType::Person, "Acme", &[], &HashMap::new(), 5, 1)
            .unwrap();
        assert!(matches!(outcome, InsertOutcome::Created(_)));
        assert_eq!(store.count_entities().unwrap(), 2);
    }

    #[test]
    fn test_partial_update() {
        let store = EntityStore::open_in_memory().unwrap();
        let id = insert_org(&store, "Acme Inc");

        // Bump mention count only; attributes and aliases stay untouched
        store.update_entity(&id, None, None, Some(7)).unwrap();
        let entity = store.get_entity(&id).unwrap().unwrap();
        assert_eq!(entity.mention_count, 7);
        assert!(entity.aliases.is_empty());

        let attributes = attrs(&[("state", json!("DE"))]);
        let aliases = vec!["ACME".to_string()];
        store
            .update_entity(&id, Some(&attributes), Some(&aliases), None)
            .unwrap();
        let entity = store.get_entity(&id).unwrap().unwrap();
        assert_eq!(entity.mention_count, 7);
        assert_eq!(entity.aliases, aliases);
        assert_eq!(entity.attributes["state"], json!("DE"));

        assert!(store.update_entity("no-such-id", None, None, Some(1)).is_err());
    }

    #[test]
    fn test_list_entities_filter_limit_and_order() {
        let store = EntityStore::open_in_memory().unwrap();
        let a = insert_org(&store, "Alpha Org");
        let b = insert_org(&store, "Beta Org");
        store
            .insert_entity(EntityType::Person, "Carol Person", &[], &HashMap::new(), 5, 1)
            .unwrap();

        let orgs = store.list_entities(Some(EntityType::Organization), 100).unwrap();
        assert_eq!(
            orgs.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec![a.as_str(), b.as_str()],
            "insertion order expected"
        );

        let all = store.list_entities(None, 2).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_repoint_and_delete() {
        let store = EntityStore::open_in_memory().unwrap();
        let primary = insert_org(&store, "Acme Inc");
        let duplicate = insert_org(&store, "Acme Industries");
        let other = insert_org(&store, "Widget Works");

        store.insert_relationship(&duplicate, &other, "contracted_with").unwrap();
        store.insert_relationship(&other, &duplicate, "donated_to").unwrap();

        let repointed = store.repoint_relationships(&duplicate, &primary).unwrap();
        assert_eq!(repointed, 2);

        store.delete_entity(&duplicate).unwrap();
        assert!(store.get_entity(&duplicate).unwrap().is_none());

        let edges = store.relationships_for_entity(&primary).unwrap();
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|r| !r.references(&duplicate)));
        assert!(store.relationships_for_entity(&duplicate).unwrap().is_empty());
    }

    #[test]
    fn test_event_log_roundtrip() {
        let store = EntityStore::open_in_memory().unwrap();
        let event = Event::new(
            "entity_created",
            "organization",
            "e-123",
            json!({"name": "Acme Inc"}),
            "registry",
        );
        store.append_event(&event).unwrap();

        let events = store.events_for_entity("e-123").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "entity_created");
        assert_eq!(events[0].source, "registry");
        assert_eq!(events[0].data["name"], json!("Acme Inc"));
    }

    #[test]
    fn test_file_backed_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");

        let id = {
            let store = EntityStore::open(&path).unwrap();
            insert_org(&store, "Acme Inc")
        };

        let store = EntityStore::open(&path).unwrap();
        let entity = store.get_entity(&id).unwrap().unwrap();
        assert_eq!(entity.name, "Acme Inc");
        assert_eq!(store.count_entities().unwrap(), 1);
    }
}
