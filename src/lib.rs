// Civic Graph - Entity Resolution & Deduplication Engine
// Decides whether each public-records observation refers to a known graph
// entity or a new one, and merges attributes without creating duplicates.

pub mod db;
pub mod deduplication;
pub mod entities;
pub mod merge;
pub mod normalize;
pub mod resolution;
pub mod similarity;

// Re-export commonly used types
pub use db::{EntityStore, Event, InsertOutcome};
pub use deduplication::{DuplicatePair, DuplicateScanner, DEFAULT_SCAN_LIMIT};
pub use entities::{
    Entity, EntityCandidate, EntityType, IdentifierKind, MatchMethod, Relationship,
    ResolvedEntity, StrongIdentifiers, ATTR_DISCOVERED_AT, ATTR_LAST_UPDATED, ATTR_SOURCES,
};
pub use merge::merge_entities;
pub use normalize::normalize;
pub use resolution::{
    ResolutionEngine, DEFAULT_FUZZY_SCAN_LIMIT, DEFAULT_FUZZY_THRESHOLD, DEFAULT_IMPORTANCE,
};
pub use similarity::similarity;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
