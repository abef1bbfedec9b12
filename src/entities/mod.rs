// Graph data model
//
// Each entity has a stable identity (UUID) that never changes, while its
// aliases and attributes accumulate across observations. Candidates and
// resolution outcomes are ephemeral values that cross the producer boundary.

pub mod candidate;
pub mod entity;
pub mod relationship;

pub use candidate::{
    EntityCandidate, IdentifierKind, MatchMethod, ResolvedEntity, StrongIdentifiers,
};
pub use entity::{Entity, EntityType, ATTR_DISCOVERED_AT, ATTR_LAST_UPDATED, ATTR_SOURCES};
pub use relationship::Relationship;
