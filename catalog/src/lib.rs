//! Catalog - relational schema introspection
//!
//! Reads the structural schema of PostgreSQL, MySQL and SQLite databases,
//! reconciles it into one canonical model with inferred relationships, and
//! keeps a persisted, atomically refreshed catalog per connection.

pub mod config;
pub mod entity;
pub mod inference;
pub mod inspector;
pub mod model;
pub mod normalizer;
pub mod orchestrator;
pub mod registry;
pub mod store;

pub use orchestrator::{IntrospectError, Introspector, RunState};
