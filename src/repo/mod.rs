//! Data access layer
//!
//! Typed read/write operations over the relational store, one module per
//! entity family. Every function takes `&mut PgConnection` so the importer
//! can scope a single transaction per recording; every upsert is keyed by
//! the entity's natural uniqueness and returns the final row.

pub mod contributions;
pub mod images;
pub mod imagery;
pub mod instruments;
pub mod links;
pub mod performers;
pub mod recordings;
pub mod releases;
pub mod songs;
pub mod streaming;
