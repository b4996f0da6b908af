//! Session layer: seating, dealer rotation, deferred requests, the
//! live-table registry, and the tokio actor that serializes mutation.

pub mod actor;
pub mod config;
pub mod messages;
pub mod registry;
pub mod table;
