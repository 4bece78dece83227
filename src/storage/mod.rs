//! Storage subsystem: coercion schema, label tables, typed records, persisted state.

pub mod labels;
pub mod record;
pub mod schema;
pub mod state_store;
