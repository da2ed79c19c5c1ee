//! Infrastructure layer - database bootstrap, schema and application state.

pub mod db;
pub mod schema;
pub mod state;
