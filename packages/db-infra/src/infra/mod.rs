//! Infrastructure layer - engine construction, sessions and probes.

pub mod db;
