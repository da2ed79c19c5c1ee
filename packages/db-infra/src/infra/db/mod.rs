//! Database infrastructure - engine construction, sessions and connectivity probes.

pub mod core;
pub mod probe;
pub mod session;
pub mod sqlserver;

pub use self::core::Engine;
pub use probe::{probe, probe_url};
pub use session::{Session, SessionStats};
