#![allow(dead_code)]

// tests/common/mod.rs
use backend_test_support::EnvFixture;
use scribe_backend::Settings;

// Logging is auto-installed for every test binary
#[ctor::ctor]
fn init_logging() {
    backend_test_support::logging::init();
}

/// Settings built from the fixture environment plus `pairs`.
pub fn settings_with(pairs: &[(&str, &str)]) -> Settings {
    let env = EnvFixture::new().with_all(pairs);
    Settings::from_lookup(|k| env.get(k)).expect("fixture settings should load")
}
