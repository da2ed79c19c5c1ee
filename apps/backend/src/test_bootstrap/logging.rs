#![cfg(test)]

//! Unit-test logging hook; delegates to the shared test-support initializer
//! so unit and integration tests log the same way.

pub fn init() {
    backend_test_support::logging::init();
}
