//! End-to-end flows against a deployed stack. Enable with
//! `cargo test --features system_tests` once the three services are up;
//! the admin allow-list must contain admin@example.com.

#[cfg(all(test, feature = "system_tests"))]
mod system_tests;
