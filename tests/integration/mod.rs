//! Integration tests for redirsocks
//!
//! This module contains integration tests for verifying the behavior of the
//! relay in realistic scenarios on loopback.
//!
//! # Test Organization
//!
//! - `relay_e2e`: redirector and relay sessions against mock upstreams
//! - `socks5_dialer`: SOCKS5 dialer against a mock SOCKS5 server
//! - `support`: shared fixtures
//!
//! # Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test --test integration_tests
//!
//! # Run specific test module
//! cargo test --test integration_tests socks5
//! ```
//!
//! # Test Requirements
//!
//! All tests use loopback mock servers and need no privileges. Real
//! `SO_ORIGINAL_DST` lookups need NAT rules and are covered by unit tests
//! only as far as an unredirected socket allows.

pub mod relay_e2e;
pub mod socks5_dialer;
