//! Shared fixtures for the Hearth integration tests.

pub mod fixtures;
