//! Test utilities and fixtures for Kiln
//!
//! This crate provides shared test helpers for the integration tests
//! (tests/ directory) of the kiln crates.

pub mod fixtures;
pub mod mocks;
