//! Core shared library for the Manifold fleet-management services.
//!
//! This crate exposes reusable primitives that the services depend on:
//! caller identity and roles, common errors, configuration loading and
//! logging setup.

pub mod config;
pub mod errors;
pub mod identity;
pub mod logging;

pub use errors::{CoreError, Result as CoreResult};
pub use identity::{Actor, Role};
