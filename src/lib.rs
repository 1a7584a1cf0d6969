//! fabric-reconciler: desired-state reconciliation for fabric controllers
//!
//! Computes the difference between caller-declared fabric objects and what
//! the controller holds, applies it through the controller REST API,
//! deploys the change to the affected switches and waits for them to
//! report synchronized configuration.

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod kinds;
pub mod object;

pub use crate::error::{Error, Result};
