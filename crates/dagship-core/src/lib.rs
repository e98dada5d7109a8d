//! Core domain types and traits for dagship.
//!
//! This crate contains:
//! - Invocation identifiers
//! - Remote platform types and the `Platform` trait
//! - Container engine types and the `ImageHandler` / `ContainerHandler` traits
//! - Runtime version comparison

pub mod engine;
pub mod error;
pub mod id;
pub mod platform;
pub mod version;

pub use error::{Error, Result};
pub use id::RunId;
