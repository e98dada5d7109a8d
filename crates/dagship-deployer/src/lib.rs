//! Deploy pipeline for dagship.
//!
//! Provides:
//! - Workspace and deployment selection (explicit or interactive)
//! - Runtime version resolution and the image build stage
//! - Pre-deploy checks (DAG parse, pytest)
//! - The `Deployer` state machine that sequences it all

pub mod error;
pub mod image;
pub mod options;
pub mod pipeline;
pub mod selector;
pub mod validator;

#[cfg(test)]
mod testing;

pub use error::{DeployError, ErrorClass};
pub use options::{DeployMode, DeployOptions, DeployReport};
pub use pipeline::{DeployState, Deployer};
pub use selector::{LineReader, StdinReader};
