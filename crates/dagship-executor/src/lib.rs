//! Container engine for dagship.
//!
//! Provides:
//! - Dockerfile parsing (base image and runtime tag discovery)
//! - The Docker engine: image build/tag/label/push and in-image checks

pub mod docker;
pub mod dockerfile;

pub use dagship_core::engine::{
    BuildContext, ContainerHandler, EngineFactory, ImageHandler, RegistryAuth,
};
pub use docker::{DockerContainerHandler, DockerEngine, DockerImageHandler};
pub use dockerfile::{Dockerfile, DockerfileError, image_tag};
