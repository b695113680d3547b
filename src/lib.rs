//! # arm-compat: ARM64 compatibility analysis engine
//!
//! Fetches a remote repository's file tree and content through a code
//! forge's REST API, routes relevant files to pluggable analyzers
//! (infrastructure templates, container images, dependency manifests),
//! consults package and container registries to resolve compatibility for
//! individual subjects, and aggregates everything into a single
//! [`model::Verdict`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       Orchestrator                       │
//! ├───────────────┬───────────────────────┬──────────────────┤
//! │  RepoFetcher  │       Analyzers       │  Registry clients │
//! │  (forge API)  │  infra / container /  │  (pypi / npm /    │
//! │               │      dependency       │  docker / wheel)  │
//! └───────────────┴───────────────────────┴──────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

/// Core infrastructure: configuration and the error taxonomy.
pub mod core {
    pub mod config;
    pub mod errors;
}

/// Code forge client (repository discovery, tree listing, file content).
pub mod forge;

/// Data model shared across the forge, analyzers, and orchestrator.
pub mod model;

/// Package and container registry clients, with process-lifetime caching.
pub mod registry;

/// Pluggable compatibility analyzers.
pub mod analyzers;

/// Ties the forge, analyzers, and registries together into one analysis run.
pub mod orchestrator;

pub use core::config::EngineConfig;
pub use core::errors::{EngineError, Result};
pub use model::Verdict;
pub use orchestrator::Orchestrator;

/// Crate version, as set in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
