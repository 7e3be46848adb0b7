//! Core domain types and shared logic for the Spool media store.
//!
//! This crate defines what the other crates agree on:
//! - Artifact identifiers and their allow-list
//! - `Range` header resolution for partial content
//! - Configuration sections loaded at startup

pub mod artifact;
pub mod config;
pub mod error;
pub mod range;

pub use artifact::{ARTIFACT_CONTENT_TYPE, ARTIFACT_SUFFIX, ArtifactId};
pub use error::{Error, Result};
pub use range::{ResolvedRange, resolve_range};
