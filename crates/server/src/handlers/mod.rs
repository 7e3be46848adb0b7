//! HTTP request handlers.

pub mod artifacts;
pub mod ingest;
pub mod service;

pub use artifacts::*;
pub use ingest::*;
pub use service::*;
