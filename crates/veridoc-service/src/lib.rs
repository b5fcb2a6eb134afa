//! veridoc-service — Hosting layer for the verification pipeline.
//!
//! Owns the dedicated verifier thread and its async handle, configuration
//! layering (defaults, TOML policy file, env vars), and the file-backed
//! reference photo store. Transport in front of the handle is the
//! embedder's business.

pub mod config;
pub mod references;
pub mod verifier;

pub use config::ServiceConfig;
pub use references::DirReferenceStore;
pub use verifier::{spawn_verifier, VerifierError, VerifierHandle};
