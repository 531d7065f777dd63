//! # houscan
//!
//! A crawler that inventories a Houdini scripting session and persists its
//! modules, classes and functions to SQLite.
//!
//! ## Architecture
//!
//! - **model**: Record types flowing through the pipeline (entities, module bookkeeping)
//! - **host**: The `Host` trait abstracting the interpreter session behind object handles
//! - **session**: In-memory session graph loaded from a JSON snapshot; the in-tree `Host`
//! - **shim**: Process-level safety shims active around every import
//! - **discover**: Candidate module enumeration over the interpreter search paths
//! - **import**: Guarded dynamic import converting every failure mode into a record
//! - **walk**: Breadth-first reflective traversal with identity-based cycle detection
//! - **table**: Declarative SQLite table descriptors (DDL and insert generation)
//! - **db**: Database access and the streaming transactional writer
//! - **pipeline**: The end-to-end crawl wiring discovery to persistence
//! - **hfs**: Houdini installation discovery and default paths

pub mod cli;
pub mod db;
pub mod discover;
pub mod hfs;
pub mod host;
pub mod import;
pub mod model;
pub mod pipeline;
pub mod session;
pub mod shim;
pub mod table;
pub mod walk;
