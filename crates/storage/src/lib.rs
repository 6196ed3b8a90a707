//! Storage abstraction and implementations for revbench.
//!
//! This crate provides a trait-based interface for experiment and run
//! records with a JSON file reference implementation.

#![warn(missing_docs)]

pub mod trait_;
pub mod json_storage;

pub use trait_::{Storage, StorageError, Result};
pub use json_storage::JsonStorage;
