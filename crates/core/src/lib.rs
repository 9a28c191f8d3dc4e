//! Core functionality shared by the cardchain workspace.
//!
//! This crate carries the pieces every other crate leans on but which have
//! nothing to do with cryptography: configuration, logging initialisation and
//! the core error type. Configuration is always constructed explicitly and
//! handed to the components that need it; there is no process-wide state.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, KeycardConfig, StorageConfig, MAX_EXPIRATION_DAYS};
pub use error::{CoreError, CoreResult};
