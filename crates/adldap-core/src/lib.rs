//! # adldap-core
//!
//! Core types shared by the adldap crates.
//!
//! ## Modules
//!
//! - [`error`] - Error type covering policy, consistency and transport failures
//! - [`config`] - Provider configuration and bind credentials

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{BindCredentials, ProviderConfig};
pub use error::{Error, Result};
