//! # dirkit-core
//!
//! Core types shared by the directory object crates.
//!
//! ## Modules
//!
//! - [`error`] - The closed error taxonomy and result alias
//! - [`guid`] - The rename-stable object identifier
//! - [`credentials`] - Bind credentials with a zeroizing password
//! - [`config`] - Serializable, validated client settings and protocol limits

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod guid;

// Re-export commonly used types
pub use error::{Error, Result};
pub use guid::ObjectGuid;
