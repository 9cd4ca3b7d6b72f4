//! EXO Common Library
//!
//! Shared definitions for every crate of the EXO joint controller workspace.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Workspace-wide constants
//! - [`drive`] - Object-dictionary register catalogue, lifecycle and drive errors
//! - [`control`] - Controller modes, parameter snapshots and bus messages
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use exo_common::drive::{DataType, Register};
//! use exo_common::config::{ConfigLoader, SharedConfig};
//!
//! assert_eq!(Register::ControlWord.default_address(), 0x6040);
//! assert_eq!(DataType::U16.to_string(), "u16");
//! ```

pub mod config;
pub mod consts;
pub mod control;
pub mod drive;
pub mod prelude;
