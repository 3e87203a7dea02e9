//!
//! Common types and utilities shared by the FX dispatcher server and client.
//!
//! This crate aggregates:
//! - `error`: unified error type `DispatchError` used across the workspace.
//! - `result`: handy `Result<T, DispatchError>` alias.
//! - `quote`: the quote payload and its 4-digit price precision.
//! - `command`: JSON command/response lines exchanged between client and server.
//! - `net`: networking constants and stream framing.
#![warn(missing_docs)]
pub mod command;
pub mod error;
pub mod net;
pub mod quote;
pub mod result;

pub use command::{Command, Response};
pub use error::DispatchError;
pub use quote::Quote;
pub use result::Result;
