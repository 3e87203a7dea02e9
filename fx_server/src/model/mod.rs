//! Domain models for the dispatcher.
//!
//! - `instruments`: the startup instrument list and its file loader.
//! - `subscriber`: subscriber entries, lifecycle states and the output handle trait.
//! - `idle_monitor`: idle tracker used to time out silent streams.

pub mod idle_monitor;
pub mod instruments;
pub mod subscriber;
