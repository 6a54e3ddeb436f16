//! Shared domain types for the Notdienststation voice agent: the error
//! enum, environment configuration, call/caller/message modeling, and the
//! per-service settings data.

pub mod call;
pub mod config;
pub mod error;
pub mod location;
pub mod settings;

pub use call::{CallContext, CallerId, Intent, Message, Role};
pub use error::{Error, Result};
pub use location::Location;
