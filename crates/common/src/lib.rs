//! Error plumbing shared by every credlink crate.

pub mod error;

pub use error::{FromMessage, join_context};
