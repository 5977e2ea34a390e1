//! Local resources for the `os` provider.
//!
//! The only resource type is a text file; see [`text_file`] for the
//! lifecycle semantics and [`provider`] for how it is exposed to the
//! orchestrator.

pub mod logging;
pub mod provider;
pub mod text_file;
