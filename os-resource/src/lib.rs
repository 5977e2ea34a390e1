//! The `os` resource provider interface.
//!
//! A resource provider is a process that the orchestrator spawns and talks to
//! over JSON-RPC on its stdin/stdout. This crate contains the wire types, the
//! [`framework::ResourceProvider`] trait that provider implementations fill
//! in, and [`framework::run_main`] which does the process plumbing.

pub mod framework;
pub mod rpc;
pub mod schema;
