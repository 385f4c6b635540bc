//! Vivaio Kernel Library
//!
//! This library exposes kernel internals for integration testing.
//! The main entry point for running the server is the `vivaio` binary.

pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod file;
pub mod hook;
pub mod middleware;
pub mod plugin;
pub mod routes;
pub mod state;
pub mod store;
