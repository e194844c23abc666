//! ofn: install and uninstall OpenFunction and its dependency stack
//!
//! The [`orchestrator`] resolves which components and versions a cluster
//! needs, runs the [`installer`] for each of them concurrently and keeps an
//! installation [`record`] per cluster context.

pub mod cli;
pub mod components;
pub mod config;
pub mod convergence;
pub mod error;
pub mod installer;
pub mod kube;
pub mod orchestrator;
pub mod progress;
pub mod record;
pub mod release;

pub use error::{Error, Result};
