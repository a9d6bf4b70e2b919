//! Configurable HTTP mock servers.
//!
//! A YAML document declares any number of mock servers, each with its own
//! port and endpoints. Responses are Jinja templates rendered against the
//! path variables of the URL pattern, or files served from disk. An optional
//! management API exposes request statistics and runtime substitutions.

pub mod config;
pub mod endpoint;
pub mod management;
pub mod mock_server;
pub mod response;
pub mod runtime;
pub mod statistics;
pub mod substitution;
pub mod template;

pub use config::{ConfigDocument, ConfigError};
pub use runtime::{
    shutdown_signal, ManagementConfig, RunningRuntime, Runtime, RuntimeConfig, RuntimeError,
    ShutdownSummary,
};
