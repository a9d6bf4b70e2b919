//! Configuration loading.
//!
//! A document is read from disk, parsed, validated as a whole, and then
//! compiled into a [`RuntimeConfig`]. Relative `file://` references are
//! resolved against the directory that contains the document.

mod document;
mod validation;

use crate::endpoint::EndpointSpec;
use crate::mock_server::{validate_routes, RouteError, ServerSpec};
use crate::response::{CompileError, ResponseCompiler};
use crate::runtime::{ManagementConfig, RuntimeConfig};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub use document::{ConfigDocument, EndpointDocument, ServerDocument, DEFAULT_MANAGEMENT_PORT};
pub use validation::{validate_response, ALLOWED_STATUS_CODES};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{}", .0.join("\n"))]
    Invalid(Vec<String>),
    #[error("{location}: {source}")]
    Compile {
        location: String,
        #[source]
        source: CompileError,
    },
    #[error(transparent)]
    Route(#[from] RouteError),
}

impl ConfigDocument {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let violations = self.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(violations))
        }
    }

    /// Compile every response and check every route
    pub fn compile(&self, compiler: &ResponseCompiler) -> Result<RuntimeConfig, ConfigError> {
        let mut servers = Vec::with_capacity(self.servers.len());

        for server in &self.servers {
            let mut endpoints = Vec::with_capacity(server.endpoints.len());
            for endpoint in &server.endpoints {
                let mut spec = EndpointSpec::new(endpoint.url.as_str());
                for (method, response) in endpoint.responses() {
                    let compiled =
                        compiler
                            .compile(response)
                            .map_err(|source| ConfigError::Compile {
                                location: format!(
                                    "server '{}', {} {}",
                                    server.name, method, endpoint.url
                                ),
                                source,
                            })?;
                    spec = spec.with_response(method, compiled);
                }
                endpoints.push(spec);
            }

            let spec = ServerSpec {
                name: server.name.clone(),
                port: server.port,
                endpoints,
            };
            validate_routes(&spec)?;
            debug!(
                "Compiled server {} with {} endpoint(s)",
                spec.name,
                spec.endpoints.len()
            );
            servers.push(spec);
        }

        Ok(RuntimeConfig {
            servers,
            management: ManagementConfig {
                port: self.management_port,
                collect_statistics: self.collect_statistics,
                allow_substitutions: self.allow_substitutions,
            },
            compiler: compiler.clone(),
        })
    }
}

fn read(path: &Path) -> Result<ConfigDocument, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(ConfigDocument::parse(&text)?)
}

/// Read, validate and compile the document at `path`
pub fn load(path: impl AsRef<Path>) -> Result<RuntimeConfig, ConfigError> {
    let path = path.as_ref();
    let document = read(path)?;
    document.validate()?;

    let compiler = ResponseCompiler::for_config_file(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = document.compile(&compiler)?;
    info!(
        "Loaded {} server(s) from {}",
        config.servers.len(),
        path.display()
    );
    Ok(config)
}

/// Parse and validate the document at `path` without compiling it
pub fn check(path: impl AsRef<Path>) -> Result<ConfigDocument, ConfigError> {
    let document = read(path.as_ref())?;
    document.validate()?;
    Ok(document)
}
