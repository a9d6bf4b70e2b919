//! Compilation of declared responses into [`CompiledResponse`] values.

use super::spec::{ResponseBody, ResponseSpec};
use super::{CompiledResponse, FileResponse, TemplateResponse};
use crate::template::CompiledTemplate;
use hyper::header::CONTENT_TYPE;
use hyper::http::{HeaderName, HeaderValue};
use hyper::{HeaderMap, StatusCode};
use regex::Regex;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Scheme prefix of file references
pub const FILE_SCHEME: &str = "file://";

/// Content type of template responses that do not declare one
pub const DEFAULT_TEMPLATE_CONTENT_TYPE: &str = "text/plain";

/// A `template` value matching this is read from disk instead of used inline
static FILE_REFERENCE_REGEX: OnceLock<Regex> = OnceLock::new();

fn file_reference_regex() -> &'static Regex {
    FILE_REFERENCE_REGEX.get_or_init(|| {
        Regex::new(r"^file://[/\w.\-]*$").expect("file reference pattern is valid")
    })
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("response must declare exactly one of 'template' or 'file'")]
    AmbiguousBody,
    #[error("file reference '{0}' must start with {FILE_SCHEME}")]
    NotAFileReference(String),
    #[error("File does not exist {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid template: {0}")]
    Template(#[from] minijinja::Error),
    #[error("invalid status code {0}")]
    InvalidStatus(u16),
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
}

/// Compiles [`ResponseSpec`]s, resolving relative `file://` references
/// against the directory of the configuration document.
#[derive(Debug, Clone)]
pub struct ResponseCompiler {
    base_dir: PathBuf,
}

impl ResponseCompiler {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Compiler rooted at the directory containing `config_path`
    pub fn for_config_file(config_path: &Path) -> io::Result<Self> {
        let absolute = std::path::absolute(config_path)?;
        let base_dir = absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        Ok(Self::new(base_dir))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a `file://` reference to a path
    pub fn resolve(&self, reference: &str) -> PathBuf {
        resolve_file_reference(reference, &self.base_dir)
    }

    pub fn compile(&self, spec: &ResponseSpec) -> Result<CompiledResponse, CompileError> {
        let body = spec.body().ok_or(CompileError::AmbiguousBody)?;
        let mut headers = compile_headers(spec)?;

        match body {
            ResponseBody::Template(source) => {
                let template = self.compile_template(source)?;
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static(DEFAULT_TEMPLATE_CONTENT_TYPE),
                    );
                }
                let status = match spec.status_code {
                    Some(code) => {
                        StatusCode::from_u16(code).map_err(|_| CompileError::InvalidStatus(code))?
                    }
                    None => StatusCode::OK,
                };
                Ok(CompiledResponse::Template(TemplateResponse {
                    template,
                    headers,
                    status,
                }))
            }
            ResponseBody::File(reference) => {
                if !reference.starts_with(FILE_SCHEME) {
                    return Err(CompileError::NotAFileReference(reference.to_string()));
                }
                // Existence is checked per request; the path may depend on path variables
                let path = self.resolve(reference);
                let path_template = CompiledTemplate::compile(path.to_string_lossy())?;
                Ok(CompiledResponse::File(FileResponse {
                    path_template,
                    headers,
                }))
            }
        }
    }

    fn compile_template(&self, source: &str) -> Result<CompiledTemplate, CompileError> {
        if !file_reference_regex().is_match(source) {
            return Ok(CompiledTemplate::compile(source)?);
        }

        let path = self.resolve(source);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CompileError::FileNotFound(path))
            }
            Err(source) => return Err(CompileError::Io { path, source }),
        };
        Ok(CompiledTemplate::compile(text)?)
    }
}

fn compile_headers(spec: &ResponseSpec) -> Result<HeaderMap, CompileError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &spec.headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| CompileError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let header_value =
            HeaderValue::from_str(&value.to_string()).map_err(|e| CompileError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        headers.insert(header_name, header_value);
    }
    if let Some(content_type) = &spec.content_type {
        let value =
            HeaderValue::from_str(content_type).map_err(|e| CompileError::InvalidHeader {
                name: CONTENT_TYPE.to_string(),
                reason: e.to_string(),
            })?;
        headers.insert(CONTENT_TYPE, value);
    }
    Ok(headers)
}

/// Strip the `file://` scheme; absolute paths are kept, relative ones are
/// joined onto `base_dir`. The result is lexically normalised.
pub fn resolve_file_reference(reference: &str, base_dir: &Path) -> PathBuf {
    let raw = reference.strip_prefix(FILE_SCHEME).unwrap_or(reference);
    let joined = if raw.starts_with('/') {
        PathBuf::from(raw)
    } else {
        base_dir.join(raw)
    };
    normalize_path(&joined)
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}
