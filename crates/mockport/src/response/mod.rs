//! Response engine.
//!
//! This module provides:
//! - `ResponseSpec`: a response as declared in configuration
//! - `ResponseCompiler`: turns specs into `CompiledResponse` values at load time
//! - `CompiledResponse`: the render-ready form, either a template or a file
//!
//! Rendering never fails: template and file errors are written into the
//! response body as plain text.

mod builder;
mod compiler;
mod file;
mod spec;

pub use builder::{json_response, not_found, plain_text, ResponseBuilder, NOT_FOUND_BODY};
pub use compiler::{
    resolve_file_reference, CompileError, ResponseCompiler, DEFAULT_TEMPLATE_CONTENT_TYPE,
    FILE_SCHEME,
};
pub use spec::{HeaderValueSpec, ResponseBody, ResponseSpec};

use crate::template::{CompiledTemplate, PathVariables};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{HeaderMap, Method, Response, StatusCode};
use std::path::PathBuf;
use tracing::warn;

/// A response compiled from a [`ResponseSpec`]
#[derive(Debug)]
pub enum CompiledResponse {
    Template(TemplateResponse),
    File(FileResponse),
}

/// Body rendered from a template, with configured status and headers
#[derive(Debug)]
pub struct TemplateResponse {
    pub(crate) template: CompiledTemplate,
    pub(crate) headers: HeaderMap,
    pub(crate) status: StatusCode,
}

/// A file on disk, selected per request by rendering `path_template`
#[derive(Debug)]
pub struct FileResponse {
    pub(crate) path_template: CompiledTemplate,
    pub(crate) headers: HeaderMap,
}

impl CompiledResponse {
    /// Status the response is declared with. File responses are always 200.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CompiledResponse::Template(t) => t.status,
            CompiledResponse::File(_) => StatusCode::OK,
        }
    }

    /// Headers applied to every rendering of this response
    pub fn headers(&self) -> &HeaderMap {
        match self {
            CompiledResponse::Template(t) => &t.headers,
            CompiledResponse::File(f) => &f.headers,
        }
    }

    /// Render for one request.
    ///
    /// `method` and `request_headers` only matter for file responses
    /// (conditional and range requests).
    pub async fn render(
        &self,
        vars: &PathVariables,
        method: &Method,
        request_headers: &HeaderMap,
    ) -> Response<Full<Bytes>> {
        match self {
            CompiledResponse::Template(t) => t.render(vars),
            CompiledResponse::File(f) => f.render(vars, method, request_headers).await,
        }
    }
}

impl TemplateResponse {
    fn render(&self, vars: &PathVariables) -> Response<Full<Bytes>> {
        let body = match self.template.render(vars) {
            Ok(body) => body,
            Err(e) => {
                warn!("Template rendering failed: {}", e);
                e.to_string()
            }
        };
        ResponseBuilder::new(self.status)
            .merge_headers(&self.headers)
            .body(body)
            .build()
    }
}

impl FileResponse {
    async fn render(
        &self,
        vars: &PathVariables,
        method: &Method,
        request_headers: &HeaderMap,
    ) -> Response<Full<Bytes>> {
        if let Some((name, value)) = vars.iter().find(|(_, v)| !is_safe_path_variable(v)) {
            warn!("Rejected path variable {}={:?} for file response", name, value);
            return plain_text(
                StatusCode::BAD_REQUEST,
                format!("invalid value for path variable '{name}'\n"),
            );
        }

        let path = match self.path_template.render(vars) {
            Ok(path) => PathBuf::from(path),
            Err(e) => {
                warn!("File path rendering failed: {}", e);
                return plain_text(StatusCode::OK, e.to_string());
            }
        };

        file::serve_file(&path, method, request_headers, &self.headers).await
    }
}

/// A variable substituted into a file path must stay a single segment
fn is_safe_path_variable(value: &str) -> bool {
    value != "."
        && value != ".."
        && !value.contains('/')
        && !value.contains('\\')
        && !value.contains('\0')
}
