//! Declared (not yet compiled) response shapes, as they appear in the
//! configuration document and in substitution payloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A response as declared in YAML/JSON.
///
/// Exactly one of `template` and `file` must be set; [`ResponseSpec::body`]
/// resolves which one.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseSpec {
    /// Inline template text, or a `file://` reference to a template file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// `file://` reference to a file served as-is; the path may use template syntax
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, HeaderValueSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Shorthand for a `Content-Type` header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Which body source a [`ResponseSpec`] declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseBody<'a> {
    Template(&'a str),
    File(&'a str),
}

impl ResponseSpec {
    /// Inline template response with default status and headers
    pub fn template(source: impl Into<String>) -> Self {
        Self {
            template: Some(source.into()),
            ..Default::default()
        }
    }

    /// File response with default headers
    pub fn file(reference: impl Into<String>) -> Self {
        Self {
            file: Some(reference.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into(), HeaderValueSpec::Text(value.into()));
        self
    }

    /// The declared body source, or `None` unless exactly one is set
    pub fn body(&self) -> Option<ResponseBody<'_>> {
        match (&self.template, &self.file) {
            (Some(template), None) => Some(ResponseBody::Template(template)),
            (None, Some(file)) => Some(ResponseBody::File(file)),
            _ => None,
        }
    }
}

/// Header values may be written as strings or numbers
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum HeaderValueSpec {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for HeaderValueSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValueSpec::Text(text) => f.write_str(text),
            HeaderValueSpec::Number(number) => write!(f, "{number}"),
        }
    }
}
