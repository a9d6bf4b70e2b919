//! Request payloads and helpers for the management API.

use crate::config::validate_response;
use crate::endpoint::HttpMethod;
use crate::response::ResponseSpec;
use crate::statistics::StatisticsFilter;
use crate::substitution::SubstitutionKey;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::Request;
use serde::Deserialize;
use std::fmt::Display;

/// Body of `POST /substitution`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddSubstitutionRequest {
    pub server_name: String,
    pub url: String,
    pub method: String,
    pub response: ResponseSpec,
}

/// Body of `DELETE /substitution`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteSubstitutionRequest {
    pub server_name: String,
    pub url: String,
    pub method: String,
}

impl AddSubstitutionRequest {
    /// Check the payload; every violation is reported
    pub fn validate(&self) -> Result<SubstitutionKey, Vec<String>> {
        let mut errors = Vec::new();
        let method = parse_method(&self.method, &mut errors);
        validate_response("response", &self.response, &mut errors);

        match method {
            Some(method) if errors.is_empty() => {
                Ok(SubstitutionKey::new(&self.server_name, &self.url, method))
            }
            _ => Err(errors),
        }
    }
}

impl DeleteSubstitutionRequest {
    pub fn validate(&self) -> Result<SubstitutionKey, Vec<String>> {
        let mut errors = Vec::new();
        match parse_method(&self.method, &mut errors) {
            Some(method) => Ok(SubstitutionKey::new(&self.server_name, &self.url, method)),
            None => Err(errors),
        }
    }
}

fn parse_method(method: &str, errors: &mut Vec<String>) -> Option<HttpMethod> {
    match method.parse() {
        Ok(method) => Some(method),
        Err(e) => {
            errors.push(format!("method: {e}"));
            None
        }
    }
}

/// Parse `server`, `url` and `method` from a query string.
///
/// Missing parameters are wildcards. The first occurrence of a repeated
/// parameter wins.
pub fn parse_statistics_filter(query: Option<&str>) -> StatisticsFilter {
    let mut filter = StatisticsFilter::any();
    let Some(query) = query else {
        return filter;
    };

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = decode_query_component(value);
        match decode_query_component(key).as_str() {
            "server" if filter.server_name.is_none() => filter = filter.server(value),
            "url" if filter.url.is_none() => filter = filter.url(value),
            "method" if filter.method.is_none() => filter = filter.method(value),
            _ => {}
        }
    }
    filter
}

fn decode_query_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

/// Read the whole request body
pub async fn collect_body<B>(req: Request<B>) -> Result<Bytes, String>
where
    B: Body,
    B::Error: Display,
{
    req.into_body()
        .collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}
