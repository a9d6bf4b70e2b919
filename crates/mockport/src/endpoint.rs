//! Endpoints and per-request dispatch.

use crate::response::{not_found, CompiledResponse};
use crate::statistics::{RequestRecord, StatisticsSender};
use crate::substitution::{SubstitutionKey, SubstitutionStore};
use crate::template::PathVariables;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{HeaderMap, Method, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Methods an endpoint can declare a response for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported method '{0}', expected one of GET, POST, PUT, PATCH, DELETE")]
pub struct UnsupportedMethod(pub String);

impl FromStr for HttpMethod {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnsupportedMethod(s.to_string()))
    }
}

impl TryFrom<&Method> for HttpMethod {
    type Error = UnsupportedMethod;

    fn try_from(method: &Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

/// One URL pattern with at most one response per method
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub url_pattern: String,
    pub responses: HashMap<HttpMethod, Arc<CompiledResponse>>,
}

impl EndpointSpec {
    pub fn new(url_pattern: impl Into<String>) -> Self {
        Self {
            url_pattern: url_pattern.into(),
            responses: HashMap::new(),
        }
    }

    pub fn with_response(mut self, method: HttpMethod, response: CompiledResponse) -> Self {
        self.responses.insert(method, Arc::new(response));
        self
    }
}

/// The request as seen by the dispatcher, after routing
#[derive(Debug)]
pub struct RoutedRequest<'a> {
    pub method: &'a Method,
    /// Path only, used for substitution lookup
    pub path: &'a str,
    /// Path and query, used for the request record
    pub target: &'a str,
    pub headers: &'a HeaderMap,
    pub vars: PathVariables,
}

/// Picks and renders the response for a request on one mock server,
/// then records the outcome.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    server_name: Arc<str>,
    substitutions: Arc<SubstitutionStore>,
    statistics: Option<StatisticsSender>,
}

impl Dispatcher {
    pub fn new(
        server_name: impl Into<Arc<str>>,
        substitutions: Arc<SubstitutionStore>,
        statistics: Option<StatisticsSender>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            substitutions,
            statistics,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Dispatch a request that matched `endpoint` (or nothing, when `None`)
    pub async fn dispatch(
        &self,
        endpoint: Option<&EndpointSpec>,
        request: RoutedRequest<'_>,
    ) -> Response<Full<Bytes>> {
        let response = match self.select(endpoint, request.method, request.path) {
            Some(selected) => {
                selected
                    .render(&request.vars, request.method, request.headers)
                    .await
            }
            None => not_found(),
        };

        self.record(RequestRecord::new(
            self.server_name.as_ref(),
            request.target,
            request.method.as_str(),
            response.status().as_u16(),
        ))
        .await;

        response
    }

    /// Substitution by request path, then by URL pattern, then the static response
    fn select(
        &self,
        endpoint: Option<&EndpointSpec>,
        method: &Method,
        path: &str,
    ) -> Option<Arc<CompiledResponse>> {
        let method = HttpMethod::try_from(method).ok()?;
        let endpoint = endpoint?;

        let by_path = SubstitutionKey::new(self.server_name.as_ref(), path, method);
        if let Some(response) = self.substitutions.get(&by_path) {
            return Some(response);
        }
        if endpoint.url_pattern != path {
            let by_pattern =
                SubstitutionKey::new(self.server_name.as_ref(), &endpoint.url_pattern, method);
            if let Some(response) = self.substitutions.get(&by_pattern) {
                return Some(response);
            }
        }

        endpoint.responses.get(&method).cloned()
    }

    async fn record(&self, record: RequestRecord) {
        info!("{}", record);
        if let Some(statistics) = &self.statistics {
            statistics.send(record).await;
        }
    }
}
