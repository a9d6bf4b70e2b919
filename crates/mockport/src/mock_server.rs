//! A configured virtual HTTP service.

use crate::endpoint::{Dispatcher, EndpointSpec, RoutedRequest};
use crate::runtime::RequestHandler;
use crate::template::PathVariables;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response};
use matchit::Router;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid url pattern '{pattern}' on server '{server}': {source}")]
    InvalidPattern {
        server: String,
        pattern: String,
        #[source]
        source: matchit::InsertError,
    },
}

/// One mock server as loaded from configuration
#[derive(Debug, Clone)]
pub struct ServerSpec {
    pub name: String,
    pub port: u16,
    pub endpoints: Vec<EndpointSpec>,
}

/// Routes requests to endpoints and hands them to the [`Dispatcher`]
pub struct MockServer {
    endpoints: Vec<EndpointSpec>,
    router: Router<usize>,
    dispatcher: Dispatcher,
}

impl MockServer {
    pub fn new(spec: ServerSpec, dispatcher: Dispatcher) -> Result<Self, RouteError> {
        let router = build_router(&spec)?;
        Ok(Self {
            endpoints: spec.endpoints,
            router,
            dispatcher,
        })
    }

    pub fn name(&self) -> &str {
        self.dispatcher.server_name()
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        let (parts, _) = req.into_parts();
        let path = parts.uri.path();
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(path);

        let (endpoint, vars) = match self.router.at(path) {
            Ok(matched) => {
                let vars: PathVariables = matched
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_string(), decode_segment(v)))
                    .collect();
                (self.endpoints.get(*matched.value), vars)
            }
            Err(_) => (None, PathVariables::new()),
        };

        self.dispatcher
            .dispatch(
                endpoint,
                RoutedRequest {
                    method: &parts.method,
                    path,
                    target,
                    headers: &parts.headers,
                    vars,
                },
            )
            .await
    }
}

impl fmt::Debug for MockServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockServer")
            .field("name", &self.name())
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}

#[async_trait]
impl RequestHandler for MockServer {
    fn name(&self) -> &str {
        MockServer::name(self)
    }

    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        MockServer::handle(self, req).await
    }
}

/// Check that every pattern of `spec` can be routed
pub fn validate_routes(spec: &ServerSpec) -> Result<(), RouteError> {
    build_router(spec).map(|_| ())
}

fn build_router(spec: &ServerSpec) -> Result<Router<usize>, RouteError> {
    let mut router = Router::new();
    for (index, endpoint) in spec.endpoints.iter().enumerate() {
        router
            .insert(endpoint.url_pattern.as_str(), index)
            .map_err(|source| RouteError::InvalidPattern {
                server: spec.name.clone(),
                pattern: endpoint.url_pattern.clone(),
                source,
            })?;
    }
    Ok(router)
}

fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
