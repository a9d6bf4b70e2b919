//! Management HTTP API.
//!
//! Served on its own port when statistics or substitutions are enabled:
//! - `GET /statistics/get` and `GET /statistics/reset`, filtered by the
//!   optional `server`, `url` and `method` query parameters
//! - `POST /substitution` and `DELETE /substitution` with a JSON body
//!
//! Only the routes of enabled features answer; everything else is a 404.

mod handlers;
mod router;
mod types;

pub use types::{AddSubstitutionRequest, DeleteSubstitutionRequest};

use crate::response::ResponseCompiler;
use crate::runtime::RequestHandler;
use crate::statistics::StatisticsStore;
use crate::substitution::SubstitutionStore;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::{Body, Incoming};
use hyper::{Request, Response};
use std::fmt::Display;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ManagementServer {
    statistics: Option<Arc<StatisticsStore>>,
    substitutions: Option<(Arc<SubstitutionStore>, ResponseCompiler)>,
}

impl ManagementServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the statistics routes
    pub fn with_statistics(mut self, store: Arc<StatisticsStore>) -> Self {
        self.statistics = Some(store);
        self
    }

    /// Register the substitution routes; payload responses are compiled with `compiler`
    pub fn with_substitutions(
        mut self,
        store: Arc<SubstitutionStore>,
        compiler: ResponseCompiler,
    ) -> Self {
        self.substitutions = Some((store, compiler));
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.statistics.is_some() || self.substitutions.is_some()
    }

    pub(crate) fn statistics(&self) -> Option<&StatisticsStore> {
        self.statistics.as_deref()
    }

    pub(crate) fn substitutions(&self) -> Option<(&SubstitutionStore, &ResponseCompiler)> {
        self.substitutions
            .as_ref()
            .map(|(store, compiler)| (store.as_ref(), compiler))
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Display,
    {
        router::route_request(req, self).await
    }
}

#[async_trait]
impl RequestHandler for ManagementServer {
    fn name(&self) -> &str {
        "management"
    }

    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        ManagementServer::handle(self, req).await
    }
}
