//! Route dispatch for the management API.

use super::handlers;
use super::ManagementServer;
use crate::response::not_found;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Method, Request, Response};
use std::fmt::Display;
use tracing::debug;

/// Management routes. A route whose feature is disabled is not registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManagementRoute {
    GetStatistics,
    ResetStatistics,
    AddSubstitution,
    DeleteSubstitution,
}

impl ManagementRoute {
    fn parse(method: &Method, path: &str) -> Option<Self> {
        match (method, path) {
            (&Method::GET, "/statistics/get") => Some(ManagementRoute::GetStatistics),
            (&Method::GET, "/statistics/reset") => Some(ManagementRoute::ResetStatistics),
            (&Method::POST, "/substitution") => Some(ManagementRoute::AddSubstitution),
            (&Method::DELETE, "/substitution") => Some(ManagementRoute::DeleteSubstitution),
            _ => None,
        }
    }
}

pub async fn route_request<B>(req: Request<B>, server: &ManagementServer) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|s| s.to_string());

    debug!("Management API: {} {}", method, path);

    let Some(route) = ManagementRoute::parse(&method, &path) else {
        return not_found();
    };

    match route {
        ManagementRoute::GetStatistics | ManagementRoute::ResetStatistics => {
            let Some(store) = server.statistics() else {
                return not_found();
            };
            if route == ManagementRoute::GetStatistics {
                handlers::handle_get_statistics(store, query.as_deref())
            } else {
                handlers::handle_reset_statistics(store, query.as_deref())
            }
        }
        ManagementRoute::AddSubstitution => match server.substitutions() {
            Some((store, compiler)) => {
                handlers::handle_add_substitution(req, store, compiler).await
            }
            None => not_found(),
        },
        ManagementRoute::DeleteSubstitution => match server.substitutions() {
            Some((store, _)) => handlers::handle_delete_substitution(req, store).await,
            None => not_found(),
        },
    }
}
