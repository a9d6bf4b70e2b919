//! Management endpoint handlers.

use super::types::{
    collect_body, parse_statistics_filter, AddSubstitutionRequest, DeleteSubstitutionRequest,
};
use crate::response::{json_response, plain_text, ResponseCompiler};
use crate::statistics::StatisticsStore;
use crate::substitution::SubstitutionStore;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use std::fmt::Display;
use tracing::{info, warn};

fn ok() -> Response<Full<Bytes>> {
    plain_text(StatusCode::OK, "OK")
}

fn bad_request(message: impl Into<Bytes>) -> Response<Full<Bytes>> {
    plain_text(StatusCode::BAD_REQUEST, message)
}

/// GET /statistics/get
pub fn handle_get_statistics(store: &StatisticsStore, query: Option<&str>) -> Response<Full<Bytes>> {
    let filter = parse_statistics_filter(query);
    let entries = store.query(&filter);
    json_response(StatusCode::OK, &entries)
}

/// GET /statistics/reset
pub fn handle_reset_statistics(
    store: &StatisticsStore,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    let filter = parse_statistics_filter(query);
    let removed = store.delete(&filter);
    info!("Statistics reset, {} counter(s) removed", removed);
    ok()
}

/// POST /substitution
pub async fn handle_add_substitution<B>(
    req: Request<B>,
    store: &SubstitutionStore,
    compiler: &ResponseCompiler,
) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Display,
{
    let body = match collect_body(req).await {
        Ok(b) => b,
        Err(e) => return bad_request(e),
    };

    let request: AddSubstitutionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return bad_request(format!("Invalid substitution JSON: {e}\n")),
    };

    let key = match request.validate() {
        Ok(key) => key,
        Err(errors) => return bad_request(format!("{}\n", errors.join("\n"))),
    };

    match compiler.compile(&request.response) {
        Ok(response) => {
            store.add(key, response);
            ok()
        }
        Err(e) => {
            warn!("Rejected substitution for {}: {}", key, e);
            bad_request(format!("{e}\n"))
        }
    }
}

/// DELETE /substitution
pub async fn handle_delete_substitution<B>(
    req: Request<B>,
    store: &SubstitutionStore,
) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Display,
{
    let body = match collect_body(req).await {
        Ok(b) => b,
        Err(e) => return bad_request(e),
    };

    let request: DeleteSubstitutionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return bad_request(format!("Invalid substitution JSON: {e}\n")),
    };

    match request.validate() {
        Ok(key) => {
            store.delete(&key);
            ok()
        }
        Err(errors) => bad_request(format!("{}\n", errors.join("\n"))),
    }
}
