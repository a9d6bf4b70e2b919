use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use hyper::http::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Response, StatusCode};
use serde::Serialize;
use std::str::FromStr;

/// Body written for unknown routes and unconfigured methods
pub const NOT_FOUND_BODY: &str = "404 page not found\n";

const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

pub struct ResponseBuilder {
    status: StatusCode,
    body: Bytes,
    headers: HeaderMap,
}

impl ResponseBuilder {
    pub fn new(status_code: StatusCode) -> Self {
        ResponseBuilder {
            status: status_code,
            body: Bytes::new(),
            headers: Default::default(),
        }
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
                self
            }
            _ => self,
        }
    }

    pub fn merge_headers<H, K, V>(mut self, headers: H) -> Self
    where
        H: IntoIterator<Item = (K, V)>,
        HeaderName: TryFrom<K>,
        HeaderValue: TryFrom<V>,
    {
        for (key, value) in headers {
            if let (Ok(name), Ok(value)) = (HeaderName::try_from(key), HeaderValue::try_from(value))
            {
                self.headers.insert(name, value);
            }
        }
        self
    }

    pub fn build(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        response.headers_mut().extend(self.headers);
        response
    }
}

/// Plain-text response with an explicit charset
pub fn plain_text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    ResponseBuilder::new(status)
        .header(CONTENT_TYPE.as_str(), TEXT_PLAIN_UTF8)
        .body(body)
        .build()
}

/// Serialize `body` as JSON; a serialization failure becomes a plain-text 500
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(json) => ResponseBuilder::new(status)
            .header(CONTENT_TYPE.as_str(), "application/json")
            .body(json)
            .build(),
        Err(_) => plain_text(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
    }
}

/// The standard 404 for unknown routes
pub fn not_found() -> Response<Full<Bytes>> {
    ResponseBuilder::new(StatusCode::NOT_FOUND)
        .header(CONTENT_TYPE.as_str(), TEXT_PLAIN_UTF8)
        .header(X_CONTENT_TYPE_OPTIONS.as_str(), "nosniff")
        .body(NOT_FOUND_BODY)
        .build()
}
