//! The configuration document as written by users.

use crate::endpoint::HttpMethod;
use crate::response::ResponseSpec;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MANAGEMENT_PORT: u16 = 4444;

fn default_management_port() -> u16 {
    DEFAULT_MANAGEMENT_PORT
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    /// Count requests per (server, url, method, status)
    #[serde(default)]
    pub collect_statistics: bool,

    /// Accept runtime response overrides on the management port
    #[serde(default)]
    pub allow_substitutions: bool,

    #[serde(default = "default_management_port")]
    pub management_port: u16,

    pub servers: Vec<ServerDocument>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerDocument {
    pub name: String,
    pub port: u16,
    pub endpoints: Vec<EndpointDocument>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointDocument {
    pub url: String,
    #[serde(rename = "GET", default, skip_serializing_if = "Option::is_none")]
    pub get: Option<ResponseSpec>,
    #[serde(rename = "POST", default, skip_serializing_if = "Option::is_none")]
    pub post: Option<ResponseSpec>,
    #[serde(rename = "PUT", default, skip_serializing_if = "Option::is_none")]
    pub put: Option<ResponseSpec>,
    #[serde(rename = "PATCH", default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<ResponseSpec>,
    #[serde(rename = "DELETE", default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<ResponseSpec>,
}

impl ConfigDocument {
    /// Parse YAML (or JSON, which YAML accepts)
    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

impl EndpointDocument {
    /// Declared responses in method order
    pub fn responses(&self) -> impl Iterator<Item = (HttpMethod, &ResponseSpec)> {
        [
            (HttpMethod::Get, &self.get),
            (HttpMethod::Post, &self.post),
            (HttpMethod::Put, &self.put),
            (HttpMethod::Patch, &self.patch),
            (HttpMethod::Delete, &self.delete),
        ]
        .into_iter()
        .filter_map(|(method, response)| response.as_ref().map(|r| (method, r)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseBody;

    #[test]
    fn test_parse_document() {
        let yaml = r#"
collect_statistics: true
servers:
  - name: server_1
    port: 4573
    endpoints:
      - url: /simple_url
        GET:
          template: 'I am a simple url'
          headers:
            Content-Type: text/plain
        DELETE:
          template: 'deleted'
          status_code: 204
"#;
        let doc = ConfigDocument::parse(yaml).unwrap();

        assert!(doc.collect_statistics);
        assert!(!doc.allow_substitutions);
        assert_eq!(doc.management_port, DEFAULT_MANAGEMENT_PORT);
        assert_eq!(doc.servers.len(), 1);

        let endpoint = &doc.servers[0].endpoints[0];
        let methods: Vec<HttpMethod> = endpoint.responses().map(|(m, _)| m).collect();
        assert_eq!(methods, vec![HttpMethod::Get, HttpMethod::Delete]);
        assert_eq!(
            endpoint.get.as_ref().unwrap().body(),
            Some(ResponseBody::Template("I am a simple url"))
        );
    }

    #[test]
    fn test_parse_json_document() {
        let json = r#"{"management_port": 5000, "allow_substitutions": true,
            "servers": [{"name": "s", "port": 1, "endpoints": []}]}"#;
        let doc = ConfigDocument::parse(json).unwrap();

        assert_eq!(doc.management_port, 5000);
        assert!(doc.allow_substitutions);
        assert!(doc.servers[0].endpoints.is_empty());
    }

    #[test]
    fn test_structural_errors() {
        // missing servers
        assert!(ConfigDocument::parse("collect_statistics: true").is_err());
        // unknown top-level field
        assert!(ConfigDocument::parse("servers: []\nextra: 1").is_err());
        // unsupported method key
        let yaml = r#"
servers:
  - name: s
    port: 1
    endpoints:
      - url: /
        OPTIONS:
          template: x
"#;
        assert!(ConfigDocument::parse(yaml).is_err());
        // port out of range
        let yaml = "servers:\n  - name: s\n    port: 70000\n    endpoints: []\n";
        assert!(ConfigDocument::parse(yaml).is_err());
    }
}
