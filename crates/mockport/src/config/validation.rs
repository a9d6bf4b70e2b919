//! Structural checks on a parsed configuration document.
//!
//! Serde already rejects unknown fields, missing required fields and wrong
//! types. The checks here cover the rest of the document rules and collect
//! every violation instead of stopping at the first.

use super::document::ConfigDocument;
use crate::response::{ResponseBody, ResponseSpec};
use regex::Regex;
use std::sync::OnceLock;

/// Status codes a template response may declare
pub const ALLOWED_STATUS_CODES: &[u16] = &[
    100, 101, 102, //
    200, 201, 202, 203, 204, 205, 206, 207, 208, 226, //
    300, 301, 302, 303, 304, 305, 306, 307, 308, //
    400, 401, 402, 403, 404, 405, 406, 407, 408, 409, 410, 411, 412, 413, 414, 415, 416, 417, 418,
    421, 422, 423, 424, 426, 428, 429, 431, 451, //
    500, 501, 502, 503, 504, 505, 506, 507, 508, 510, 511,
];

static HEADER_NAME_REGEX: OnceLock<Regex> = OnceLock::new();
static FILE_FIELD_REGEX: OnceLock<Regex> = OnceLock::new();

fn header_name_regex() -> &'static Regex {
    HEADER_NAME_REGEX
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9-]*$").expect("header name pattern is valid"))
}

fn file_field_regex() -> &'static Regex {
    FILE_FIELD_REGEX.get_or_init(|| {
        Regex::new(r"^file://[a-zA-Z0-9_ -/.{}]*$").expect("file field pattern is valid")
    })
}

impl ConfigDocument {
    /// Every rule violation in the document, each prefixed with its location
    pub fn violations(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (i, server) in self.servers.iter().enumerate() {
            let server_location = format!("servers[{i}] ({})", server.name);
            for (j, endpoint) in server.endpoints.iter().enumerate() {
                let endpoint_location =
                    format!("{server_location}.endpoints[{j}] ({})", endpoint.url);
                if !endpoint.url.starts_with('/') {
                    errors.push(format!("{endpoint_location}.url: must start with '/'"));
                }
                for (method, response) in endpoint.responses() {
                    let location = format!("{endpoint_location}.{method}");
                    validate_response(&location, response, &mut errors);
                }
            }
        }

        errors
    }
}

/// Check one declared response, appending violations to `errors`
pub fn validate_response(location: &str, response: &ResponseSpec, errors: &mut Vec<String>) {
    match response.body() {
        None => errors.push(format!(
            "{location}: exactly one of 'template' or 'file' is required"
        )),
        Some(ResponseBody::Template(template)) => {
            if template.is_empty() {
                errors.push(format!("{location}.template: must not be empty"));
            }
            if let Some(code) = response.status_code {
                if !ALLOWED_STATUS_CODES.contains(&code) {
                    errors.push(format!("{location}.status_code: {code} is not an allowed value"));
                }
            }
        }
        Some(ResponseBody::File(file)) => {
            if !file_field_regex().is_match(file) {
                errors.push(format!(
                    "{location}.file: '{file}' does not match {}",
                    file_field_regex().as_str()
                ));
            }
            if let Some(code) = response.status_code.filter(|code| *code != 200) {
                errors.push(format!(
                    "{location}.status_code: file responses only allow 200, got {code}"
                ));
            }
        }
    }

    for name in response.headers.keys() {
        if !header_name_regex().is_match(name) {
            errors.push(format!("{location}.headers: invalid header name '{name}'"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violations_of(yaml: &str) -> Vec<String> {
        ConfigDocument::parse(yaml).unwrap().violations()
    }

    #[test]
    fn test_valid_document_has_no_violations() {
        let yaml = r#"
servers:
  - name: server_1
    port: 4573
    endpoints:
      - url: /simple_url
        GET:
          template: 'I am a simple url'
          status_code: 418
          headers:
            X-Request-Id: 12
      - url: /files/{name}
        GET:
          file: file://assets/{{name}}
          status_code: 200
"#;
        assert!(violations_of(yaml).is_empty());
    }

    #[test]
    fn test_all_violations_are_collected() {
        let yaml = r#"
servers:
  - name: server_1
    port: 4573
    endpoints:
      - url: /a
        GET:
          template: ''
        POST:
          template: x
          status_code: 299
      - url: b
        PUT:
          file: file://data.json
          status_code: 201
        DELETE:
          template: x
          file: file://y
"#;
        let errors = violations_of(yaml);
        assert_eq!(errors.len(), 5, "{errors:#?}");
        assert!(errors[0].contains("endpoints[0] (/a).GET.template"));
        assert!(errors[1].contains("299"));
        assert!(errors[2].contains("endpoints[1] (b).url"));
        assert!(errors.iter().any(|e| e.contains("PUT.status_code")));
        assert!(errors.iter().any(|e| e.contains("DELETE: exactly one")));
    }

    #[test]
    fn test_header_names_and_file_pattern() {
        let mut errors = Vec::new();
        let spec = ResponseSpec::file("http://example.com").with_header("X_Bad", "1");
        validate_response("r", &spec, &mut errors);

        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("r.file:"));
        assert!(errors[1].contains("X_Bad"));
    }

    #[test]
    fn test_status_code_list() {
        for code in [100, 226, 308, 418, 451, 511] {
            assert!(ALLOWED_STATUS_CODES.contains(&code));
        }
        for code in [103, 209, 309, 419, 420, 425, 509, 600] {
            assert!(!ALLOWED_STATUS_CODES.contains(&code));
        }
    }
}
