//! End-to-end tests: load a configuration document, start the runtime on
//! ephemeral ports and talk to it over HTTP.

use mockport::{config, RunningRuntime, Runtime};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

const CONFIG: &str = r#"
collect_statistics: true
allow_substitutions: true
management_port: 0
servers:
  - name: server_1
    port: 0
    endpoints:
      - url: /simple_url
        GET:
          template: 'I am a simple url'
      - url: /users/{id}
        GET:
          template: file://templates/user.json
          content_type: application/json
        DELETE:
          template: 'deleted {{id}}'
          status_code: 202
      - url: /files/{name}
        GET:
          file: file://assets/{{name}}
  - name: server_2
    port: 0
    endpoints:
      - url: /simple_url
        POST:
          template: 'posted'
          status_code: 201
"#;

struct Harness {
    _dir: TempDir,
    runtime: RunningRuntime,
    client: Client,
}

impl Harness {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "templates/user.json", r#"{"id": "{{id}}", "role": "{{role}}"}"#);
        write(dir.path(), "assets/report.txt", "quarterly numbers\n");
        write(dir.path(), "config.yaml", CONFIG);

        let runtime_config = config::load(dir.path().join("config.yaml")).unwrap();
        let runtime = Runtime::new(runtime_config)
            .with_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_drain_timeout(Duration::from_secs(2))
            .start()
            .await
            .unwrap();

        Self {
            _dir: dir,
            runtime,
            client: Client::new(),
        }
    }

    fn url(&self, server: &str, path: &str) -> String {
        let addr = self.runtime.local_addr(server).unwrap();
        format!("http://{addr}{path}")
    }

    fn management_url(&self, path: &str) -> String {
        let addr = self.runtime.management_addr().unwrap();
        format!("http://{addr}{path}")
    }

    async fn get(&self, server: &str, path: &str) -> (StatusCode, String) {
        let response = self.client.get(self.url(server, path)).send().await.unwrap();
        let status = response.status();
        (status, response.text().await.unwrap())
    }

    async fn statistics(&self, query: &str) -> Vec<Value> {
        let response = self
            .client
            .get(self.management_url(&format!("/statistics/get{query}")))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mut entries: Vec<Value> = response.json().await.unwrap();
        entries.sort_by_key(|e| e["method"].as_str().unwrap_or_default().to_string());
        entries
    }

    /// Poll until the collector has applied `expected` records in total
    async fn wait_for_records(&self, query: &str, expected: u64) -> Vec<Value> {
        for _ in 0..50 {
            let entries = self.statistics(query).await;
            let total: u64 = entries.iter().filter_map(|e| e["count"].as_u64()).sum();
            if total >= expected {
                return entries;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("statistics for {query:?} never reached {expected}");
    }
}

fn write(dir: &Path, relative: &str, contents: &str) {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[tokio::test]
async fn test_serves_configured_responses() {
    let harness = Harness::start().await;

    assert_eq!(
        harness.get("server_1", "/simple_url").await,
        (StatusCode::OK, "I am a simple url".to_string())
    );

    let response = harness
        .client
        .get(harness.url("server_1", "/users/42"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    assert_eq!(
        response.text().await.unwrap(),
        r#"{"id": "42", "role": "<no value>"}"#
    );

    let response = harness
        .client
        .delete(harness.url("server_1", "/users/7"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.text().await.unwrap(), "deleted 7");

    let response = harness
        .client
        .post(harness.url("server_2", "/simple_url"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    harness.runtime.shutdown().await;
}

#[tokio::test]
async fn test_serves_files_selected_by_path() {
    let harness = Harness::start().await;

    let response = harness
        .client
        .get(harness.url("server_1", "/files/report.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert!(response.headers().contains_key("etag"));
    assert_eq!(response.text().await.unwrap(), "quarterly numbers\n");

    let (status, body) = harness.get("server_1", "/files/missing.txt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("missing.txt"));

    let (status, _) = harness.get("server_1", "/files/..").await;
    assert_ne!(status, StatusCode::OK);

    harness.runtime.shutdown().await;
}

#[tokio::test]
async fn test_unknown_routes_are_404_and_recorded() {
    let harness = Harness::start().await;

    let (status, body) = harness.get("server_1", "/nope?x=1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "404 page not found\n");

    // configured path, unconfigured method
    let response = harness
        .client
        .put(harness.url("server_2", "/simple_url"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let entries = harness
        .wait_for_records("?server=server_1&url=%2Fnope%3Fx%3D1", 1)
        .await;
    assert_eq!(
        entries,
        vec![json!({"server": "server_1", "url": "/nope?x=1", "method": "GET", "count": 1})]
    );

    harness.runtime.shutdown().await;
}

#[tokio::test]
async fn test_statistics_aggregate_and_reset() {
    let harness = Harness::start().await;

    for _ in 0..3 {
        harness.get("server_1", "/simple_url").await;
    }
    harness
        .client
        .delete(harness.url("server_1", "/simple_url"))
        .send()
        .await
        .unwrap();
    harness.get("server_2", "/simple_url").await;

    let entries = harness.wait_for_records("?server=server_1", 4).await;
    assert_eq!(
        entries,
        vec![
            json!({"server": "server_1", "url": "/simple_url", "method": "DELETE", "count": 1}),
            json!({"server": "server_1", "url": "/simple_url", "method": "GET", "count": 3}),
        ]
    );

    let entries = harness.statistics("?server=server_1&method=get").await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["count"], 3);

    let response = harness
        .client
        .get(harness.management_url("/statistics/reset?server=server_1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");

    assert!(harness.statistics("?server=server_1").await.is_empty());
    assert_eq!(harness.statistics("?server=server_2").await.len(), 1);

    harness.runtime.shutdown().await;
}

#[tokio::test]
async fn test_substitution_overrides_and_restores() {
    let harness = Harness::start().await;
    let substitution = json!({
        "server_name": "server_1",
        "url": "/users/{id}",
        "method": "GET",
        "response": {"template": "substituted {{id}}", "status_code": 418}
    });

    let response = harness
        .client
        .post(harness.management_url("/substitution"))
        .json(&substitution)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        harness.get("server_1", "/users/5").await,
        (StatusCode::IM_A_TEAPOT, "substituted 5".to_string())
    );

    // a concrete path beats the pattern
    let exact = json!({
        "server_name": "server_1",
        "url": "/users/5",
        "method": "GET",
        "response": {"template": "exactly five"}
    });
    harness
        .client
        .post(harness.management_url("/substitution"))
        .json(&exact)
        .send()
        .await
        .unwrap();
    assert_eq!(harness.get("server_1", "/users/5").await.1, "exactly five");
    assert_eq!(harness.get("server_1", "/users/6").await.1, "substituted 6");

    for payload in [&exact, &substitution] {
        let key = json!({
            "server_name": payload["server_name"],
            "url": payload["url"],
            "method": payload["method"],
        });
        let response = harness
            .client
            .delete(harness.management_url("/substitution"))
            .json(&key)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let (status, body) = harness.get("server_1", "/users/5").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with(r#"{"id": "5""#));

    harness.runtime.shutdown().await;
}

#[tokio::test]
async fn test_invalid_substitution_is_rejected() {
    let harness = Harness::start().await;

    let response = harness
        .client
        .post(harness.management_url("/substitution"))
        .json(&json!({
            "server_name": "server_1",
            "url": "/simple_url",
            "method": "GET",
            "response": {"file": "file://x.bin", "status_code": 500}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.text().await.unwrap().contains("status_code"));

    assert_eq!(
        harness.get("server_1", "/simple_url").await.1,
        "I am a simple url"
    );
    assert!(harness.runtime.substitutions().is_empty());

    harness.runtime.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_listeners_and_drains_statistics() {
    let harness = Harness::start().await;
    let addr = harness.runtime.local_addr("server_1").unwrap();
    let management = harness.runtime.management_addr().unwrap();
    let store = harness.runtime.statistics().cloned().unwrap();

    for _ in 0..10 {
        harness.get("server_1", "/simple_url").await;
    }

    let summary = harness.runtime.shutdown().await;

    assert_eq!(summary.listeners.len(), 3);
    assert!(summary.listeners.iter().all(|l| l.drained));
    assert_eq!(summary.records_applied, 10);
    assert_eq!(
        store.count(&mockport::statistics::RequestRecord::new(
            "server_1",
            "/simple_url",
            "GET",
            200
        )),
        10
    );

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    assert!(tokio::net::TcpStream::connect(management).await.is_err());
}
