//! End-to-end runs of the bot loop against a mocked Bot API.
//!
//! The downloader is replaced by an in-process fetcher; splitting and the
//! HTTP transport are the real implementations.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use relay_dl::{Artifact, Bot, Config, FetchError, Fetcher, RawSplitter, TelegramTransport};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const TOKEN: &str = "123:abc";
const OWNER: i64 = 4242;

/// Writes a file of fixed size into the workspace
struct SizedFetcher {
    size: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Fetcher for SizedFetcher {
    async fn fetch(
        &self,
        _locator: &Url,
        workspace: &Path,
        _credential: Option<&Path>,
    ) -> Result<Artifact, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = workspace.join("clip.mkv");
        tokio::fs::write(&path, vec![7u8; self.size]).await.unwrap();
        Ok(Artifact::from_path(&path).await.unwrap())
    }

    fn name(&self) -> &'static str {
        "sized"
    }
}

fn ok(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true, "result": result }))
}

fn text_update(id: i64, from: i64, text: &str) -> serde_json::Value {
    serde_json::json!({
        "update_id": id,
        "message": {
            "message_id": id,
            "from": { "id": from, "is_bot": false, "first_name": "T" },
            "chat": { "id": from, "type": "private" },
            "date": 0,
            "text": text
        }
    })
}

async fn mock_api(server: &MockServer, updates: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .respond_with(ok(updates))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .respond_with(ok(serde_json::json!([])).set_delay(Duration::from_millis(50)))
        .mount(server)
        .await;
    for api_method in ["sendMessage", "sendDocument"] {
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/{api_method}")))
            .respond_with(ok(serde_json::json!({ "message_id": 1 })))
            .mount(server)
            .await;
    }
}

fn config(server: &MockServer, root: &TempDir) -> Config {
    let mut config = Config::default();
    config.transport.api_base = server.uri();
    config.transport.token = TOKEN.to_string();
    config.transport.max_payload_bytes = 2000;
    config.partition.part_size_bytes = 1900;
    config.access.allowed_users = vec![OWNER];
    config.workspace.root = root.path().to_path_buf();
    config
}

async fn requests_to(server: &MockServer, api_method: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path().ends_with(api_method))
        .collect()
}

async fn sent_texts(server: &MockServer) -> Vec<String> {
    requests_to(server, "/sendMessage")
        .await
        .iter()
        .map(|r| {
            let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
            body["text"].as_str().unwrap_or_default().to_string()
        })
        .collect()
}

async fn run_until(bot: Bot, server: &MockServer, done: impl Fn(&[String]) -> bool) {
    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();
    let running = tokio::spawn(async move { bot.run(stop).await });

    tokio::time::timeout(Duration::from_secs(10), async {
        while !done(sent_texts(server).await.as_slice()) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("bot did not reach the expected reply in time");

    shutdown.cancel();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn oversized_relay_is_split_and_sent_in_order() {
    let server = MockServer::start().await;
    mock_api(
        &server,
        serde_json::json!([text_update(1, OWNER, "/relay https://example.com/watch?v=1")]),
    )
    .await;

    let root = TempDir::new().unwrap();
    let config = Arc::new(config(&server, &root));
    let fetcher = Arc::new(SizedFetcher {
        size: 5000,
        calls: AtomicUsize::new(0),
    });
    let transport = Arc::new(TelegramTransport::new(&config.transport).unwrap());
    let bot = Bot::new(config, fetcher.clone(), Arc::new(RawSplitter), transport);

    run_until(bot, &server, |texts| {
        texts.iter().any(|t| t.starts_with("🎉 All 3 parts"))
    })
    .await;

    let documents = requests_to(&server, "/sendDocument").await;
    assert_eq!(documents.len(), 3);
    for (i, request) in documents.iter().enumerate() {
        let body = String::from_utf8_lossy(&request.body);
        assert!(
            body.contains(&format!("Part {}/3 of clip.mkv", i + 1)),
            "request {i} out of order"
        );
    }

    let texts = sent_texts(&server).await;
    assert_eq!(texts.last().unwrap(), "🎉 All 3 parts uploaded successfully.");
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

    let workspace = root.path().join(format!("user_{OWNER}"));
    assert_eq!(std::fs::read_dir(workspace).unwrap().count(), 0);
}

#[tokio::test]
async fn strangers_are_refused_without_fetching() {
    let server = MockServer::start().await;
    mock_api(
        &server,
        serde_json::json!([text_update(1, 999, "/relay https://example.com/watch?v=1")]),
    )
    .await;

    let root = TempDir::new().unwrap();
    let config = Arc::new(config(&server, &root));
    let fetcher = Arc::new(SizedFetcher {
        size: 10,
        calls: AtomicUsize::new(0),
    });
    let transport = Arc::new(TelegramTransport::new(&config.transport).unwrap());
    let bot = Bot::new(config, fetcher.clone(), Arc::new(RawSplitter), transport);

    run_until(bot, &server, |texts| texts.iter().any(|t| t == "Not authorized.")).await;

    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    assert!(requests_to(&server, "/sendDocument").await.is_empty());
}
