#![cfg(unix)]

mod harness;

use std::time::Duration;

use harness::config::ConfigBuilder;
use harness::fake_cli::{FakeCli, stream_event, text_reply};
use harness::server::TestServer;
use serde_json::{Value, json};

fn streaming_body(model: &str) -> Value {
    json!({
        "model": model,
        "max_tokens": 256,
        "stream": true,
        "messages": [{"role": "user", "content": "Hello"}]
    })
}

/// `(event name, data)` pairs from raw SSE text
fn parse_sse(text: &str) -> Vec<(String, Value)> {
    let mut events = Vec::new();
    let mut name = None;
    for line in text.lines() {
        if let Some(event) = line.strip_prefix("event: ") {
            name = Some(event.to_owned());
        } else if let Some(data) = line.strip_prefix("data: ") {
            events.push((name.take().unwrap_or_default(), serde_json::from_str(data).unwrap()));
        }
    }
    events
}

#[tokio::test]
async fn streaming_returns_sse_content_type() {
    let cli = FakeCli::replying(&text_reply("Hi"));
    let server = TestServer::start(ConfigBuilder::new(&cli.path()).build()).await.unwrap();

    let resp = server.post_messages(&streaming_body("haiku")).await;

    assert_eq!(resp.status(), 200);
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(
        content_type.contains("text/event-stream"),
        "expected text/event-stream, got {content_type}"
    );
}

#[tokio::test]
async fn streaming_events_follow_protocol_order() {
    let cli = FakeCli::replying(&text_reply("Hello world"));
    let server = TestServer::start(ConfigBuilder::new(&cli.path()).build()).await.unwrap();

    let text = server.post_messages(&streaming_body("haiku")).await.text().await.unwrap();
    let events = parse_sse(&text);

    let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        [
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop"
        ]
    );

    for (name, data) in &events {
        assert_eq!(data["type"], name.as_str());
    }

    let start = &events[0].1["message"];
    assert_eq!(start["role"], "assistant");
    assert_eq!(start["model"], "haiku");
    assert_eq!(start["content"], json!([]));
    assert_eq!(start["stop_reason"], Value::Null);

    assert_eq!(events[2].1["delta"], json!({"type": "text_delta", "text": "Hello world"}));
    assert_eq!(events[4].1["delta"]["stop_reason"], "end_turn");
    assert_eq!(events[4].1["usage"], json!({"input_tokens": 12, "output_tokens": 5}));
}

#[tokio::test]
async fn streaming_matches_non_streaming() {
    let cli = FakeCli::replying(&[
        stream_event(json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})),
        stream_event(json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "one "}})),
        stream_event(json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "two"}})),
        stream_event(json!({"type": "content_block_stop", "index": 0})),
        stream_event(json!({"type": "message_start", "message": {}})),
        stream_event(json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})),
        stream_event(json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "three"}})),
        stream_event(json!({"type": "content_block_stop", "index": 0})),
        json!({"type": "result", "subtype": "success", "is_error": false, "usage": {"input_tokens": 4, "output_tokens": 3}}),
    ]);
    let server = TestServer::start(ConfigBuilder::new(&cli.path()).build()).await.unwrap();

    let text = server.post_messages(&streaming_body("haiku")).await.text().await.unwrap();
    let mut blocks: Vec<String> = Vec::new();
    let mut indices = Vec::new();
    for (name, data) in parse_sse(&text) {
        match name.as_str() {
            "content_block_start" => {
                indices.push(data["index"].as_u64().unwrap());
                blocks.push(String::new());
            }
            "content_block_delta" => {
                let index = usize::try_from(data["index"].as_u64().unwrap()).unwrap();
                blocks[index].push_str(data["delta"]["text"].as_str().unwrap());
            }
            _ => {}
        }
    }
    assert_eq!(indices, [0, 1]);

    let mut request = streaming_body("haiku");
    request["stream"] = json!(false);
    let message: Value = server.post_messages(&request).await.json().await.unwrap();
    let aggregated: Vec<&str> = message["content"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["text"].as_str().unwrap())
        .collect();

    assert_eq!(aggregated, blocks);
    assert_eq!(aggregated, ["one two", "three"]);
}

#[tokio::test]
async fn failure_after_output_is_an_error_event() {
    let cli = FakeCli::new(&format!(
        "printf '%s\\n' '{}'\nexec sleep 30",
        stream_event(json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "partial"}}))
    ));
    let config = ConfigBuilder::new(&cli.path())
        .with_timeout(Duration::from_millis(500))
        .build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server.post_messages(&streaming_body("haiku")).await;
    assert_eq!(resp.status(), 200);

    let events = parse_sse(&resp.text().await.unwrap());
    let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names.first(), Some(&"message_start"));
    assert_eq!(names.last(), Some(&"error"));
    assert!(!names.contains(&"message_stop"));

    let (_, error) = events.last().unwrap();
    assert_eq!(error["error"]["type"], "timeout_error");
}

#[tokio::test]
async fn failure_before_output_keeps_http_status() {
    let cli = FakeCli::new("echo 'Error: Not logged in' >&2\nexit 1");
    let server = TestServer::start(ConfigBuilder::new(&cli.path()).build()).await.unwrap();

    let resp = server.post_messages(&streaming_body("haiku")).await;

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "authentication_error");
}
