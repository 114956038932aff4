//! Shell script standing in for the `claude` executable
//!
//! The script records its arguments and stdin next to itself, then runs the
//! body it was created with.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::TempDir;

pub struct FakeCli {
    dir: TempDir,
}

impl FakeCli {
    /// Script running `body` after recording its invocation
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{dir}/argv'\ncat > '{dir}/stdin'\n{body}\n",
            dir = dir.path().display()
        );

        let path = dir.path().join("claude");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self { dir }
    }

    /// Script printing the given `stream-json` lines and exiting 0
    pub fn replying(lines: &[Value]) -> Self {
        let body: Vec<String> = lines.iter().map(|line| format!("printf '%s\\n' '{line}'")).collect();
        Self::new(&body.join("\n"))
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("claude")
    }

    /// Arguments of the last invocation, one per element
    pub fn argv(&self) -> Vec<String> {
        read(&self.dir.path().join("argv")).lines().map(str::to_owned).collect()
    }

    /// Prompt written to stdin by the last invocation
    pub fn stdin(&self) -> String {
        read(&self.dir.path().join("stdin"))
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

/// Partial-message output for a single text reply
pub fn text_reply(text: &str) -> Vec<Value> {
    vec![
        json!({"type": "system", "subtype": "init"}),
        stream_event(json!({"type": "message_start", "message": {"usage": {"input_tokens": 12, "output_tokens": 1}}})),
        stream_event(json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})),
        stream_event(json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}})),
        stream_event(json!({"type": "content_block_stop", "index": 0})),
        stream_event(json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 5}})),
        stream_event(json!({"type": "message_stop"})),
        json!({"type": "assistant", "message": {"content": [{"type": "text", "text": text}], "stop_reason": "end_turn"}}),
        json!({"type": "result", "subtype": "success", "is_error": false, "result": text, "usage": {"input_tokens": 12, "output_tokens": 5}}),
    ]
}

pub fn stream_event(event: Value) -> Value {
    json!({"type": "stream_event", "event": event})
}
