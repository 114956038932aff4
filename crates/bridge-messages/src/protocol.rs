//! Messages API wire format types

use std::fmt;

use bridge_core::ErrorDetail;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// -- Request types --

/// Body of `POST /anthropic/v1/messages`
///
/// Unknown top-level fields are tolerated so newer SDKs keep working.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesRequest {
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate
    ///
    /// Optional at the wire level so a missing value surfaces as a build
    /// error rather than a body parse error.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Conversation turns
    pub messages: Vec<InputMessage>,
    /// System prompt, either a string or an array of text blocks
    #[serde(default)]
    pub system: Option<SystemPrompt>,
    /// Whether to stream the response
    #[serde(default)]
    pub stream: Option<bool>,
    /// Tool definitions
    #[serde(default)]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Tool choice configuration
    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    /// Opaque request metadata, accepted and ignored
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One conversation turn
#[derive(Debug, Clone, Deserialize)]
pub struct InputMessage {
    pub role: Role,
    pub content: MessageContent,
}

/// Message content can be a string or an array of content blocks
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text shorthand
    Text(String),
    /// Array of content blocks
    Blocks(Vec<ContentBlockParam>),
}

/// System prompt as a string or a list of text blocks
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

impl SystemPrompt {
    /// Flatten into a single string, joining blocks with blank lines
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Blocks(blocks) => blocks
                .into_iter()
                .map(|SystemBlock::Text { text }| text)
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemBlock {
    Text { text: String },
}

/// Content block in a request message
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockParam {
    /// Text content
    Text {
        /// The text string
        text: String,
    },
    /// Inline image
    Image {
        /// Image source
        source: MediaSource,
    },
    /// Inline document (PDF)
    Document {
        /// Document source
        source: MediaSource,
    },
    /// Tool use request from the assistant
    ToolUse {
        /// Tool use identifier
        id: String,
        /// Tool name
        name: String,
        /// Tool input as JSON
        #[serde(default)]
        input: Value,
    },
    /// Tool result from the user
    ToolResult {
        /// Tool use ID this result responds to
        tool_use_id: String,
        /// Result content
        #[serde(default)]
        content: Option<ToolResultContent>,
        /// Whether the tool call errored
        #[serde(default)]
        is_error: Option<bool>,
    },
}

/// Source of an image or document block
#[derive(Debug, Clone, Deserialize)]
pub struct MediaSource {
    /// Source type, only `base64` is accepted
    #[serde(rename = "type")]
    pub source_type: String,
    /// MIME type, e.g. `image/png`
    #[serde(default)]
    pub media_type: Option<String>,
    /// Base64 payload
    #[serde(default)]
    pub data: Option<String>,
    /// Remote location for `url` sources
    #[serde(default)]
    pub url: Option<String>,
}

/// Tool result content, plain text or nested text blocks
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ToolResultBlock>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultBlock {
    Text {
        text: String,
    },
    /// Images and anything newer, rendered as a placeholder
    #[serde(other)]
    Other,
}

impl ToolResultContent {
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .map(|block| match block {
                    ToolResultBlock::Text { text } => text.as_str(),
                    ToolResultBlock::Other => "[non-text content]",
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Tool definition
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema for input parameters
    #[serde(default)]
    pub input_schema: Value,
}

/// Tool choice
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    Any,
    Tool { name: String },
    None,
}

// -- Response types --

/// Complete response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Response identifier, `msg_` followed by 24 hex characters
    pub id: String,
    /// Object type (always "message")
    #[serde(rename = "type")]
    pub message_type: String,
    /// Role (always assistant)
    pub role: Role,
    /// Response content blocks
    pub content: Vec<ResponseBlock>,
    /// Model identifier echoed from the request
    pub model: String,
    /// Stop reason, null until the message is complete
    pub stop_reason: Option<StopReason>,
    /// Always null, the CLI does not report matched stop sequences
    pub stop_sequence: Option<String>,
    /// Token usage
    pub usage: Usage,
}

impl Message {
    /// Empty message as announced by `message_start`
    pub fn started(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message_type: "message".to_owned(),
            role: Role::Assistant,
            content: Vec::new(),
            model: model.into(),
            stop_reason: None,
            stop_sequence: None,
            usage: Usage::default(),
        }
    }
}

/// Content block in a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBlock {
    /// Text response
    Text {
        /// The text string
        text: String,
    },
    /// Tool use request
    ToolUse {
        /// Tool use identifier
        id: String,
        /// Tool name
        name: String,
        /// Tool input as JSON
        input: Value,
    },
}

/// Why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
}

impl StopReason {
    /// Map a stop reason reported by the CLI
    ///
    /// Reasons the wire protocol has no equivalent for become `end_turn`.
    pub fn from_cli(reason: &str) -> Self {
        match reason {
            "max_tokens" => Self::MaxTokens,
            "tool_use" => Self::ToolUse,
            _ => Self::EndTurn,
        }
    }
}

/// Token usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens
    pub input_tokens: u64,
    /// Output tokens
    pub output_tokens: u64,
}

// -- Streaming types --

/// Server-sent event payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Stream started
    MessageStart {
        /// Message shell with empty content
        message: Message,
    },
    /// New content block started
    ContentBlockStart {
        /// Block index
        index: u32,
        /// Initial block content
        content_block: ResponseBlock,
    },
    /// Incremental content within a block
    ContentBlockDelta {
        /// Block index
        index: u32,
        /// Delta content
        delta: ContentDelta,
    },
    /// Content block finished
    ContentBlockStop {
        /// Block index
        index: u32,
    },
    /// Final stop reason and usage
    MessageDelta {
        /// Delta with stop reason
        delta: MessageDelta,
        /// Final usage
        usage: Usage,
    },
    /// Stream completed
    MessageStop,
    /// Keep-alive
    Ping,
    /// In-band failure after the stream began
    Error {
        /// Error details
        error: ErrorDetail,
    },
}

impl StreamEvent {
    /// SSE `event:` name, identical to the payload's `type`
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageStop => "message_stop",
            Self::Ping => "ping",
            Self::Error { .. } => "error",
        }
    }
}

/// Delta content in a `content_block_delta` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    /// Incremental text
    TextDelta {
        /// Text fragment
        text: String,
    },
    /// Incremental tool input JSON
    InputJsonDelta {
        /// JSON fragment
        partial_json: String,
    },
}

/// Delta in a `message_delta` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDelta {
    /// Stop reason
    pub stop_reason: Option<StopReason>,
    /// Stop sequence
    pub stop_sequence: Option<String>,
}
