use serde_json::Value;

use crate::{
    MessagesError,
    protocol::{
        ContentBlockParam, MediaSource, MessageContent, MessagesRequest, Role, SystemPrompt, ToolChoice, ToolDefinition,
    },
};

/// A request with content shorthands expanded and shape invariants checked
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub model: String,
    pub max_tokens: Option<u32>,
    pub system: Option<String>,
    pub turns: Vec<Turn>,
    pub stream: bool,
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_choice: Option<ToolChoice>,
    /// Sampling parameters the CLI has no way to honor
    pub ignored_parameters: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone)]
pub enum Block {
    Text(String),
    Image(MediaSource),
    Document(MediaSource),
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

impl Block {
    pub const fn is_media(&self) -> bool {
        matches!(self, Self::Image(_) | Self::Document(_))
    }
}

impl NormalizedRequest {
    /// Index of the last user turn
    pub fn last_user_turn(&self) -> Option<usize> {
        self.turns.iter().rposition(|turn| turn.role == Role::User)
    }

    /// Positions of every image and document block, in conversation order
    pub fn media_positions(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.turns.iter().enumerate().flat_map(|(t, turn)| {
            turn.blocks
                .iter()
                .enumerate()
                .filter(|(_, block)| block.is_media())
                .map(move |(b, _)| (t, b))
        })
    }
}

/// Expand and validate a wire request
///
/// # Errors
///
/// Returns [`MessagesError::Validation`] when there are no messages or a
/// message has an empty block list
pub fn normalize(request: MessagesRequest) -> Result<NormalizedRequest, MessagesError> {
    if request.messages.is_empty() {
        return Err(MessagesError::Validation("messages: at least one message is required".to_owned()));
    }

    let mut ignored_parameters = Vec::new();
    if request.temperature.is_some() {
        ignored_parameters.push("temperature");
    }
    if request.top_p.is_some() {
        ignored_parameters.push("top_p");
    }
    if request.top_k.is_some() {
        ignored_parameters.push("top_k");
    }
    if request.stop_sequences.as_ref().is_some_and(|s| !s.is_empty()) {
        ignored_parameters.push("stop_sequences");
    }

    let turns = request
        .messages
        .into_iter()
        .enumerate()
        .map(|(i, message)| {
            let blocks = match message.content {
                MessageContent::Text(text) => vec![Block::Text(text)],
                MessageContent::Blocks(blocks) => blocks.into_iter().map(Block::from).collect(),
            };
            if blocks.is_empty() {
                return Err(MessagesError::Validation(format!("messages.{i}.content: must not be empty")));
            }
            Ok(Turn {
                role: message.role,
                blocks,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NormalizedRequest {
        model: request.model,
        max_tokens: request.max_tokens,
        system: request
            .system
            .map(SystemPrompt::into_text)
            .filter(|s| !s.trim().is_empty()),
        turns,
        stream: request.stream.unwrap_or(false),
        tools: request.tools,
        tool_choice: request.tool_choice,
        ignored_parameters,
    })
}

impl From<ContentBlockParam> for Block {
    fn from(block: ContentBlockParam) -> Self {
        match block {
            ContentBlockParam::Text { text } => Self::Text(text),
            ContentBlockParam::Image { source } => Self::Image(source),
            ContentBlockParam::Document { source } => Self::Document(source),
            ContentBlockParam::ToolUse { id, name, input } => Self::ToolUse { id, name, input },
            ContentBlockParam::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Self::ToolResult {
                tool_use_id,
                content: content.map(|c| c.to_text()).unwrap_or_default(),
                is_error: is_error.unwrap_or(false),
            },
        }
    }
}
