//! Translation of CLI `stream-json` output into Messages API stream events
//!
//! The [`Translator`] is fed one stdout line at a time and returns the wire
//! events that line produces. Output block indices are assigned here and
//! never follow the CLI's own numbering, which restarts for every internal
//! turn of an agentic run.

use std::mem;

use bridge_cli::{
    classify_failure,
    fragment::{
        AssistantTurn, BlockDelta, BlockStart, CliFragment, CliUsage, ResultSummary, StreamEvent as CliEvent, TurnBlock,
        parse_line,
    },
};
use serde_json::{Value, json};

use crate::{
    MessagesError,
    protocol::{ContentDelta, Message, MessageDelta, ResponseBlock, StopReason, StreamEvent, Usage},
};

/// Longest excerpt of a malformed line included in logs
const LOG_EXCERPT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    ToolUse,
}

#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    index: u32,
    /// CLI block index for partial-message blocks
    cli_index: Option<usize>,
    kind: BlockKind,
}

/// Per-request translation state
#[derive(Debug)]
pub struct Translator {
    message_id: String,
    model: String,
    prompt_chars: usize,
    started: bool,
    next_index: u32,
    open: Option<OpenBlock>,
    /// CLI index of a block being skipped (thinking and friends)
    skipped: Option<usize>,
    seen_partials: bool,
    stop_reason: Option<StopReason>,
    reported_usage: Option<CliUsage>,
    final_usage: Option<CliUsage>,
    result_text: Option<String>,
    output_chars: usize,
    lines: usize,
    malformed: usize,
    pending: Vec<StreamEvent>,
}

impl Translator {
    /// `prompt_chars` is the length of the stdin payload, used for the input
    /// token estimate when the CLI reports no usage
    pub fn new(message_id: impl Into<String>, model: impl Into<String>, prompt_chars: usize) -> Self {
        Self {
            message_id: message_id.into(),
            model: model.into(),
            prompt_chars,
            started: false,
            next_index: 0,
            open: None,
            skipped: None,
            seen_partials: false,
            stop_reason: None,
            reported_usage: None,
            final_usage: None,
            result_text: None,
            output_chars: 0,
            lines: 0,
            malformed: 0,
            pending: Vec::new(),
        }
    }

    /// Consume one stdout line
    ///
    /// # Errors
    ///
    /// Fails when the line reports an error: a `result` flagged `is_error` or
    /// an `error` stream event
    pub fn push_line(&mut self, line: &str) -> Result<Vec<StreamEvent>, MessagesError> {
        let fragment = match parse_line(line) {
            Ok(Some(fragment)) => fragment,
            Ok(None) => return Ok(Vec::new()),
            Err(e) => {
                self.lines += 1;
                self.malformed += 1;
                tracing::warn!(error = %e, line = excerpt(line), "skipping malformed CLI output line");
                return Ok(Vec::new());
            }
        };
        self.lines += 1;

        match fragment {
            CliFragment::StreamEvent { event } => self.on_stream_event(event)?,
            CliFragment::Assistant { message } => self.on_assistant(message),
            CliFragment::Result(summary) => self.on_result(summary)?,
            CliFragment::Other => {}
        }

        Ok(mem::take(&mut self.pending))
    }

    /// Close the message after the process exited successfully
    ///
    /// Emits `message_start` if nothing did yet, closes the open block, makes
    /// sure at least one block exists, then emits `message_delta` and
    /// `message_stop`.
    ///
    /// # Errors
    ///
    /// Returns [`MessagesError::EmptyResponse`] when lines were received but
    /// none of them parsed
    pub fn finish(&mut self) -> Result<Vec<StreamEvent>, MessagesError> {
        if self.lines > 0 && self.malformed == self.lines {
            return Err(MessagesError::EmptyResponse);
        }

        if self.next_index == 0
            && let Some(text) = self.result_text.take().filter(|t| !t.is_empty())
        {
            self.open_text(None);
            self.push_text(text);
        }

        self.ensure_started();
        self.close_open();

        if self.next_index == 0 {
            self.open_text(None);
            self.close_open();
        }

        let usage = self.usage();
        self.pending.push(StreamEvent::MessageDelta {
            delta: MessageDelta {
                stop_reason: Some(self.stop_reason.unwrap_or(StopReason::EndTurn)),
                stop_sequence: None,
            },
            usage,
        });
        self.pending.push(StreamEvent::MessageStop);

        Ok(mem::take(&mut self.pending))
    }

    /// Lines that failed to parse so far
    pub const fn malformed_lines(&self) -> usize {
        self.malformed
    }

    fn on_stream_event(&mut self, event: CliEvent) -> Result<(), MessagesError> {
        match event {
            CliEvent::MessageStart { message } => {
                self.close_open();
                self.skipped = None;
                if let Some(usage) = message.usage {
                    self.note_usage(usage);
                }
            }
            CliEvent::ContentBlockStart { index, content_block } => {
                self.seen_partials = true;
                match content_block {
                    BlockStart::Text { text } => {
                        self.open_text(Some(index));
                        self.push_text(text);
                    }
                    BlockStart::ToolUse { id, name, input } => {
                        self.open_tool_use(id, name, Some(index));
                        if input.as_object().is_some_and(|o| !o.is_empty()) {
                            self.push_json(input.to_string());
                        }
                    }
                    BlockStart::Other => self.skipped = Some(index),
                }
            }
            CliEvent::ContentBlockDelta { index, delta } => {
                self.seen_partials = true;
                if self.skipped == Some(index) {
                    return Ok(());
                }
                match delta {
                    BlockDelta::TextDelta { text } => {
                        if !self.is_open(index, BlockKind::Text) {
                            self.open_text(Some(index));
                        }
                        self.push_text(text);
                    }
                    BlockDelta::InputJsonDelta { partial_json } => {
                        if self.is_open(index, BlockKind::ToolUse) {
                            self.push_json(partial_json);
                        } else {
                            tracing::debug!(index, "dropping tool input delta without an open tool_use block");
                        }
                    }
                    BlockDelta::Other => {}
                }
            }
            CliEvent::ContentBlockStop { index } => {
                if self.skipped == Some(index) {
                    self.skipped = None;
                } else if self.open.is_some_and(|b| b.cli_index == Some(index)) {
                    self.close_open();
                }
            }
            CliEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason {
                    self.stop_reason = Some(StopReason::from_cli(&reason));
                }
                if let Some(usage) = usage {
                    self.note_usage(usage);
                }
            }
            CliEvent::MessageStop => self.close_open(),
            CliEvent::Error { error } => {
                let message = format!("{}: {}", error.error_type, error.message);
                return Err(classify_failure(None, "", Some(&message)).into());
            }
            CliEvent::Other => {}
        }

        Ok(())
    }

    /// Consolidated turns only carry content when the CLI emitted no partial
    /// messages, otherwise the same content was already streamed
    fn on_assistant(&mut self, turn: AssistantTurn) {
        if let Some(reason) = turn.stop_reason {
            self.stop_reason = Some(StopReason::from_cli(&reason));
        }
        if let Some(usage) = turn.usage {
            self.note_usage(usage);
        }

        if self.seen_partials {
            return;
        }

        for block in turn.content {
            match block {
                TurnBlock::Text { text } => {
                    self.open_text(None);
                    self.push_text(text);
                    self.close_open();
                }
                TurnBlock::ToolUse { id, name, input } => {
                    self.open_tool_use(id, name, None);
                    let input = if input.is_null() { json!({}) } else { input };
                    self.push_json(input.to_string());
                    self.close_open();
                }
                TurnBlock::Other => {}
            }
        }
    }

    fn on_result(&mut self, summary: ResultSummary) -> Result<(), MessagesError> {
        if summary.is_error {
            let reported = summary
                .result
                .or(summary.subtype)
                .unwrap_or_else(|| "claude CLI reported an error".to_owned());
            return Err(classify_failure(None, "", Some(&reported)).into());
        }

        self.final_usage = summary.usage;
        self.result_text = summary.result;
        Ok(())
    }

    fn ensure_started(&mut self) {
        if !self.started {
            self.started = true;
            self.pending.push(StreamEvent::MessageStart {
                message: Message::started(&self.message_id, &self.model),
            });
        }
    }

    fn is_open(&self, cli_index: usize, kind: BlockKind) -> bool {
        self.open.is_some_and(|b| b.cli_index == Some(cli_index) && b.kind == kind)
    }

    fn open_text(&mut self, cli_index: Option<usize>) {
        self.start_block(BlockKind::Text, cli_index, ResponseBlock::Text { text: String::new() });
    }

    fn open_tool_use(&mut self, id: String, name: String, cli_index: Option<usize>) {
        let content_block = ResponseBlock::ToolUse {
            id,
            name,
            input: Value::Object(serde_json::Map::new()),
        };
        self.start_block(BlockKind::ToolUse, cli_index, content_block);
    }

    fn start_block(&mut self, kind: BlockKind, cli_index: Option<usize>, content_block: ResponseBlock) {
        self.ensure_started();
        self.close_open();

        let index = self.next_index;
        self.next_index += 1;
        self.open = Some(OpenBlock { index, cli_index, kind });
        self.pending.push(StreamEvent::ContentBlockStart { index, content_block });
    }

    fn close_open(&mut self) {
        if let Some(block) = self.open.take() {
            self.pending.push(StreamEvent::ContentBlockStop { index: block.index });
        }
    }

    fn push_text(&mut self, text: String) {
        let Some(block) = self.open.filter(|_| !text.is_empty()) else {
            return;
        };
        self.output_chars += text.chars().count();
        self.pending.push(StreamEvent::ContentBlockDelta {
            index: block.index,
            delta: ContentDelta::TextDelta { text },
        });
    }

    fn push_json(&mut self, partial_json: String) {
        let Some(block) = self.open.filter(|_| !partial_json.is_empty()) else {
            return;
        };
        self.output_chars += partial_json.chars().count();
        self.pending.push(StreamEvent::ContentBlockDelta {
            index: block.index,
            delta: ContentDelta::InputJsonDelta { partial_json },
        });
    }

    fn note_usage(&mut self, usage: CliUsage) {
        let merged = self.reported_usage.get_or_insert_with(CliUsage::default);
        for (slot, value) in [
            (&mut merged.input_tokens, usage.input_tokens),
            (&mut merged.output_tokens, usage.output_tokens),
            (&mut merged.cache_creation_input_tokens, usage.cache_creation_input_tokens),
            (&mut merged.cache_read_input_tokens, usage.cache_read_input_tokens),
        ] {
            if value > 0 {
                *slot = value;
            }
        }
    }

    /// Reported counts, with cache reads and writes folded into input tokens,
    /// or a four-characters-per-token estimate
    fn usage(&self) -> Usage {
        match self.final_usage.or(self.reported_usage) {
            Some(u) => Usage {
                input_tokens: u.input_tokens + u.cache_creation_input_tokens + u.cache_read_input_tokens,
                output_tokens: u.output_tokens,
            },
            None => Usage {
                input_tokens: estimate_tokens(self.prompt_chars),
                output_tokens: estimate_tokens(self.output_chars),
            },
        }
    }
}

fn estimate_tokens(chars: usize) -> u64 {
    u64::try_from(chars.div_ceil(4)).unwrap_or(u64::MAX)
}

fn excerpt(line: &str) -> &str {
    match line.char_indices().nth(LOG_EXCERPT) {
        Some((end, _)) => &line[..end],
        None => line,
    }
}
