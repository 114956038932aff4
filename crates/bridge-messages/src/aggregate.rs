use std::collections::HashMap;

use anyhow::anyhow;
use serde_json::Value;

use crate::{
    MessagesError,
    protocol::{ContentDelta, Message, ResponseBlock, StreamEvent},
};

/// Folds a stream event sequence into the equivalent complete message
///
/// Non-streaming responses are built with this fold so both response modes
/// always agree.
#[derive(Debug, Default)]
pub struct MessageAccumulator {
    message: Option<Message>,
    /// Tool input JSON received so far, per block index
    partial_json: HashMap<u32, String>,
    stopped: bool,
}

impl MessageAccumulator {
    /// Apply one event
    ///
    /// # Errors
    ///
    /// Fails on events out of protocol order, on tool input that is not
    /// valid JSON, and on in-band `error` events
    pub fn push(&mut self, event: StreamEvent) -> Result<(), MessagesError> {
        if let StreamEvent::MessageStart { message } = event {
            self.message = Some(message);
            return Ok(());
        }

        let message = self
            .message
            .as_mut()
            .ok_or_else(|| anyhow!("stream event before message_start"))?;

        match event {
            StreamEvent::ContentBlockStart { index, content_block } => {
                if usize::try_from(index).ok() != Some(message.content.len()) {
                    return Err(anyhow!("content block {index} started out of order").into());
                }
                message.content.push(content_block);
            }
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                ContentDelta::TextDelta { text } => match block_mut(message, index)? {
                    ResponseBlock::Text { text: buffer } => buffer.push_str(&text),
                    ResponseBlock::ToolUse { .. } => {
                        return Err(anyhow!("text delta for tool_use block {index}").into());
                    }
                },
                ContentDelta::InputJsonDelta { partial_json } => {
                    self.partial_json.entry(index).or_default().push_str(&partial_json);
                }
            },
            StreamEvent::ContentBlockStop { index } => {
                let json = self.partial_json.remove(&index);
                if let ResponseBlock::ToolUse { input, .. } = block_mut(message, index)?
                    && let Some(json) = json.filter(|j| !j.is_empty())
                {
                    *input = serde_json::from_str::<Value>(&json)
                        .map_err(|e| anyhow!("tool input for block {index} is not valid JSON: {e}"))?;
                }
            }
            StreamEvent::MessageDelta { delta, usage } => {
                message.stop_reason = delta.stop_reason;
                message.stop_sequence = delta.stop_sequence;
                message.usage = usage;
            }
            StreamEvent::MessageStop => self.stopped = true,
            StreamEvent::Ping | StreamEvent::MessageStart { .. } => {}
            StreamEvent::Error { error } => return Err(MessagesError::CliExecution(error.message)),
        }

        Ok(())
    }

    /// The completed message
    ///
    /// # Errors
    ///
    /// Fails when the stream ended before `message_stop`
    pub fn finish(self) -> Result<Message, MessagesError> {
        match self.message {
            Some(message) if self.stopped => Ok(message),
            _ => Err(anyhow!("stream ended before message_stop").into()),
        }
    }
}

fn block_mut(message: &mut Message, index: u32) -> Result<&mut ResponseBlock, MessagesError> {
    usize::try_from(index)
        .ok()
        .and_then(|i| message.content.get_mut(i))
        .ok_or_else(|| anyhow!("delta for unknown content block {index}").into())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::{MessageDelta, StopReason, Usage};

    fn start() -> StreamEvent {
        StreamEvent::MessageStart {
            message: Message::started("msg_1", "haiku"),
        }
    }

    #[test]
    fn folds_text_and_tool_use() {
        let mut acc = MessageAccumulator::default();
        for event in [
            start(),
            StreamEvent::ContentBlockStart {
                index: 0,
                content_block: ResponseBlock::Text { text: String::new() },
            },
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::TextDelta { text: "a".into() },
            },
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::TextDelta { text: "b".into() },
            },
            StreamEvent::ContentBlockStop { index: 0 },
            StreamEvent::ContentBlockStart {
                index: 1,
                content_block: ResponseBlock::ToolUse {
                    id: "t".into(),
                    name: "Read".into(),
                    input: json!({}),
                },
            },
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: ContentDelta::InputJsonDelta {
                    partial_json: "{\"x\":".into(),
                },
            },
            StreamEvent::Ping,
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: ContentDelta::InputJsonDelta { partial_json: "1}".into() },
            },
            StreamEvent::ContentBlockStop { index: 1 },
            StreamEvent::MessageDelta {
                delta: MessageDelta {
                    stop_reason: Some(StopReason::ToolUse),
                    stop_sequence: None,
                },
                usage: Usage {
                    input_tokens: 1,
                    output_tokens: 2,
                },
            },
            StreamEvent::MessageStop,
        ] {
            acc.push(event).unwrap();
        }

        let message = acc.finish().unwrap();
        assert_eq!(message.id, "msg_1");
        assert_eq!(
            message.content,
            [
                ResponseBlock::Text { text: "ab".into() },
                ResponseBlock::ToolUse {
                    id: "t".into(),
                    name: "Read".into(),
                    input: json!({"x": 1}),
                },
            ]
        );
        assert_eq!(message.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(message.usage.output_tokens, 2);
    }

    #[test]
    fn tool_use_without_deltas_keeps_empty_input() {
        let mut acc = MessageAccumulator::default();
        acc.push(start()).unwrap();
        acc.push(StreamEvent::ContentBlockStart {
            index: 0,
            content_block: ResponseBlock::ToolUse {
                id: "t".into(),
                name: "Glob".into(),
                input: json!({}),
            },
        })
        .unwrap();
        acc.push(StreamEvent::ContentBlockStop { index: 0 }).unwrap();
        acc.push(StreamEvent::MessageStop).unwrap();

        let message = acc.finish().unwrap();
        assert!(matches!(message.content[0], ResponseBlock::ToolUse { ref input, .. } if *input == json!({})));
    }

    #[test]
    fn out_of_order_events_are_rejected() {
        let mut acc = MessageAccumulator::default();
        assert!(acc.push(StreamEvent::MessageStop).is_err());

        acc.push(start()).unwrap();
        let err = acc.push(StreamEvent::ContentBlockStart {
            index: 3,
            content_block: ResponseBlock::Text { text: String::new() },
        });
        assert!(matches!(err, Err(MessagesError::Internal(_))));
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let mut acc = MessageAccumulator::default();
        acc.push(start()).unwrap();
        assert!(acc.finish().is_err());
    }
}
