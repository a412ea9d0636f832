use serde_json::Value;

use super::{ChunkParser, ParseChunkError};
use crate::types::{ChatChoiceDelta, UnifiedChoice, UnifiedChunk, Usage};

/// Anthropic streams are event-typed (`message_start`, `content_block_delta`,
/// `message_delta`, ...). This parser is stateful: it seeds `current_id`/
/// `current_model` from `message_start` and keeps them across calls, per
/// spec.md §4.A.
#[derive(Debug, Default)]
pub struct AnthropicChunkParser {
    current_id: String,
    current_model: String,
}

impl ChunkParser for AnthropicChunkParser {
    fn parse_chunk(&mut self, line: &str) -> Result<Option<UnifiedChunk>, ParseChunkError> {
        let line = line.trim();
        if line.is_empty() || line == "[DONE]" {
            return Ok(None);
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };

        let Some(event_type) = value.get("type").and_then(Value::as_str) else {
            return Ok(None);
        };

        match event_type {
            "message_start" => {
                if let Some(message) = value.get("message") {
                    if let Some(id) = message.get("id").and_then(Value::as_str) {
                        self.current_id = id.to_string();
                    }
                    if let Some(model) = message.get("model").and_then(Value::as_str) {
                        self.current_model = model.to_string();
                    }
                }
                Ok(None)
            }
            "content_block_delta" => {
                let text = value
                    .get("delta")
                    .and_then(|d| d.get("text"))
                    .and_then(Value::as_str)
                    .or_else(|| {
                        value
                            .get("delta")
                            .and_then(|d| d.get("partial_json"))
                            .and_then(Value::as_str)
                    });
                let Some(text) = text else {
                    return Ok(None);
                };
                Ok(Some(self.content_chunk(text)))
            }
            "message_delta" => {
                let stop_reason = value
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(Value::as_str);
                let usage = value.get("usage").and_then(|u| {
                    let input = u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
                    let output = u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
                    Some(Usage {
                        prompt_tokens: input,
                        completion_tokens: output,
                        total_tokens: input + output,
                        cost: None,
                    })
                });
                let Some(stop_reason) = stop_reason else {
                    return Ok(usage.map(|usage| self.finish_chunk(None, Some(usage))));
                };
                let finish_reason = map_stop_reason(stop_reason);
                Ok(Some(self.finish_chunk(Some(&finish_reason), usage)))
            }
            // Ignored per spec.md §4.A.
            "ping" | "content_block_start" | "content_block_stop" | "message_stop" => Ok(None),
            _ => Ok(None),
        }
    }
}

impl AnthropicChunkParser {
    fn content_chunk(&self, text: &str) -> UnifiedChunk {
        UnifiedChunk::content_delta(0, &self.current_model, &self.current_id, text)
    }

    fn finish_chunk(&self, finish_reason: Option<&str>, usage: Option<Usage>) -> UnifiedChunk {
        UnifiedChunk {
            id: self.current_id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: 0,
            model: self.current_model.clone(),
            choices: vec![UnifiedChoice {
                index: 0,
                delta: ChatChoiceDelta {
                    role: None,
                    content: None,
                    tool_calls: None,
                },
                finish_reason: finish_reason.map(|s| s.to_string()),
            }],
            usage,
        }
    }
}

fn map_stop_reason(reason: &str) -> String {
    match reason {
        "end_turn" => "stop",
        "max_tokens" => "length",
        "stop_sequence" => "stop",
        "tool_use" => "tool_calls",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_id_and_model_from_message_start_then_emits_content() {
        let mut p = AnthropicChunkParser::default();
        assert!(
            p.parse_chunk(r#"{"type":"message_start","message":{"id":"msg_1","model":"claude-3"}}"#)
                .unwrap()
                .is_none()
        );
        let chunk = p
            .parse_chunk(r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"hi"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.id, "msg_1");
        assert_eq!(chunk.model, "claude-3");
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hi"));
    }

    #[test]
    fn maps_stop_reason_to_finish_reason() {
        let mut p = AnthropicChunkParser::default();
        let chunk = p
            .parse_chunk(r#"{"type":"message_delta","delta":{"stop_reason":"max_tokens"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("length"));
    }

    #[test]
    fn ignores_ping_and_block_markers() {
        let mut p = AnthropicChunkParser::default();
        assert!(p.parse_chunk(r#"{"type":"ping"}"#).unwrap().is_none());
        assert!(
            p.parse_chunk(r#"{"type":"content_block_start"}"#)
                .unwrap()
                .is_none()
        );
        assert!(p.parse_chunk(r#"{"type":"message_stop"}"#).unwrap().is_none());
    }

    #[test]
    fn malformed_json_is_skipped() {
        let mut p = AnthropicChunkParser::default();
        assert!(p.parse_chunk("{bad").unwrap().is_none());
    }
}
