use serde_json::Value;

use super::{ChunkParser, ParseChunkError};
use crate::types::{ChatChoiceDelta, UnifiedChoice, UnifiedChunk, Usage};

/// Gemini streams are framed as a top-level JSON array: `[`, one object per
/// chunk separated by `,`, then `]`. This parser strips the array framing
/// and concatenates `candidates[0].content.parts[*].text` per object (spec.md
/// §4.A).
#[derive(Debug, Default)]
pub struct GeminiChunkParser {
    id_counter: u64,
}

impl ChunkParser for GeminiChunkParser {
    fn parse_chunk(&mut self, line: &str) -> Result<Option<UnifiedChunk>, ParseChunkError> {
        let trimmed = strip_array_framing(line);
        if trimmed.is_empty() || trimmed == "[DONE]" {
            return Ok(None);
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };

        let candidate = value.get("candidates").and_then(|c| c.get(0));
        let Some(candidate) = candidate else {
            return Ok(None);
        };

        let text = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let finish_reason = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .map(map_finish_reason);

        let usage = value.get("usageMetadata").map(|u| {
            let prompt = u
                .get("promptTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            let completion = u
                .get("candidatesTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            let total = u
                .get("totalTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(prompt + completion);
            Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: total,
                cost: None,
            }
        });

        if text.is_empty() && finish_reason.is_none() && usage.is_none() {
            return Ok(None);
        }

        self.id_counter += 1;
        Ok(Some(UnifiedChunk {
            id: format!("gemini-{}", self.id_counter),
            object: "chat.completion.chunk".to_string(),
            created: 0,
            model: value
                .get("modelVersion")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            choices: vec![UnifiedChoice {
                index: 0,
                delta: ChatChoiceDelta {
                    role: None,
                    content: if text.is_empty() { None } else { Some(text) },
                    tool_calls: None,
                },
                finish_reason,
            }],
            usage,
        }))
    }
}

fn strip_array_framing(line: &str) -> &str {
    let mut s = line.trim();
    if let Some(rest) = s.strip_prefix('[') {
        s = rest.trim_start();
    }
    if let Some(rest) = s.strip_suffix(']') {
        s = rest.trim_end();
    }
    s = s.trim_start_matches(',').trim();
    s
}

fn map_finish_reason(reason: &str) -> String {
    match reason {
        "STOP" => "stop",
        "MAX_TOKENS" => "length",
        "SAFETY" | "RECITATION" => "content_filter",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_array_framing_and_concatenates_parts() {
        let mut p = GeminiChunkParser::default();
        let line = r#"[{"candidates":[{"content":{"parts":[{"text":"hi"}]}}]}"#;
        let chunk = p.parse_chunk(line).unwrap().unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hi"));
    }

    #[test]
    fn ignores_leading_comma_fragment() {
        let mut p = GeminiChunkParser::default();
        let line = r#",{"candidates":[{"content":{"parts":[{"text":" there"}]}}]}"#;
        let chunk = p.parse_chunk(line).unwrap().unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some(" there"));
    }

    #[test]
    fn maps_finish_reasons() {
        let mut p = GeminiChunkParser::default();
        let line = r#"{"candidates":[{"finishReason":"SAFETY","content":{"parts":[]}}]}"#;
        let chunk = p.parse_chunk(line).unwrap().unwrap();
        assert_eq!(
            chunk.choices[0].finish_reason.as_deref(),
            Some("content_filter")
        );
    }

    #[test]
    fn empty_fragment_yields_none() {
        let mut p = GeminiChunkParser::default();
        assert!(p.parse_chunk("]").unwrap().is_none());
        assert!(p.parse_chunk("").unwrap().is_none());
    }
}
