use serde_json::Value;

use super::{ChunkParser, ParseChunkError};
use crate::types::{ChatChoiceDelta, UnifiedChoice, UnifiedChunk, Usage};

/// OpenAI and Azure chunks are already close to the unified shape; pass
/// through after unmarshal. Azure's only practical difference is in request
/// building (api-version / deployment naming), not in the stream shape, so
/// this parser serves both (spec.md §4.A "Default = OpenAI").
#[derive(Debug, Default)]
pub struct OpenAiChunkParser;

impl ChunkParser for OpenAiChunkParser {
    fn parse_chunk(&mut self, line: &str) -> Result<Option<UnifiedChunk>, ParseChunkError> {
        let line = line.trim();
        if line.is_empty() || line == "[DONE]" {
            return Ok(None);
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };

        let chunk: RawChunk = match serde_json::from_value(value) {
            Ok(c) => c,
            Err(_) => return Ok(None),
        };

        Ok(Some(UnifiedChunk {
            id: chunk.id,
            object: "chat.completion.chunk".to_string(),
            created: chunk.created,
            model: chunk.model,
            choices: chunk
                .choices
                .into_iter()
                .map(|c| UnifiedChoice {
                    index: c.index,
                    delta: ChatChoiceDelta {
                        role: c.delta.role,
                        content: c.delta.content,
                        tool_calls: c.delta.tool_calls,
                    },
                    finish_reason: c.finish_reason,
                })
                .collect(),
            usage: chunk.usage,
        }))
    }
}

#[derive(Debug, serde::Deserialize)]
struct RawChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<RawChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, serde::Deserialize)]
struct RawChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    delta: RawDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct RawDelta {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_and_empty_yield_none() {
        let mut p = OpenAiChunkParser;
        assert!(p.parse_chunk("[DONE]").unwrap().is_none());
        assert!(p.parse_chunk("").unwrap().is_none());
    }

    #[test]
    fn malformed_json_is_skipped_not_fatal() {
        let mut p = OpenAiChunkParser;
        assert!(p.parse_chunk("{not json").unwrap().is_none());
    }

    #[test]
    fn well_formed_chunk_round_trips_content() {
        let mut p = OpenAiChunkParser;
        let line = r#"{"id":"1","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"hi"},"finish_reason":null}]}"#;
        let chunk = p.parse_chunk(line).unwrap().unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hi"));
    }
}
