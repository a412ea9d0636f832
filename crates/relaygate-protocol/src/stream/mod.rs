//! Provider-specific SSE/JSON chunk parsers (spec.md §4.A). Each parser
//! consumes one already-framed line (the forwarder has stripped SSE framing
//! and handed over the `data:` payload) and returns `Ok(None)` for anything
//! that should be skipped — keep-alives, event headers, `[DONE]`, or
//! malformed JSON. Parsers never fail the stream; a parse error here is
//! reserved for tests that want to assert a parser never produces one.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use crate::types::UnifiedChunk;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseChunkError {
    #[error("malformed chunk: {0}")]
    Malformed(String),
}

pub trait ChunkParser: Send {
    /// Parse one line of provider stream payload into a unified chunk.
    /// `Ok(None)` means "skip silently" per spec.md §4.A.
    fn parse_chunk(&mut self, line: &str) -> Result<Option<UnifiedChunk>, ParseChunkError>;
}

/// Lets a `Provider::chunk_parser()` trait object be handed straight to
/// `relaygate_forward::forward`'s generic parser slot without callers
/// needing to match on provider kind first.
impl ChunkParser for Box<dyn ChunkParser + Send> {
    fn parse_chunk(&mut self, line: &str) -> Result<Option<UnifiedChunk>, ParseChunkError> {
        (**self).parse_chunk(line)
    }
}

pub fn default_parser() -> openai::OpenAiChunkParser {
    openai::OpenAiChunkParser::default()
}
