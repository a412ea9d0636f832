//! Wire types, the unified streaming chunk, and the per-provider chunk
//! parsers (spec.md §4.A, §6).

pub mod sse;
pub mod stream;
pub mod types;

pub use stream::{ChunkParser, ParseChunkError};
pub use types::{
    CallType, ChatChoiceDelta, ChatMessage, ChatRequest, ChatResponse, ChatResponseChoice,
    CompletionRequest, EmbeddingRequest, ResponseRequest, StreamOptions, UnifiedChoice,
    UnifiedChunk, Usage, resolved_include_usage,
};
