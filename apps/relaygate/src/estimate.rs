//! Token-count fallback for providers that don't return usage (spec.md
//! §4.I step 9). Grounded on the general `len/4` heuristic documented in
//! OpenAI's own tokenizer guidance; the teacher never needed this since it
//! only ever forwarded usage upstream returned verbatim.

/// A rough words-to-tokens estimate: roughly 4 bytes of English text per
/// token. Only used when the upstream response carries no usage block.
pub fn estimate_tokens(text: &str) -> u64 {
    let len = text.len();
    ((len + 3) / 4) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn rounds_up_to_nearest_token() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
