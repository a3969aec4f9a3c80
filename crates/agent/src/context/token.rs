//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 bytes per token, rounded up. Every
//! budget decision in this crate goes through these functions so the
//! rendered prompt and the budget always agree on sizes.

use cairn_core::message::Message;

/// Bytes per estimated token.
pub const BYTES_PER_TOKEN: usize = 4;

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(BYTES_PER_TOKEN)
}

/// Estimate tokens for a single message including per-message overhead
/// (role name and delimiters).
pub fn estimate_message_tokens(message: &Message) -> usize {
    let overhead = 4;
    overhead + estimate_tokens(&message.content)
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Largest byte budget that still estimates to at most `tokens`.
pub fn byte_allowance(tokens: usize) -> usize {
    tokens.saturating_mul(BYTES_PER_TOKEN)
}

/// Keep at most `max_bytes` from the start of `text`, on a char boundary.
pub fn clip_head(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Keep at most `max_bytes` from the end of `text`, on a char boundary.
pub fn clip_tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn message_includes_overhead() {
        let msg = Message::user("test"); // 1 token + 4 overhead
        assert_eq!(estimate_message_tokens(&msg), 5);
    }

    #[test]
    fn multiple_messages() {
        let msgs = vec![Message::user("hello"), Message::assistant("world")];
        assert_eq!(estimate_messages_tokens(&msgs), 12);
    }

    #[test]
    fn clipping_respects_char_boundaries() {
        let text = "añb"; // 'ñ' is two bytes
        assert_eq!(clip_head(text, 2), "a");
        assert_eq!(clip_tail(text, 2), "b");
        assert_eq!(clip_head(text, 10), text);
    }

    #[test]
    fn clipped_text_fits_its_allowance() {
        let text = "x".repeat(101);
        let clipped = clip_tail(&text, byte_allowance(10));
        assert!(estimate_tokens(clipped) <= 10);
    }
}
