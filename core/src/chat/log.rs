//! Helpers for putting chat content into log fields without dumping whole embeds.

use std::borrow::Cow;

use super::transport::MessageContent;

const CONTENT_LOG_MAX_LEN: usize = 120;

/// Truncate text for logging, on a char boundary.
pub fn truncate_content(content: &str, max_len: usize) -> Cow<'_, str> {
    if content.len() <= max_len {
        return Cow::Borrowed(content);
    }
    let mut end = max_len;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!("{}... ({} bytes)", &content[..end], content.len()))
}

#[inline]
pub fn truncate_content_default(content: &str) -> Cow<'_, str> {
    truncate_content(content, CONTENT_LOG_MAX_LEN)
}

/// One-line description of a message payload: first text line plus embed count.
pub fn summarize(content: &MessageContent) -> String {
    let first_line = content.text.lines().next().unwrap_or("");
    format!(
        "{} [+{} embed(s)]",
        truncate_content_default(first_line),
        content.embeds.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "ééééé";
        let out = truncate_content(s, 3);
        assert!(out.starts_with('é'));
        assert!(out.ends_with("(10 bytes)"));
        assert_eq!(truncate_content("short", 10), "short");
    }
}
