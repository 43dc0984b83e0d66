//! Legacy `§x` style escapes used inside display text.
//!
//! A style escape is the section sign followed by one code character:
//! `0-9a-f` select a color, `k-o` toggle a format and `r` resets both.

pub const STYLE_CHAR: char = '§';

/// True for any character that forms a valid escape after [`STYLE_CHAR`].
pub fn is_style_code(code: char) -> bool {
    matches!(code.to_ascii_lowercase(), '0'..='9' | 'a'..='f' | 'k'..='o' | 'r')
}

/// True for codes that start a fresh style (a color or the reset).
///
/// Format codes do not reset the current formatting, so they are excluded.
pub fn is_fresh_style_code(code: char) -> bool {
    matches!(code.to_ascii_lowercase(), '0'..='9' | 'a'..='f' | 'r')
}

/// True if `text` starts with a style escape.
pub fn starts_with_style_code(text: &str) -> bool {
    text.chars().next().is_some_and(is_style_code)
}

/// True if `text` begins with an escape that starts a fresh style.
pub fn starts_with_fresh_style(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next() == Some(STYLE_CHAR) && chars.next().is_some_and(is_fresh_style_code)
}

/// Returns the escapes that are still in effect at the end of `text`.
///
/// Walks backwards collecting format codes until the first color or reset,
/// which is included and ends the scan. An empty result means the default
/// style is active.
pub fn last_styles(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut collected: Vec<char> = Vec::new();

    let mut index = chars.len();
    while index > 1 {
        index -= 1;
        let code = chars[index];
        if chars[index - 1] != STYLE_CHAR || !is_style_code(code) {
            continue;
        }

        collected.push(code);
        collected.push(STYLE_CHAR);
        if is_fresh_style_code(code) {
            break;
        }
        index -= 1;
    }

    collected.into_iter().rev().collect()
}

/// Number of characters in `text` (not bytes).
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Character-indexed substring `[start, end)`.
pub fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// Cuts `text` to at most `max` characters without leaving a dangling
/// [`STYLE_CHAR`] whose code was cut off.
pub fn truncate_styled(text: &str, max: usize) -> String {
    if char_len(text) <= max {
        return text.to_string();
    }

    let mut kept = char_slice(text, 0, max);
    let rest = char_slice(text, max, char_len(text));
    if kept.ends_with(STYLE_CHAR) && starts_with_style_code(&rest) {
        kept.pop();
    }
    kept
}
