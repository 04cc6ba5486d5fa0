//! Session tokens embedded in forwarded network messages (`ID: #<id>`).

use std::ops::RangeInclusive;

/// Accepted token length.
pub const TOKEN_LEN: RangeInclusive<usize> = 15..=30;

/// Find the session id referenced by a quoted message.
///
/// Lines are scanned from the last one backward and the first valid token
/// wins. A line's candidate is the text after its last `#`, trimmed and
/// stripped of trailing markdown (`)`, `*`, `_`); it must be 15 to 30 ASCII
/// alphanumeric characters.
#[must_use]
pub fn extract_session_id(quoted: &str) -> Option<String> {
    quoted
        .lines()
        .rev()
        .filter_map(|line| line.trim().rsplit_once('#'))
        .map(|(_, tail)| tail.trim().trim_end_matches([')', '*', '_', ' ']))
        .find(|token| {
            TOKEN_LEN.contains(&token.len()) && token.bytes().all(|b| b.is_ascii_alphanumeric())
        })
        .map(String::from)
}
