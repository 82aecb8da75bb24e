//! LIKE pattern construction.

use crate::filter::MatchMode;

/// Characters tried in order as the escape character; LIKE escapes are one character
const ESCAPE_CANDIDATES: [char; 6] = ['@', '~', '#', '|', '!', '^'];

/// Escape every reserved string in `value`
///
/// Returns the escaped value and the escape character, which is `None` when
/// nothing needed escaping. When every candidate already occurs in the value
/// it is returned unescaped.
#[must_use]
pub fn escape_reserved(value: &str, reserved: &[String]) -> (String, Option<char>) {
    let Some(escape) = ESCAPE_CANDIDATES.iter().copied().find(|c| !value.contains(*c)) else {
        return (value.to_string(), None);
    };

    let mut escaped = value.to_string();
    for token in reserved {
        escaped = escaped.replace(token.as_str(), &format!("{escape}{token}"));
    }

    if escaped == value {
        (escaped, None)
    } else {
        (escaped, Some(escape))
    }
}

/// Add `%` wildcards for the match mode
#[must_use]
pub fn apply_match_mode(value: &str, match_mode: MatchMode) -> String {
    match match_mode {
        MatchMode::Exact => value.to_string(),
        MatchMode::Start => format!("{value}%"),
        MatchMode::End => format!("%{value}"),
        MatchMode::Anywhere => format!("%{value}%"),
    }
}
