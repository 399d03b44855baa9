use itertools::Itertools;

/// Trims the output, and collapses every whitespace run (newlines and
/// `\r` included) into a single space.
pub fn normalize(output: &str) -> String {
    output
        .split(is_blank)
        .filter(|word| !word.is_empty())
        .join(" ")
}

/// Unicode whitespace plus the byte order mark, without NEL (U+0085).
fn is_blank(c: char) -> bool {
    (c.is_whitespace() && c != '\u{85}') || c == '\u{feff}'
}

pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize(actual) == normalize(expected)
}
