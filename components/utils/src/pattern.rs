use regex::Regex;
use vbsfs_common::CHUNK_SUFFIX_DIGITS;

/// Escape a recording name for literal inclusion in a regex.
///
/// Every ASCII character outside `[A-Za-z0-9_]` gets a leading backslash,
/// the same set Python's `re.escape` used to protect. Recordings are
/// occasionally named with dots and plus signs in them; without this the
/// chunk pattern would match far more than the one recording asked for.
/// Non-ASCII is passed through: it is literal in a pattern anyway, and
/// escaping it would not parse.
pub fn escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii() && !(c.is_ascii_alphanumeric() || c == '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// The pattern matching chunk files of a named recording, as laid out on
/// disk: `<name>.NNNNNNNN` with an exactly eight digit, zero padded suffix.
pub fn chunk_pattern(recname: &str) -> Regex {
    Regex::new(&format!(
        "^{}\\.[0-9]{{{}}}$",
        escape(recname),
        CHUNK_SUFFIX_DIGITS
    ))
    .expect("escaped recording name must compile")
}
