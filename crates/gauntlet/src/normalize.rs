//! Output normalization for answer comparison
//!
//! Two outputs are considered equal when they only differ in line endings,
//! trailing spaces/tabs on a line, or trailing blank lines.

/// Canonicalize program output
///
/// Converts CRLF and lone CR to LF, strips trailing spaces and tabs from every
/// line, drops trailing blank lines and rejoins with LF (no final newline).
pub fn normalize(output: &str) -> String {
    let unified = output.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines: Vec<&str> = unified
        .split('\n')
        .map(|line| line.trim_end_matches([' ', '\t']))
        .collect();

    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

/// Compare two outputs after normalization
pub fn outputs_equal(actual: &str, expected: &str) -> bool {
    normalize(actual) == normalize(expected)
}
