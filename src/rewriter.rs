//! Line-precise rewriting of `uses:` values.
//!
//! Edits are keyed by the 1-based line the YAML parser reported for each
//! `uses:` value. Before replacing, the live line is checked to still start
//! with `uses:` or `- uses:`; if it does not, the parser's position has
//! drifted from the text (block scalars, odd flow layouts) and the line is
//! left alone.

use crate::walker::LineEdits;
use tracing::warn;

const DASH_MARKER: &str = "- ";
const USES_KEY: &str = "uses:";

/// Applies `edits` to `original`, returning the new text.
///
/// Lines without an edit are copied verbatim, so an empty edit set returns the
/// input byte-for-byte. A trailing `\r` is kept on edited lines so CRLF files
/// stay CRLF.
pub fn rewrite(original: &str, edits: &LineEdits) -> String {
    if edits.is_empty() {
        return original.to_string();
    }

    let lines: Vec<&str> = original.split('\n').collect();
    let mut out = String::with_capacity(original.len());

    for (index, line) in lines.iter().enumerate() {
        let number = index + 1;
        match edits.get(number) {
            Some(replacement) => match rewrite_line(line, replacement) {
                Some(updated) => out.push_str(&updated),
                None => {
                    warn!(line = number, text = %line.trim(), "line no longer starts with uses:, leaving it unchanged");
                    out.push_str(line);
                }
            },
            None => out.push_str(line),
        }
        if index + 1 < lines.len() {
            out.push('\n');
        }
    }

    out
}

fn rewrite_line(line: &str, replacement: &str) -> Option<String> {
    let (body, carriage) = match line.strip_suffix('\r') {
        Some(body) => (body, "\r"),
        None => (line, ""),
    };

    let indent_len = body.len() - body.trim_start_matches([' ', '\t']).len();
    let (indent, rest) = body.split_at(indent_len);
    let trimmed = rest.trim_start();

    let marker = if trimmed.starts_with(USES_KEY) {
        ""
    } else if trimmed
        .strip_prefix(DASH_MARKER)
        .is_some_and(|after| after.starts_with(USES_KEY))
    {
        DASH_MARKER
    } else {
        return None;
    };

    Some(format!("{indent}{marker}{USES_KEY} {replacement}{carriage}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edits(items: &[(usize, &str)]) -> LineEdits {
        items
            .iter()
            .map(|(line, text)| (*line, text.to_string()))
            .collect()
    }

    const SHA: &str = "11bd71901bbe5b1630ceea73d27597364c9af683";

    #[test]
    fn replaces_dash_form_keeping_indent() {
        let content = "steps:\n  - uses: actions/checkout@v4\n";
        let result = rewrite(content, &edits(&[(2, &format!("actions/checkout@{SHA} #v4"))]));
        assert_eq!(
            result,
            format!("steps:\n  - uses: actions/checkout@{SHA} #v4\n")
        );
    }

    #[test]
    fn replaces_plain_form() {
        let content = "jobs:\n  call:\n    uses: owner/repo/.github/workflows/wf.yml@main";
        let result = rewrite(
            content,
            &edits(&[(3, &format!("owner/repo/.github/workflows/wf.yml@{SHA} #main"))]),
        );
        assert_eq!(
            result,
            format!("jobs:\n  call:\n    uses: owner/repo/.github/workflows/wf.yml@{SHA} #main")
        );
    }

    #[test]
    fn empty_edits_return_original() {
        for content in ["a: 1\n", "a: 1", "", "\n\n", "x:\r\n  - uses: a/b@v1\r\n"] {
            assert_eq!(rewrite(content, &LineEdits::new()), content);
        }
    }

    #[test]
    fn preserves_trailing_newline_presence() {
        let with = rewrite("uses: a/b@v1\n", &edits(&[(1, "a/b@x #v1")]));
        let without = rewrite("uses: a/b@v1", &edits(&[(1, "a/b@x #v1")]));
        assert_eq!(with, "uses: a/b@x #v1\n");
        assert_eq!(without, "uses: a/b@x #v1");
    }

    #[test]
    fn preserves_tab_indentation() {
        let result = rewrite("\t- uses: a/b@v1\n", &edits(&[(1, "a/b@x #v1")]));
        assert_eq!(result, "\t- uses: a/b@x #v1\n");
    }

    #[test]
    fn drops_existing_trailing_comment() {
        let result = rewrite("  - uses: a/b@v1 # old\n", &edits(&[(1, "a/b@x #v2")]));
        assert_eq!(result, "  - uses: a/b@x #v2\n");
    }

    #[test]
    fn keeps_carriage_return() {
        let result = rewrite("s:\r\n  - uses: a/b@v1\r\n", &edits(&[(2, "a/b@x #v1")]));
        assert_eq!(result, "s:\r\n  - uses: a/b@x #v1\r\n");
    }

    #[test]
    fn leaves_drifted_line_unchanged() {
        let content = "# comment\nname: ci\n  - uses: a/b@v1\n";
        let result = rewrite(content, &edits(&[(2, "a/b@x #v1")]));
        assert_eq!(result, content);
    }

    #[test]
    fn ignores_edits_past_end_of_file() {
        let content = "uses: a/b@v1\n";
        let result = rewrite(content, &edits(&[(9, "a/b@x #v1")]));
        assert_eq!(result, content);
    }

    #[test]
    fn edits_only_flagged_lines() {
        let content = "\
steps:
  - uses: a/one@v1
  - uses: a/two@v1
  - run: echo uses: a/one@v1
";
        let result = rewrite(content, &edits(&[(3, "a/two@x #v1")]));
        assert_eq!(
            result,
            "\
steps:
  - uses: a/one@v1
  - uses: a/two@x #v1
  - run: echo uses: a/one@v1
"
        );
    }
}
