//! Text → LaTeX conversion.
//!
//! Characters the document font/encoding cannot be trusted with are looked up
//! in [`CHARMAP`] first; only characters that are not in the table go through
//! LaTeX special-character escaping. Both steps happen in one pass, so the
//! backslashes and braces a substitution emits are never escaped again.

/// Revision of [`CHARMAP`]. Bump whenever an entry changes, since it changes
/// rendered output for existing records.
pub const CHARMAP_VERSION: u32 = 1;

/// Character substitutions, applied before any other escaping.
pub const CHARMAP: &[(char, &str)] = &[
    ('\u{00A0}', "~"),
    ('\u{200B}', ""),
    ('\u{2018}', "`"),
    ('\u{2019}', "'"),
    ('\u{201C}', "``"),
    ('\u{201D}', "''"),
    ('\u{2013}', "--"),
    ('\u{2014}', "---"),
    ('\u{2026}', "\\ldots{}"),
    ('\u{2022}', "\\textbullet{}"),
    ('\u{00B7}', "\\textperiodcentered{}"),
    ('\u{2192}', "$\\rightarrow$"),
    ('\u{2190}', "$\\leftarrow$"),
    ('\u{00D7}', "$\\times$"),
    ('\u{2265}', "$\\geq$"),
    ('\u{2264}', "$\\leq$"),
    ('\u{00B1}', "$\\pm$"),
    ('\u{00B0}', "$^{\\circ}$"),
    ('\u{2122}', "\\texttrademark{}"),
    ('\u{00A9}', "\\textcopyright{}"),
    ('\u{00AE}', "\\textregistered{}"),
    ('\u{20AC}', "EUR"),
    ('\u{00BD}', "1/2"),
    ('\u{2212}', "-"),
];

fn substitute(c: char) -> Option<&'static str> {
    CHARMAP
        .iter()
        .find(|(from, _)| *from == c)
        .map(|(_, to)| *to)
}

fn latex_special(c: char) -> Option<&'static str> {
    Some(match c {
        '\\' => "\\textbackslash{}",
        '{' => "\\{",
        '}' => "\\}",
        '$' => "\\$",
        '#' => "\\#",
        '%' => "\\%",
        '&' => "\\&",
        '_' => "\\_",
        '~' => "\\textasciitilde{}",
        '^' => "\\textasciicircum{}",
        _ => return None,
    })
}

/// Escapes plain text for use inside a LaTeX argument.
pub fn escape_tex(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        if let Some(sub) = substitute(c) {
            out.push_str(sub);
        } else if let Some(esc) = latex_special(c) {
            out.push_str(esc);
        } else if c == '\r' || c == '\n' {
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

/// Escapes text and turns `**bold**` / `*italic*` markers into LaTeX.
/// An unmatched trailing marker is kept as a literal asterisk.
pub fn inline_markup(text: &str) -> String {
    let escaped = escape_tex(text);
    let bolded = wrap_pairs(&escaped, "**", "\\textbf{");
    wrap_pairs(&bolded, "*", "\\textit{")
}

fn wrap_pairs(text: &str, marker: &str, open: &str) -> String {
    let parts: Vec<&str> = text.split(marker).collect();
    // An even number of parts means the last marker has no partner.
    let paired = if parts.len() % 2 == 0 {
        parts.len() - 1
    } else {
        parts.len()
    };

    let mut out = String::with_capacity(text.len());
    for (i, part) in parts.iter().enumerate() {
        if i >= paired {
            out.push_str(marker);
            out.push_str(part);
        } else if i % 2 == 1 {
            out.push_str(open);
            out.push_str(part);
            out.push('}');
        } else {
            out.push_str(part);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_special_characters() {
        assert_eq!(escape_tex("50% & $5"), "50\\% \\& \\$5");
        assert_eq!(escape_tex("a_b #1"), "a\\_b \\#1");
        assert_eq!(escape_tex("{x}"), "\\{x\\}");
        assert_eq!(escape_tex("a\\b"), "a\\textbackslash{}b");
    }

    #[test]
    fn test_substitution_output_is_not_re_escaped() {
        // The ellipsis expands to `\ldots{}`; its backslash and braces must survive.
        assert_eq!(escape_tex("wait…"), "wait\\ldots{}");
        assert_eq!(escape_tex("2×"), "2$\\times$");
    }

    #[test]
    fn test_typographic_quotes_and_dashes() {
        assert_eq!(escape_tex("“Rust” – fast — safe"), "``Rust'' -- fast --- safe");
    }

    #[test]
    fn test_newlines_collapse_to_spaces() {
        assert_eq!(escape_tex("line one\nline two"), "line one line two");
    }

    #[test]
    fn test_charmap_has_no_duplicate_sources() {
        let mut seen = std::collections::HashSet::new();
        for (from, _) in CHARMAP {
            assert!(seen.insert(*from), "duplicate charmap entry {from:?}");
        }
    }

    #[test]
    fn test_inline_bold_and_italic() {
        assert_eq!(
            inline_markup("**Led** a *small* team"),
            "\\textbf{Led} a \\textit{small} team"
        );
    }

    #[test]
    fn test_inline_unmatched_marker_is_literal() {
        assert_eq!(inline_markup("5 * 3"), "5 * 3");
    }

    #[test]
    fn test_inline_escapes_inside_bold() {
        assert_eq!(inline_markup("**100%**"), "\\textbf{100\\%}");
    }
}
