use std::path::Path;

const MAX_SUMMARY_CHARS: usize = 600;
const MAX_ERROR_LINES: usize = 4;

/// Condenses a compiler log into a short, client-safe error summary.
///
/// TeX marks errors with a leading `!`; the line after each one usually
/// carries the offending source line (`l.<n> ...`). Paths under the working
/// directory become relative; any other absolute path is cut to its file name.
pub fn summarize_log(log: &str, working_dir: &Path) -> String {
    let lines: Vec<&str> = log.lines().collect();
    let mut picked: Vec<String> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !line.starts_with('!') {
            continue;
        }
        let mut entry = line.trim_start_matches('!').trim().to_string();
        if let Some(context) = lines[i + 1..]
            .iter()
            .take(6)
            .find(|l| l.starts_with("l."))
        {
            entry.push_str(" (");
            entry.push_str(context.trim());
            entry.push(')');
        }
        picked.push(entry);
        if picked.len() == MAX_ERROR_LINES {
            break;
        }
    }

    let summary = if picked.is_empty() {
        match lines.iter().rev().find(|l| !l.trim().is_empty()) {
            Some(last) => last.trim().to_string(),
            None => "compiler exited with an error and no log output".to_string(),
        }
    } else {
        picked.join("; ")
    };

    let redacted = strip_absolute_paths(&redact(&summary, working_dir));
    truncate(&redacted, MAX_SUMMARY_CHARS)
}

fn redact(text: &str, working_dir: &Path) -> String {
    let dir = working_dir.display().to_string();
    if dir.is_empty() {
        return text.to_string();
    }
    text.replace(&format!("{dir}/"), "").replace(&dir, ".")
}

/// `/usr/share/texmf/tex/latex/foo.sty` becomes `foo.sty`.
fn strip_absolute_paths(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut path: Option<String> = None;
    let mut prev: Option<char> = None;

    for c in text.chars() {
        if let Some(p) = path.as_mut() {
            if c.is_whitespace() || matches!(c, ')' | '\'' | '"' | '`' | '>' | ']' | ',' | ';') {
                out.push_str(p.rsplit('/').next().unwrap_or_default());
                path = None;
                out.push(c);
            } else {
                p.push(c);
            }
        } else if c == '/'
            && prev.map_or(true, |p| {
                p.is_whitespace() || matches!(p, '(' | '`' | '\'' | '"' | '<' | '[' | '=' | ':')
            })
        {
            path = Some(String::from(c));
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    if let Some(p) = path {
        out.push_str(p.rsplit('/').next().unwrap_or_default());
    }
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picks_bang_lines_with_context() {
        let log = "This is XeTeX\n(./resume.tex\n! Undefined control sequence.\n<recently read> \\foo\nl.42 \\foo\n\nNo pages of output.";
        let summary = summarize_log(log, Path::new("/tmp/job"));
        assert_eq!(summary, "Undefined control sequence. (l.42 \\foo)");
    }

    #[test]
    fn test_fallback_line_drops_system_paths() {
        let log = "This is XeTeX\nOutput written on /usr/local/texlive/2024/texmf-var/fonts/cache.fmt (1 page).\n";
        let summary = summarize_log(log, Path::new("/tmp/job"));
        assert_eq!(summary, "Output written on cache.fmt (1 page).");
    }

    #[test]
    fn test_error_line_drops_texmf_path() {
        let log = "! I can't find file `/usr/share/texmf/tex/latex/fontawesome5.sty'.\nl.3 \\usepackage";
        let summary = summarize_log(log, Path::new("/tmp/job"));
        assert!(!summary.contains("/usr/share"), "{summary}");
        assert!(summary.contains("`fontawesome5.sty'"), "{summary}");
    }

    #[test]
    fn test_redacts_working_dir() {
        let log = "! LaTeX Error: File `/var/vellum/job-1/missing.sty' not found.";
        let summary = summarize_log(log, Path::new("/var/vellum/job-1"));
        assert!(!summary.contains("/var/vellum"), "{summary}");
        assert!(summary.contains("missing.sty"));
    }

    #[test]
    fn test_falls_back_to_last_line() {
        let summary = summarize_log("sh: xelatex: not found\n\n", Path::new("/w"));
        assert_eq!(summary, "sh: xelatex: not found");
        assert!(!summarize_log("", Path::new("/w")).is_empty());
    }

    #[test]
    fn test_summary_is_bounded() {
        let log = format!("! {}", "x".repeat(5_000));
        let summary = summarize_log(&log, Path::new("/w"));
        assert!(summary.chars().count() <= MAX_SUMMARY_CHARS + 1);
    }
}
