//! Passes over the rendered markdown
//!
//! All passes leave fenced code blocks untouched.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Navigation aids that carry no content
const NAV_PHRASES: &[&str] = &[
    "skip to content",
    "skip to main content",
    "skip to navigation",
    "skip navigation",
    "back to top",
    "scroll to top",
    "go to top",
    "copy page",
    "copy link",
    "copy to clipboard",
    "copy",
    "copied!",
    "edit this page",
    "edit on github",
    "on this page",
    "in this article",
    "table of contents",
    "was this page helpful?",
    "was this page helpful",
];

static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(!?)\[((?:\\.|[^\[\]\\])*)\]\((?:\\.|[^()\\])*\)")
        .expect("markdown link pattern is valid")
});

/// Opening fence of a code block: (fence char, run length, info string)
fn parse_fence(line: &str) -> Option<(char, usize, &str)> {
    let trimmed = line.trim_start();
    let ch = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == ch).count();
    if len < 3 {
        return None;
    }
    let info = &trimmed[len..];
    if ch == '`' && info.contains('`') {
        return None;
    }
    Some((ch, len, info))
}

fn is_closing_fence(line: &str, ch: char, len: usize) -> bool {
    let trimmed = line.trim();
    trimmed.chars().count() >= len && trimmed.chars().all(|c| c == ch)
}

/// Tracks whether a line sits inside a fenced block
#[derive(Debug, Default)]
struct FenceTracker {
    open: Option<(char, usize)>,
}

impl FenceTracker {
    /// Returns true when the line is a fence or inside a fenced block
    fn in_code(&mut self, line: &str) -> bool {
        match self.open {
            Some((ch, len)) => {
                if is_closing_fence(line, ch, len) {
                    self.open = None;
                }
                true
            }
            None => match parse_fence(line) {
                Some((ch, len, _)) => {
                    self.open = Some((ch, len));
                    true
                }
                None => false,
            },
        }
    }
}

/// Bracket depth after scanning `line`, skipping escapes and code spans
fn bracket_depth(line: &str, mut depth: usize) -> usize {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '`' => {
                let run = chars[i..].iter().take_while(|c| **c == '`').count();
                let mut j = i + run;
                let mut closed = None;
                while j < chars.len() {
                    if chars[j] == '`' {
                        let close = chars[j..].iter().take_while(|c| **c == '`').count();
                        if close == run {
                            closed = Some(j + close);
                            break;
                        }
                        j += close;
                    } else {
                        j += 1;
                    }
                }
                i = closed.unwrap_or(i + run);
                continue;
            }
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }
    depth
}

/// Continues lines that end inside an open `[...]` span with a trailing `\`
pub fn escape_link_newlines(markdown: &str) -> String {
    let lines: Vec<&str> = markdown.split('\n').collect();
    let mut out = Vec::with_capacity(lines.len());
    let mut fences = FenceTracker::default();
    let mut depth = 0;

    for (i, line) in lines.iter().enumerate() {
        if fences.in_code(line) {
            depth = 0;
            out.push((*line).to_string());
            continue;
        }

        depth = bracket_depth(line, depth);
        if depth > 0 && i + 1 < lines.len() {
            out.push(format!("{}\\", line));
        } else {
            out.push((*line).to_string());
        }
    }

    out.join("\n")
}

fn normalize_phrase(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '\\' | '`' | '#' | '↑' | '»' | '«' | '¶'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == ':' || c == '-' || c == '|')
        .trim()
        .to_lowercase()
}

fn is_nav_phrase(text: &str) -> bool {
    let normalized = normalize_phrase(text);
    !normalized.is_empty() && NAV_PHRASES.contains(&normalized.as_str())
}

fn strip_line_markers(line: &str) -> &str {
    let trimmed = line.trim();
    let trimmed = trimmed.trim_start_matches('#').trim_start();
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return rest;
        }
    }
    trimmed
}

/// Drops navigation-aid links and lines, then collapses blank lines
pub fn remove_nav_phrases(markdown: &str) -> String {
    let mut kept: Vec<String> = Vec::new();
    let mut fences = FenceTracker::default();

    for line in markdown.split('\n') {
        if fences.in_code(line) {
            kept.push(line.to_string());
            continue;
        }

        let replaced = MARKDOWN_LINK.replace_all(line, |caps: &Captures<'_>| {
            if caps[1].is_empty() && is_nav_phrase(&caps[2]) {
                String::new()
            } else {
                caps[0].to_string()
            }
        });

        if is_nav_phrase(strip_line_markers(&replaced)) {
            continue;
        }
        if replaced != line {
            let residue = strip_line_markers(&replaced);
            if residue.is_empty() || residue.chars().all(|c| matches!(c, '-' | '*' | '+' | '|')) {
                continue;
            }
            kept.push(replaced.trim_end().to_string());
        } else {
            kept.push(line.to_string());
        }
    }

    collapse_blank_lines(&kept)
}

fn collapse_blank_lines(lines: &[String]) -> String {
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut fences = FenceTracker::default();

    for line in lines {
        let in_code = fences.in_code(line);
        if !in_code && line.trim().is_empty() {
            if out.last().map(|l| l.trim().is_empty()).unwrap_or(true) {
                continue;
            }
        }
        out.push(line);
    }

    while out.last().map(|l| l.trim().is_empty()).unwrap_or(false) {
        out.pop();
    }
    out.join("\n")
}

const LANGUAGES: &[&str] = &[
    "bash", "c#", "c++", "clojure", "console", "cpp", "csharp", "css", "dart", "diff",
    "dockerfile", "elixir", "erlang", "go", "graphql", "haskell", "html", "ini", "java",
    "javascript", "js", "json", "jsonc", "jsx", "kotlin", "lua", "makefile", "markdown", "md",
    "nginx", "objective-c", "perl", "php", "plaintext", "powershell", "ps1", "python", "py",
    "ruby", "rust", "sass", "scala", "scss", "sh", "shell", "sql", "svelte", "swift", "terminal",
    "toml", "ts", "tsx", "typescript", "vue", "xml", "yaml", "yml", "zig", "zsh",
];

fn language_for_extension(ext: &str) -> Option<&'static str> {
    let lang = match ext {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "tsx",
        "jsx" => "jsx",
        "json" => "json",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        "sh" | "bash" => "bash",
        "zsh" => "zsh",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" => "scss",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "rb" => "ruby",
        "php" => "php",
        "sql" => "sql",
        "md" | "mdx" => "markdown",
        "c" | "h" => "c",
        "cc" | "cpp" | "hpp" | "cxx" => "cpp",
        "cs" => "csharp",
        "swift" => "swift",
        "xml" => "xml",
        "lua" => "lua",
        "vue" => "vue",
        "svelte" => "svelte",
        "ex" | "exs" => "elixir",
        "ps1" => "powershell",
        "ini" | "cfg" => "ini",
        _ => return None,
    };
    Some(lang)
}

/// Language named by a hint line: a lowercase identifier or a file path
fn language_hint(line: &str) -> Option<String> {
    let candidate: String = line
        .trim()
        .trim_matches(|c| c == '`' || c == '*')
        .replace('\\', "");
    if candidate.is_empty() || candidate.contains(char::is_whitespace) {
        return None;
    }

    if LANGUAGES.contains(&candidate.as_str()) {
        return Some(candidate);
    }

    let is_path_like = candidate
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '/' | '_' | '-'));
    if !is_path_like {
        return None;
    }

    let file_name = candidate.rsplit('/').next().unwrap_or(&candidate);
    match file_name {
        "Dockerfile" => return Some("dockerfile".to_string()),
        "Makefile" => return Some("makefile".to_string()),
        _ => {}
    }
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    language_for_extension(&ext.to_lowercase()).map(str::to_string)
}

/// Index of the hint line right before the end of `lines`, allowing one
/// blank line in between
///
/// The hint must stand alone: the line above it is blank or absent.
fn find_hint(lines: &[String]) -> Option<(usize, String)> {
    let mut idx = lines.len().checked_sub(1)?;
    if lines[idx].trim().is_empty() {
        idx = idx.checked_sub(1)?;
    }
    if lines[idx].trim().is_empty() {
        return None;
    }
    if idx > 0 && !lines[idx - 1].trim().is_empty() {
        return None;
    }
    language_hint(&lines[idx]).map(|lang| (idx, lang))
}

/// Folds a language or file path line into the fence that follows it
pub fn fold_fence_languages(markdown: &str) -> String {
    let mut result: Vec<String> = Vec::new();
    let mut open: Option<(char, usize)> = None;

    for line in markdown.split('\n') {
        if let Some((ch, len)) = open {
            if is_closing_fence(line, ch, len) {
                open = None;
            }
            result.push(line.to_string());
            continue;
        }

        let Some((ch, len, info)) = parse_fence(line) else {
            result.push(line.to_string());
            continue;
        };
        open = Some((ch, len));

        let info = info.trim();
        if let Some((idx, lang)) = find_hint(&result) {
            let tagged = info.split_whitespace().next().map(str::to_lowercase);
            if info.is_empty() {
                result.truncate(idx);
                let indent = &line[..line.len() - line.trim_start().len()];
                result.push(format!("{}{}{}", indent, ch.to_string().repeat(len), lang));
                continue;
            }
            if tagged.as_deref() == Some(lang.as_str()) {
                result.truncate(idx);
            }
        }
        result.push(line.to_string());
    }

    result.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_newlines_escaped() {
        let md = "[Title\n\nDescription](https://example.com)\nafter";
        assert_eq!(
            escape_link_newlines(md),
            "[Title\\\n\\\nDescription](https://example.com)\nafter"
        );
    }

    #[test]
    fn test_link_newlines_ignore_code_and_escapes() {
        let md = "`[` and \\[ text\nnext";
        assert_eq!(escape_link_newlines(md), md);

        let fenced = "```\n[open\n```\nafter";
        assert_eq!(escape_link_newlines(fenced), fenced);
    }

    #[test]
    fn test_nav_links_and_lines_removed() {
        let md = concat!(
            "[Skip to content](#main)\n\n",
            "# Guide\n\n",
            "Read the [docs](https://example.com/docs).\n\n",
            "## On this page\n\n",
            "Back to top\n\n",
            "- [Edit this page](https://github.com/x)\n\n",
            "End"
        );
        assert_eq!(
            remove_nav_phrases(md),
            "# Guide\n\nRead the [docs](https://example.com/docs).\n\nEnd"
        );
    }

    #[test]
    fn test_nav_phrases_inside_code_kept() {
        let md = "```\ncopy\n```";
        assert_eq!(remove_nav_phrases(md), md);
    }

    #[test]
    fn test_fold_language_line() {
        let md = "Example:\n\npython\n```\nprint(1)\n```";
        assert_eq!(
            fold_fence_languages(md),
            "Example:\n\n```python\nprint(1)\n```"
        );
    }

    #[test]
    fn test_fold_file_path_with_blank_line() {
        let md = "src/main.rs\n\n```\nfn main() {}\n```";
        assert_eq!(fold_fence_languages(md), "```rust\nfn main() {}\n```");
    }

    #[test]
    fn test_duplicate_language_dropped() {
        let md = "bash\n```bash\nls\n```";
        assert_eq!(fold_fence_languages(md), "```bash\nls\n```");
    }

    #[test]
    fn test_prose_line_not_folded() {
        let md = "Run this command:\n```\nls\n```";
        assert_eq!(fold_fence_languages(md), md);
    }

    #[test]
    fn test_prose_words_not_taken_as_language() {
        let md = "Output\n\nText\n```\nhello\n```";
        assert_eq!(fold_fence_languages(md), md);

        let md = "Plan for option\nc\n```\nx\n```";
        assert_eq!(fold_fence_languages(md), md);

        let md = "Said:\n\ntext\n```\nhello\n```";
        assert_eq!(fold_fence_languages(md), md);
    }

    #[test]
    fn test_hint_inside_paragraph_not_folded() {
        let md = "The snippet below is\nrust\n```\nfn f() {}\n```";
        assert_eq!(fold_fence_languages(md), md);
    }
}
