//! HTML to markdown conversion
//!
//! The cleaned page is converted with `htmd`. Custom handlers own the rules
//! this service cares about: code spans and fences, heading style, emphasis
//! delimiters and task-list checkboxes. The rendered text then goes through
//! three post-processors: newline escaping inside link spans,
//! navigation-phrase removal and fence language folding.

mod code;
mod postprocess;

pub use postprocess::{escape_link_newlines, fold_fence_languages, remove_nav_phrases};

use code::{CodeRenderings, Prepared, BLOCK_ATTR, SPAN_ATTR};
use htmd::options::{BulletListMarker, Options};
use htmd::{Element, HtmlToMarkdown};
use thiserror::Error;

/// Nesting beyond this depth aborts the conversion
pub const MAX_DEPTH: usize = 256;

/// Elements whose content never reaches the output
const SKIPPED: &[&str] = &[
    "head", "script", "style", "noscript", "template", "meta", "link", "title", "svg", "canvas",
    "iframe", "object", "embed", "select", "textarea", "button",
];

/// Errors raised during conversion
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Document nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("Failed to prepare code blocks: {0}")]
    Prepare(#[from] crate::clean::CleanError),

    #[error("Markdown rendering failed: {0}")]
    Render(String),
}

/// Heading syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadingStyle {
    /// `# Heading`
    #[default]
    Atx,
    /// Underlined with `===` / `---` for levels 1 and 2
    Setext,
}

/// Output delimiters
#[derive(Debug, Clone)]
pub struct MarkdownOptions {
    pub bullet_marker: String,
    pub em_delimiter: String,
    pub strong_delimiter: String,
    pub fence: String,
    pub heading_style: HeadingStyle,
    pub horizontal_rule: String,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            bullet_marker: "-".to_string(),
            em_delimiter: "_".to_string(),
            strong_delimiter: "**".to_string(),
            fence: "```".to_string(),
            heading_style: HeadingStyle::Atx,
            horizontal_rule: "---".to_string(),
        }
    }
}

/// Converts cleaned HTML to markdown
#[derive(Debug, Clone, Default)]
pub struct MarkdownConverter {
    options: MarkdownOptions,
}

impl MarkdownConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: MarkdownOptions) -> Self {
        Self { options }
    }

    /// Converts `html`, reporting failures
    pub fn try_convert(&self, html: &str) -> Result<String, ConvertError> {
        let Prepared { html, code } = code::prepare(html, &self.options)?;
        let rendered = self
            .build(code)
            .convert(&html)
            .map_err(|e| ConvertError::Render(e.to_string()))?;
        let escaped = escape_link_newlines(&rendered);
        let cleaned = remove_nav_phrases(&escaped);
        Ok(fold_fence_languages(&cleaned))
    }

    /// Assembles an `htmd` converter around this document's code renderings
    fn build(&self, code: CodeRenderings) -> HtmlToMarkdown {
        let CodeRenderings { blocks, spans } = code;
        let options = &self.options;
        let bullet_list_marker = if options.bullet_marker == "*" {
            BulletListMarker::Asterisk
        } else {
            BulletListMarker::Dash
        };
        let heading_style = options.heading_style;
        let strong = options.strong_delimiter.clone();
        let em = options.em_delimiter.clone();
        let rule = options.horizontal_rule.clone();

        HtmlToMarkdown::builder()
            .options(Options {
                bullet_list_marker,
                ..Options::default()
            })
            .skip_tags(SKIPPED.to_vec())
            .add_handler(vec!["pre"], move |element: Element| {
                let block = lookup(&element, BLOCK_ATTR, &blocks).unwrap_or(element.content);
                Some(format!("\n\n{}\n\n", block))
            })
            .add_handler(vec!["code"], move |element: Element| {
                Some(match lookup(&element, SPAN_ATTR, &spans) {
                    Some(span) => span.to_string(),
                    None => code::inline_code(element.content),
                })
            })
            .add_handler(
                vec!["h1", "h2", "h3", "h4", "h5", "h6"],
                move |element: Element| {
                    let level = element
                        .tag
                        .get(1..)
                        .and_then(|n| n.parse().ok())
                        .unwrap_or(1);
                    Some(heading(element.content, level, heading_style))
                },
            )
            .add_handler(vec!["strong", "b"], move |element: Element| {
                Some(wrap(element.content, &strong))
            })
            .add_handler(vec!["em", "i"], move |element: Element| {
                Some(wrap(element.content, &em))
            })
            .add_handler(vec!["del", "s", "strike"], |element: Element| {
                Some(wrap(element.content, "~~"))
            })
            .add_handler(vec!["hr"], move |_: Element| {
                Some(format!("\n\n{}\n\n", rule))
            })
            .add_handler(vec!["input"], |element: Element| {
                let checkbox = attr(&element, "type")
                    .map(|t| t.eq_ignore_ascii_case("checkbox"))
                    .unwrap_or(false);
                Some(match (checkbox, attr(&element, "checked")) {
                    (false, _) => String::new(),
                    (true, Some(_)) => "[x]".to_string(),
                    (true, None) => "[ ]".to_string(),
                })
            })
            .build()
    }

    /// Converts `html`; a failure yields a note instead of an error
    pub fn convert(&self, html: &str) -> String {
        match self.try_convert(html) {
            Ok(markdown) => markdown,
            Err(e) => {
                tracing::warn!(error = %e, "Markdown conversion failed");
                format!("Markdown conversion failed: {}", e)
            }
        }
    }
}

fn attr<'a>(element: &Element<'a>, name: &str) -> Option<&'a str> {
    element
        .attrs
        .iter()
        .find(|a| &*a.name.local == name)
        .map(|a| &*a.value)
}

/// Rendering recorded for an element numbered by the code pass
fn lookup<'r>(element: &Element<'_>, attr_name: &str, renderings: &'r [String]) -> Option<&'r str> {
    attr(element, attr_name)
        .and_then(|index| index.parse::<usize>().ok())
        .and_then(|index| renderings.get(index))
        .map(String::as_str)
}

fn heading(content: &str, level: usize, style: HeadingStyle) -> String {
    let text = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return String::new();
    }

    let body = match (style, level) {
        (HeadingStyle::Setext, 1 | 2) => {
            let underline = if level == 1 { "=" } else { "-" };
            format!("{}\n{}", text, underline.repeat(text.chars().count().max(3)))
        }
        _ => format!("{} {}", "#".repeat(level.clamp(1, 6)), text),
    };
    format!("\n\n{}\n\n", body)
}

/// Wraps inline content, keeping flanking whitespace outside the delimiters
fn wrap(content: &str, delimiter: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return content.to_string();
    }
    let lead = if content.starts_with(char::is_whitespace) { " " } else { "" };
    let trail = if content.ends_with(char::is_whitespace) { " " } else { "" };
    format!("{lead}{delimiter}{trimmed}{delimiter}{trail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md(html: &str) -> String {
        MarkdownConverter::new().convert(html)
    }

    #[test]
    fn test_heading_and_inline_code() {
        assert_eq!(
            md("<article><h1>Title</h1><p>Hello <code>world()</code></p></article>"),
            "# Title\n\nHello `world()`"
        );
    }

    #[test]
    fn test_emphasis_with_flanking_space() {
        let out = md("<p>a<strong> bold </strong>b <em>it</em></p>");
        assert!(out.contains("**bold**"), "{}", out);
        assert!(out.contains("_it_"), "{}", out);
        assert!(!out.contains("** bold"), "{}", out);
    }

    #[test]
    fn test_links_and_images() {
        let out = md(r#"<p><a href="https://example.com/x">Ex</a> <img src="/i.png" alt="pic"></p>"#);
        assert!(out.contains("[Ex](https://example.com/x)"), "{}", out);
        assert!(out.contains("![pic](/i.png)"), "{}", out);
    }

    #[test]
    fn test_code_block_with_language() {
        assert_eq!(
            md("<pre><code class=\"language-rust\">fn main() {}\n</code></pre>"),
            "```rust\nfn main() {}\n```"
        );
    }

    #[test]
    fn test_code_block_fence_longer_than_content() {
        assert_eq!(
            md("<pre><code>```\ninner\n```</code></pre>"),
            "````\n```\ninner\n```\n````"
        );
    }

    #[test]
    fn test_code_text_is_not_escaped() {
        let out = md("<p>Call <code>snake_case(*ptr)</code></p><pre>a_b * [c]</pre>");
        assert!(out.contains("`snake_case(*ptr)`"), "{}", out);
        assert!(out.contains("```\na_b * [c]\n```"), "{}", out);
    }

    #[test]
    fn test_lists_use_bullet_marker() {
        let out = md("<ul><li>one</li><li>two</li></ul>");
        assert!(out.contains("- one"), "{}", out);

        let converter = MarkdownConverter::with_options(MarkdownOptions {
            bullet_marker: "*".to_string(),
            ..MarkdownOptions::default()
        });
        assert!(converter.convert("<ul><li>one</li></ul>").contains("* one"));
    }

    #[test]
    fn test_line_rule_and_custom_delimiters() {
        let converter = MarkdownConverter::with_options(MarkdownOptions {
            strong_delimiter: "__".to_string(),
            em_delimiter: "*".to_string(),
            horizontal_rule: "***".to_string(),
            ..MarkdownOptions::default()
        });
        let out = converter.convert("<p><b>x</b> <i>y</i></p><hr><p>c</p>");
        assert_eq!(out, "__x__ *y*\n\n***\n\nc");
    }

    #[test]
    fn test_setext_headings() {
        let converter = MarkdownConverter::with_options(MarkdownOptions {
            heading_style: HeadingStyle::Setext,
            ..MarkdownOptions::default()
        });
        assert_eq!(
            converter.convert("<h1>Title</h1><h2>Section one</h2><h3>Sub</h3>"),
            "Title\n=====\n\nSection one\n-----------\n\n### Sub"
        );
    }

    #[test]
    fn test_task_list_checkboxes() {
        let out = md(r#"<ul><li><input type="checkbox" checked> done</li><li><input type="checkbox"> todo</li></ul>"#);
        assert!(out.contains("[x]"), "{}", out);
        assert!(out.contains("[ ]"), "{}", out);
        assert!(out.contains("todo"), "{}", out);
    }

    #[test]
    fn test_skipped_elements() {
        assert_eq!(
            md("<p>keep</p><button>Click</button><svg><text>x</text></svg>"),
            "keep"
        );
    }

    #[test]
    fn test_excessive_nesting_degrades() {
        let html = format!("{}x{}", "<div>".repeat(MAX_DEPTH + 10), "</div>".repeat(MAX_DEPTH + 10));
        let converter = MarkdownConverter::new();
        assert!(converter.try_convert(&html).is_err());
        assert!(converter.convert(&html).starts_with("Markdown conversion failed"));
    }
}
