//! Code spans and fenced blocks
//!
//! Code is rendered from the raw text of the parsed document, never from
//! converted child markdown, so nothing inside it gets escaped. A rewriter
//! pass numbers every `pre` and `code` element in document order; the
//! conversion handlers look their rendering up by that number.

use super::{ConvertError, MarkdownOptions, MAX_DEPTH};
use crate::clean::{rewrite, ElementHandler, HandlerResult};
use ego_tree::iter::Edge;
use lol_html::html_content::Element;
use scraper::{ElementRef, Html, Node, Selector};
use std::cell::Cell;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Attribute carrying the index of a `pre` block
pub(crate) const BLOCK_ATTR: &str = "data-md-block";
/// Attribute carrying the index of a `code` span
pub(crate) const SPAN_ATTR: &str = "data-md-span";

static PRE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("pre").expect("valid pre selector"));
static CODE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("code").expect("valid code selector"));

/// Markdown for every code element of a document, in document order
#[derive(Debug, Default)]
pub(crate) struct CodeRenderings {
    pub blocks: Vec<String>,
    pub spans: Vec<String>,
}

/// A document ready for conversion
pub(crate) struct Prepared {
    pub html: String,
    pub code: CodeRenderings,
}

/// Checks nesting, renders code and numbers the code elements
pub(crate) fn prepare(html: &str, options: &MarkdownOptions) -> Result<Prepared, ConvertError> {
    let document = Html::parse_document(html);
    check_depth(&document)?;

    let code = CodeRenderings {
        blocks: document
            .select(&PRE)
            .map(|pre| code_block(pre, options))
            .collect(),
        spans: document
            .select(&CODE)
            .map(|code| inline_code(&code.text().collect::<String>()))
            .collect(),
    };

    let marker = CodeMarker::default();
    let element_handlers: [&dyn ElementHandler; 1] = [&marker];
    let html = rewrite(html, &element_handlers, &[])?;
    Ok(Prepared { html, code })
}

fn check_depth(document: &Html) -> Result<(), ConvertError> {
    let mut depth = 0usize;
    for edge in document.tree.root().traverse() {
        match edge {
            Edge::Open(_) => {
                depth += 1;
                if depth > MAX_DEPTH {
                    return Err(ConvertError::TooDeep(MAX_DEPTH));
                }
            }
            Edge::Close(_) => depth = depth.saturating_sub(1),
        }
    }
    Ok(())
}

/// Numbers `pre` and `code` elements as the rewriter meets them
#[derive(Default)]
struct CodeMarker {
    blocks: Cell<usize>,
    spans: Cell<usize>,
}

impl CodeMarker {
    fn next(counter: &Cell<usize>) -> String {
        let n = counter.get();
        counter.set(n + 1);
        n.to_string()
    }
}

impl ElementHandler for CodeMarker {
    fn selectors(&self) -> Vec<String> {
        vec!["pre".to_string(), "code".to_string()]
    }

    fn handle_element(&self, element: &mut Element<'_, '_>) -> HandlerResult {
        if element.tag_name().eq_ignore_ascii_case("pre") {
            element.set_attribute(BLOCK_ATTR, &Self::next(&self.blocks))?;
        } else {
            element.set_attribute(SPAN_ATTR, &Self::next(&self.spans))?;
        }
        Ok(())
    }
}

/// Fenced block for a `pre` element
///
/// The fence is longer than any run of the fence character inside the code.
/// The language comes from a `language-xxx` or `lang-xxx` class on the inner
/// `code` element, then on the `pre` itself.
fn code_block(pre: ElementRef<'_>, options: &MarkdownOptions) -> String {
    let code_child = pre
        .children()
        .filter_map(ElementRef::wrap)
        .find(|child| child.value().name() == "code");

    let code = text_content(code_child.unwrap_or(pre));
    let language = code_child
        .and_then(language_from_classes)
        .or_else(|| language_from_classes(pre))
        .unwrap_or_default();

    let fence_char = options.fence.chars().next().unwrap_or('`');
    let fence_len = options
        .fence
        .chars()
        .count()
        .max(3)
        .max(longest_run(&code, fence_char) + 1);
    let fence = fence_char.to_string().repeat(fence_len);
    let body = code.strip_suffix('\n').unwrap_or(&code);

    format!("{fence}{language}\n{body}\n{fence}")
}

/// Concatenated text of a subtree; `<br>` becomes a newline
fn text_content(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if el.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out
}

fn language_from_classes(element: ElementRef<'_>) -> Option<String> {
    element.value().classes().find_map(|class| {
        class
            .strip_prefix("language-")
            .or_else(|| class.strip_prefix("lang-"))
            .filter(|lang| !lang.is_empty())
            .map(str::to_string)
    })
}

/// Length of the longest run of `ch` in `text`
fn longest_run(text: &str, ch: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == ch {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Renders an inline code span
///
/// Newlines collapse to spaces. The delimiter is the shortest backtick run
/// that does not occur in the content, and a space pads content that starts
/// or ends with a backtick.
pub(crate) fn inline_code(content: &str) -> String {
    let content = content.replace("\r\n", " ").replace(['\n', '\r'], " ");

    let mut runs = HashSet::new();
    let mut current = 0;
    for c in content.chars() {
        if c == '`' {
            current += 1;
        } else if current > 0 {
            runs.insert(current);
            current = 0;
        }
    }
    if current > 0 {
        runs.insert(current);
    }

    let mut len = 1;
    while runs.contains(&len) {
        len += 1;
    }
    let delimiter = "`".repeat(len);
    let pad = if content.starts_with('`') || content.ends_with('`') {
        " "
    } else {
        ""
    };
    format!("{delimiter}{pad}{content}{pad}{delimiter}")
}
