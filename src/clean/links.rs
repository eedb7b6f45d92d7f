//! Link rewriting and collection handlers

use html_escape::decode_html_entities;
use super::{ElementHandler, HandlerResult};
use crate::url::{is_fragment_only, normalize_url};
use lol_html::html_content::Element;
use std::cell::RefCell;
use std::collections::HashSet;
use url::Url;

/// Rewrites `href`, `src` and `srcset` values to absolute URLs
///
/// Anchors pointing only at a fragment of the same page are demoted to inert
/// markup: the `href` goes away, `role="presentation"` is added and the text
/// stays.
#[derive(Debug, Clone)]
pub struct LinkNormalizeHandler {
    base: Url,
}

impl LinkNormalizeHandler {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    fn absolutize(&self, raw: &str) -> String {
        normalize_url(&decode_html_entities(raw), &self.base, false)
    }

    fn absolutize_srcset(&self, raw: &str) -> String {
        raw.split(',')
            .map(|candidate| {
                let candidate = candidate.trim();
                match candidate.split_once(char::is_whitespace) {
                    Some((url, descriptor)) => {
                        format!("{} {}", self.absolutize(url), descriptor.trim())
                    }
                    None => self.absolutize(candidate),
                }
            })
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl ElementHandler for LinkNormalizeHandler {
    fn selectors(&self) -> Vec<String> {
        vec![
            "[href]".to_string(),
            "[src]".to_string(),
            "[srcset]".to_string(),
        ]
    }

    fn handle_element(&self, element: &mut Element<'_, '_>) -> HandlerResult {
        if let Some(href) = element.get_attribute("href") {
            if is_fragment_only(&href) {
                element.remove_attribute("href");
                if element.tag_name() == "a" {
                    element.set_attribute("role", "presentation")?;
                }
            } else {
                element.set_attribute("href", &self.absolutize(&href))?;
            }
        }

        if let Some(src) = element.get_attribute("src") {
            element.set_attribute("src", &self.absolutize(&src))?;
        }

        if let Some(srcset) = element.get_attribute("srcset") {
            element.set_attribute("srcset", &self.absolutize_srcset(&srcset))?;
        }

        Ok(())
    }
}

/// Collects absolute http(s) anchor targets in document order, deduplicated
#[derive(Debug)]
pub struct LinkCollector {
    base: Url,
    state: RefCell<CollectedLinks>,
}

#[derive(Debug, Default)]
struct CollectedLinks {
    seen: HashSet<String>,
    links: Vec<String>,
}

impl LinkCollector {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            state: RefCell::new(CollectedLinks::default()),
        }
    }

    pub fn into_links(self) -> Vec<String> {
        self.state.into_inner().links
    }
}

impl ElementHandler for LinkCollector {
    fn selectors(&self) -> Vec<String> {
        vec!["a[href]".to_string()]
    }

    fn handle_element(&self, element: &mut Element<'_, '_>) -> HandlerResult {
        let Some(href) = element.get_attribute("href") else {
            return Ok(());
        };
        if is_fragment_only(&href) {
            return Ok(());
        }

        let absolute = normalize_url(&decode_html_entities(&href), &self.base, true);
        let is_web = Url::parse(&absolute)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !is_web {
            return Ok(());
        }

        let mut state = self.state.borrow_mut();
        if state.seen.insert(absolute.clone()) {
            state.links.push(absolute);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srcset_candidates_absolutized() {
        let handler = LinkNormalizeHandler::new(Url::parse("https://example.com/a/").unwrap());
        assert_eq!(
            handler.absolutize_srcset("img-1x.png 1x, /img-2x.png 2x"),
            "https://example.com/a/img-1x.png 1x, https://example.com/img-2x.png 2x"
        );
    }

    #[test]
    fn test_encoded_ampersand_decoded_before_join() {
        let handler = LinkNormalizeHandler::new(Url::parse("https://example.com/").unwrap());
        assert_eq!(
            handler.absolutize("/search?a=1&amp;b=2"),
            "https://example.com/search?a=1&b=2"
        );
    }
}
