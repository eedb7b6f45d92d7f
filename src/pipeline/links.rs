//! Hierarchical view of a page's links

use serde::Serialize;
use url::Url;

/// One path segment of a link tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkNode {
    /// Path segment; the root carries the origin
    pub name: String,
    /// Set when a link points exactly at this node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LinkNode>,
}

impl LinkNode {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            children: Vec::new(),
        }
    }

    fn child(&mut self, name: &str) -> &mut LinkNode {
        let index = match self.children.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                self.children.push(LinkNode::new(name));
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    /// Number of nodes that carry a URL
    pub fn link_count(&self) -> usize {
        usize::from(self.url.is_some())
            + self.children.iter().map(LinkNode::link_count).sum::<usize>()
    }
}

/// Builds a tree of the links on `root`'s origin, keyed by path segment
///
/// Links on other origins are left out. Query strings stay part of the leaf
/// URL but do not add segments.
pub fn build_link_tree(root: &Url, links: &[String]) -> LinkNode {
    let origin = root.origin().ascii_serialization();
    let mut tree = LinkNode::new(origin.clone());

    for link in links {
        let Ok(url) = Url::parse(link) else {
            continue;
        };
        if url.origin().ascii_serialization() != origin {
            continue;
        }

        let mut node = &mut tree;
        for segment in url.path().split('/').filter(|s| !s.is_empty()) {
            node = node.child(segment);
        }
        if node.url.is_none() {
            node.url = Some(link.clone());
        }
    }

    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_groups_by_path() {
        let root = Url::parse("https://example.com/docs").unwrap();
        let links = vec![
            "https://example.com/".to_string(),
            "https://example.com/docs/intro".to_string(),
            "https://example.com/docs/guide/setup".to_string(),
            "https://example.com/blog".to_string(),
            "https://other.example.org/x".to_string(),
        ];

        let tree = build_link_tree(&root, &links);

        assert_eq!(tree.name, "https://example.com");
        assert_eq!(tree.url.as_deref(), Some("https://example.com/"));
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].name, "docs");
        assert!(tree.children[0].url.is_none());
        assert_eq!(tree.children[0].children[1].children[0].name, "setup");
        assert_eq!(tree.link_count(), 4);
    }

    #[test]
    fn test_first_url_wins_for_same_path() {
        let root = Url::parse("https://example.com/").unwrap();
        let links = vec![
            "https://example.com/a?x=1".to_string(),
            "https://example.com/a?x=2".to_string(),
        ];
        let tree = build_link_tree(&root, &links);
        assert_eq!(tree.children[0].url.as_deref(), Some("https://example.com/a?x=1"));
    }
}
