use super::{ElementHandler, HandlerResult};
use lol_html::html_content::Element;

/// Removes every element matching one of its selectors, descendants included
#[derive(Debug, Clone)]
pub struct TagFilterHandler {
    selectors: Vec<String>,
}

impl TagFilterHandler {
    pub fn new(selectors: Vec<String>) -> Self {
        Self { selectors }
    }
}

impl ElementHandler for TagFilterHandler {
    fn selectors(&self) -> Vec<String> {
        self.selectors.clone()
    }

    fn handle_element(&self, element: &mut Element<'_, '_>) -> HandlerResult {
        element.remove();
        Ok(())
    }
}
