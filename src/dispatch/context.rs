//! Read access to whatever the display is currently showing.

use std::sync::{Mutex, PoisonError};

/// The item on the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub reference: String,
    pub text: String,
}

impl ContentItem {
    pub fn new(reference: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            text: text.into(),
        }
    }
}

/// Navigation over the displayed content. Owned by the host application.
pub trait ContentContext: Send + Sync {
    fn current_item(&self) -> Option<ContentItem>;
    fn advance(&self);
    fn retreat(&self);
}

/// Fixed list of items with a cursor. Used by the CLI and tests.
#[derive(Debug, Default)]
pub struct StaticContent {
    items: Vec<ContentItem>,
    cursor: Mutex<usize>,
}

impl StaticContent {
    pub fn new(items: Vec<ContentItem>) -> Self {
        Self {
            items,
            cursor: Mutex::new(0),
        }
    }

    fn cursor(&self) -> std::sync::MutexGuard<'_, usize> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn position(&self) -> usize {
        *self.cursor()
    }
}

impl ContentContext for StaticContent {
    fn current_item(&self) -> Option<ContentItem> {
        self.items.get(*self.cursor()).cloned()
    }

    fn advance(&self) {
        if self.items.is_empty() {
            return;
        }
        let mut cursor = self.cursor();
        *cursor = (*cursor + 1) % self.items.len();
    }

    fn retreat(&self) {
        if self.items.is_empty() {
            return;
        }
        let mut cursor = self.cursor();
        *cursor = (*cursor + self.items.len() - 1) % self.items.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> StaticContent {
        StaticContent::new(vec![
            ContentItem::new("John 3:16", "For God so loved the world"),
            ContentItem::new("Psalm 23:1", "The Lord is my shepherd"),
        ])
    }

    #[test]
    fn test_advance_and_retreat_wrap() {
        let content = content();
        content.advance();
        assert_eq!(content.current_item().unwrap().reference, "Psalm 23:1");
        content.advance();
        assert_eq!(content.position(), 0);
        content.retreat();
        assert_eq!(content.current_item().unwrap().reference, "Psalm 23:1");
    }

    #[test]
    fn test_empty_content_has_no_item() {
        let content = StaticContent::default();
        content.advance();
        content.retreat();
        assert_eq!(content.current_item(), None);
    }
}
