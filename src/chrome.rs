//! Singleton UI chrome elements
//!
//! Exit control, tooltip, telemetry readout and the blocking notice live
//! outside the scene graph. Each is keyed by kind and owner so that creating
//! one twice is a no-op and removing one that is already gone is harmless.

use std::collections::BTreeMap;

use egui::Pos2;

use crate::overlay::OverlayId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChromeKind {
    ExitControl,
    Tooltip,
    Readout,
    Notice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChromeKey {
    pub kind: ChromeKind,
    pub owner: Option<OverlayId>,
}

impl ChromeKey {
    pub const EXIT: ChromeKey = ChromeKey {
        kind: ChromeKind::ExitControl,
        owner: None,
    };

    pub const NOTICE: ChromeKey = ChromeKey {
        kind: ChromeKind::Notice,
        owner: None,
    };

    pub fn tooltip(owner: OverlayId) -> Self {
        Self {
            kind: ChromeKind::Tooltip,
            owner: Some(owner),
        }
    }

    pub fn readout(owner: OverlayId) -> Self {
        Self {
            kind: ChromeKind::Readout,
            owner: Some(owner),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChromeElement {
    pub lines: Vec<String>,
    /// Screen anchor; `None` means the element's default corner
    pub anchor: Option<Pos2>,
    pub visible: bool,
}

#[derive(Debug, Default)]
pub struct Chrome {
    elements: BTreeMap<ChromeKey, ChromeElement>,
}

impl Chrome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the element if absent; returns `true` when it was created
    pub fn ensure(&mut self, key: ChromeKey, visible: bool) -> bool {
        if self.elements.contains_key(&key) {
            return false;
        }
        self.elements.insert(
            key,
            ChromeElement {
                visible,
                ..ChromeElement::default()
            },
        );
        true
    }

    /// Returns `true` if the element existed
    pub fn remove(&mut self, key: ChromeKey) -> bool {
        self.elements.remove(&key).is_some()
    }

    pub fn contains(&self, key: ChromeKey) -> bool {
        self.elements.contains_key(&key)
    }

    pub fn get(&self, key: ChromeKey) -> Option<&ChromeElement> {
        self.elements.get(&key)
    }

    /// Replace the text of an existing element; absent elements are ignored
    pub fn set_lines(&mut self, key: ChromeKey, lines: Vec<String>) {
        if let Some(element) = self.elements.get_mut(&key) {
            element.lines = lines;
        }
    }

    pub fn set_text(&mut self, key: ChromeKey, text: impl Into<String>) {
        self.set_lines(key, vec![text.into()]);
    }

    pub fn show_at(&mut self, key: ChromeKey, anchor: Pos2) {
        if let Some(element) = self.elements.get_mut(&key) {
            element.anchor = Some(anchor);
            element.visible = true;
        }
    }

    pub fn hide(&mut self, key: ChromeKey) {
        if let Some(element) = self.elements.get_mut(&key) {
            element.visible = false;
            element.lines.clear();
        }
    }

    pub fn owned_by(&self, owner: OverlayId) -> impl Iterator<Item = ChromeKey> + '_ {
        self.elements
            .keys()
            .copied()
            .filter(move |k| k.owner == Some(owner))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChromeKey, &ChromeElement)> {
        self.elements.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_is_singleton() {
        let mut chrome = Chrome::new();
        assert!(chrome.ensure(ChromeKey::EXIT, true));
        assert!(!chrome.ensure(ChromeKey::EXIT, true));
        assert_eq!(chrome.len(), 1);
    }

    #[test]
    fn test_remove_twice_is_harmless() {
        let mut chrome = Chrome::new();
        chrome.ensure(ChromeKey::readout(OverlayId::Dna), true);
        assert!(chrome.remove(ChromeKey::readout(OverlayId::Dna)));
        assert!(!chrome.remove(ChromeKey::readout(OverlayId::Dna)));
        assert!(chrome.is_empty());
    }

    #[test]
    fn test_tooltip_show_and_hide() {
        let mut chrome = Chrome::new();
        let key = ChromeKey::tooltip(OverlayId::Dna);
        chrome.ensure(key, false);
        chrome.set_text(key, "A - SYSCALL");
        chrome.show_at(key, Pos2::new(10.0, 20.0));

        let element = chrome.get(key).unwrap();
        assert!(element.visible);
        assert_eq!(element.anchor, Some(Pos2::new(10.0, 20.0)));

        chrome.hide(key);
        let element = chrome.get(key).unwrap();
        assert!(!element.visible);
        assert!(element.lines.is_empty());
    }

    #[test]
    fn test_owned_by_filters_owner() {
        let mut chrome = Chrome::new();
        chrome.ensure(ChromeKey::EXIT, true);
        chrome.ensure(ChromeKey::readout(OverlayId::Dna), true);
        chrome.ensure(ChromeKey::tooltip(OverlayId::Dna), false);
        chrome.ensure(ChromeKey::readout(OverlayId::Network), true);
        assert_eq!(chrome.owned_by(OverlayId::Dna).count(), 2);
    }
}
