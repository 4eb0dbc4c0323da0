//! Identity-scoped header UI flags (search sheet, category menu, profile menu).

use std::sync::Arc;

use tokio::sync::watch;

/// Which header overlays are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderState {
    pub search_open: bool,
    pub menu_open: bool,
    pub profile_menu_open: bool,
}

/// Publishes [`HeaderState`] to the view layer.
#[derive(Clone)]
pub struct HeaderUi {
    tx: Arc<watch::Sender<HeaderState>>,
}

impl Default for HeaderUi {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderUi {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(HeaderState::default());
        Self { tx: Arc::new(tx) }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HeaderState> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> HeaderState {
        *self.tx.borrow()
    }

    pub fn set_search_open(&self, open: bool) {
        self.update(|s| s.search_open = open);
    }

    pub fn set_menu_open(&self, open: bool) {
        self.update(|s| s.menu_open = open);
    }

    pub fn set_profile_menu_open(&self, open: bool) {
        self.update(|s| s.profile_menu_open = open);
    }

    /// Close everything.
    pub fn clear(&self) {
        self.update(|s| *s = HeaderState::default());
    }

    fn update(&self, f: impl FnOnce(&mut HeaderState)) {
        self.tx.send_if_modified(|state| {
            let before = *state;
            f(state);
            *state != before
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_closes_all_overlays() {
        let header = HeaderUi::new();
        header.set_search_open(true);
        header.set_menu_open(true);
        header.set_profile_menu_open(true);
        assert!(header.current().search_open);

        header.clear();
        assert_eq!(header.current(), HeaderState::default());
    }

    #[test]
    fn test_unchanged_update_does_not_notify() {
        let header = HeaderUi::new();
        let rx = header.subscribe();
        header.set_menu_open(false);
        assert_eq!(rx.has_changed().ok(), Some(false));
    }
}
