//! Layout state tracking
//!
//! Keeps the ordered list of installed layouts and which one is active.
//! Switching goes through a system adapter; the state only advances when
//! the adapter reports success. Observers hear about every change.

use anyhow::Result;
use log::{debug, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};

use super::compat;

/// System side of layout switching
pub trait LayoutAdapter: Send + Sync {
    /// Switch to the next layout. Ok(false) means the system refused.
    fn switch_layout(&self) -> Result<bool>;
    /// Layouts currently configured on the system, in switch order
    fn layouts(&self) -> Result<Vec<String>>;
}

/// Layout change subscriber
pub trait LayoutObserver: Send + Sync {
    fn layout_changed(&self, old: &str, new: &str) -> Result<()>;
}

/// Snapshot of the layout state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutState {
    /// Ordered, unique
    pub available: Vec<String>,
    pub current: Option<String>,
}

impl LayoutState {
    fn next_after_current(&self) -> Option<String> {
        if self.available.is_empty() {
            return None;
        }
        let index = self
            .current
            .as_ref()
            .and_then(|c| self.available.iter().position(|l| l == c))
            .map(|i| (i + 1) % self.available.len())
            .unwrap_or(0);
        Some(self.available[index].clone())
    }
}

pub struct LayoutManager {
    adapter: Box<dyn LayoutAdapter>,
    state: Mutex<LayoutState>,
    observers: Mutex<Vec<Box<dyn LayoutObserver>>>,
}

impl LayoutManager {
    pub fn new(adapter: Box<dyn LayoutAdapter>, available: Vec<String>) -> Self {
        let manager = Self {
            adapter,
            state: Mutex::new(LayoutState::default()),
            observers: Mutex::new(Vec::new()),
        };
        manager.set_available(available);
        manager
    }

    fn lock_state(&self) -> MutexGuard<'_, LayoutState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self, observer: Box<dyn LayoutObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub fn state(&self) -> LayoutState {
        self.lock_state().clone()
    }

    pub fn current(&self) -> Option<String> {
        self.lock_state().current.clone()
    }

    pub fn available(&self) -> Vec<String> {
        self.lock_state().available.clone()
    }

    /// Replace the layout list (deduplicated, order kept).
    ///
    /// The current layout survives if still present, otherwise the first entry becomes current.
    pub fn set_available(&self, layouts: Vec<String>) {
        let mut unique: Vec<String> = Vec::with_capacity(layouts.len());
        for layout in layouts {
            let layout = layout.trim().to_string();
            if !layout.is_empty() && !unique.contains(&layout) {
                unique.push(layout);
            }
        }

        let mut state = self.lock_state();
        if state.available == unique {
            return;
        }
        let current = state
            .current
            .clone()
            .filter(|c| unique.contains(c))
            .or_else(|| unique.first().cloned());
        info!("Layouts: {:?} (current: {:?})", unique, current);
        state.available = unique;
        state.current = current;
    }

    /// Record the active layout without switching (e.g. learned from the system)
    pub fn set_current(&self, layout: &str) -> bool {
        let mut state = self.lock_state();
        if !state.available.iter().any(|l| l == layout) {
            return false;
        }
        state.current = Some(layout.to_string());
        true
    }

    /// Refresh the layout list from the adapter
    pub fn refresh(&self) -> Result<()> {
        let layouts = self.adapter.layouts()?;
        if !layouts.is_empty() {
            self.set_available(layouts);
        }
        Ok(())
    }

    /// Switch to the next layout. Returns false if the adapter failed or refused.
    pub fn switch(&self) -> bool {
        // Adapter may run a subprocess or press keys: no lock held
        let switched = match self.adapter.switch_layout() {
            Ok(switched) => switched,
            Err(e) => {
                warn!("Layout switch failed: {}", e);
                false
            }
        };
        if !switched {
            return false;
        }
        self.advance();
        true
    }

    /// Record a switch the user made outside relayout (e.g. with the
    /// desktop's own combo). Returns the new current layout.
    pub fn note_switched(&self) -> Option<String> {
        self.advance()
    }

    fn advance(&self) -> Option<String> {
        let (old, new) = {
            let mut state = self.lock_state();
            let next = state.next_after_current()?;
            let old = state.current.replace(next.clone()).unwrap_or_default();
            (old, next)
        };

        debug!("Layout switched: {} -> {}", old, new);
        self.notify(&old, &new);
        Some(new)
    }

    /// Switch until a layout compatible with `target` is active.
    ///
    /// Cycles at most once through the list. Returns false if no compatible
    /// layout is installed or a switch failed.
    pub fn switch_to(&self, target: &str) -> bool {
        let state = self.state();
        let Some(wanted) = compat::find_compatible_layout(target, &state.available) else {
            warn!("No installed layout compatible with '{}'", target);
            return false;
        };

        for _ in 0..state.available.len() {
            if self.current().as_deref() == Some(wanted.as_str()) {
                return true;
            }
            if !self.switch() {
                return false;
            }
        }
        self.current().as_deref() == Some(wanted.as_str())
    }

    fn notify(&self, old: &str, new: &str) {
        let observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        for observer in observers.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer.layout_changed(old, new)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Layout observer failed: {}", e),
                Err(_) => warn!("Layout observer panicked"),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Adapter whose switch outcome and call count are observable
    #[derive(Clone, Default)]
    pub struct FakeAdapter {
        pub switches: Arc<AtomicUsize>,
        pub refuse: Arc<AtomicBool>,
        pub layouts: Vec<String>,
    }

    impl LayoutAdapter for FakeAdapter {
        fn switch_layout(&self) -> Result<bool> {
            if self.refuse.load(Ordering::SeqCst) {
                return Ok(false);
            }
            self.switches.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        fn layouts(&self) -> Result<Vec<String>> {
            Ok(self.layouts.clone())
        }
    }

    struct Recorder(Arc<Mutex<Vec<(String, String)>>>);

    impl LayoutObserver for Recorder {
        fn layout_changed(&self, old: &str, new: &str) -> Result<()> {
            self.0.lock().unwrap().push((old.to_string(), new.to_string()));
            Ok(())
        }
    }

    struct Failing;

    impl LayoutObserver for Failing {
        fn layout_changed(&self, _old: &str, _new: &str) -> Result<()> {
            Err(anyhow!("observer broke"))
        }
    }

    struct Panicking;

    impl LayoutObserver for Panicking {
        fn layout_changed(&self, _old: &str, _new: &str) -> Result<()> {
            panic!("observer panicked");
        }
    }

    fn layouts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_switch_wraps_and_notifies() {
        let manager = LayoutManager::new(Box::new(FakeAdapter::default()), layouts(&["en", "ru", "ua"]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        manager.subscribe(Box::new(Failing));
        manager.subscribe(Box::new(Panicking));
        manager.subscribe(Box::new(Recorder(seen.clone())));

        assert!(manager.switch());
        assert!(manager.switch());
        assert!(manager.switch());

        assert_eq!(manager.current().as_deref(), Some("en"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("en".to_string(), "ru".to_string()),
                ("ru".to_string(), "ua".to_string()),
                ("ua".to_string(), "en".to_string()),
            ]
        );
    }

    #[test]
    fn test_refused_switch_keeps_state() {
        let adapter = FakeAdapter::default();
        adapter.refuse.store(true, Ordering::SeqCst);
        let manager = LayoutManager::new(Box::new(adapter), layouts(&["en", "ru"]));

        assert!(!manager.switch());
        assert_eq!(manager.current().as_deref(), Some("en"));
    }

    #[test]
    fn test_set_available_dedupes_and_keeps_current() {
        let manager = LayoutManager::new(Box::new(FakeAdapter::default()), layouts(&["en", "ru"]));
        assert!(manager.set_current("ru"));
        manager.set_available(layouts(&["ua", "ru", "ru", "en"]));

        let state = manager.state();
        assert_eq!(state.available, layouts(&["ua", "ru", "en"]));
        assert_eq!(state.current.as_deref(), Some("ru"));

        manager.set_available(layouts(&["de", "ua"]));
        assert_eq!(manager.current().as_deref(), Some("de"));
        assert!(!manager.set_current("ru"));
    }

    #[test]
    fn test_note_switched_skips_adapter() {
        let adapter = FakeAdapter::default();
        let switches = adapter.switches.clone();
        let manager = LayoutManager::new(Box::new(adapter), layouts(&["us", "ru"]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        manager.subscribe(Box::new(Recorder(seen.clone())));

        assert_eq!(manager.note_switched().as_deref(), Some("ru"));
        assert_eq!(manager.note_switched().as_deref(), Some("us"));
        assert_eq!(switches.load(Ordering::SeqCst), 0);
        assert_eq!(seen.lock().unwrap().len(), 2);

        let empty = LayoutManager::new(Box::new(FakeAdapter::default()), Vec::new());
        assert_eq!(empty.note_switched(), None);
    }

    #[test]
    fn test_switch_to_compatible_layout() {
        let adapter = FakeAdapter::default();
        let switches = adapter.switches.clone();
        let manager = LayoutManager::new(Box::new(adapter), layouts(&["us", "de", "ua"]));

        assert!(manager.switch_to("ru"));
        assert_eq!(manager.current().as_deref(), Some("ua"));
        assert_eq!(switches.load(Ordering::SeqCst), 2);

        // Already there
        assert!(manager.switch_to("ua"));
        assert_eq!(switches.load(Ordering::SeqCst), 2);

        assert!(!manager.switch_to("zh"));
    }

    #[test]
    fn test_refresh_from_adapter() {
        let adapter = FakeAdapter {
            layouts: layouts(&["us", "ru"]),
            ..Default::default()
        };
        let manager = LayoutManager::new(Box::new(adapter), Vec::new());
        assert_eq!(manager.current(), None);
        manager.refresh().unwrap();
        assert_eq!(manager.current().as_deref(), Some("us"));
    }
}
