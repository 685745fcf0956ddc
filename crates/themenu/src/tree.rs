use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use crate::config::MenuConfig;
use crate::entity::MenuEntity;
use crate::error::Result;

/// Input as seen by the menu, already translated from raw key events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSignal {
    Press(String),
    Release(String),
    Escape,
}

/// The root item list plus the one submenu currently shown, if any.
///
/// There is no navigation stack: leaving a submenu always goes straight
/// back to the root list.
pub struct MenuTree {
    root: Vec<Arc<MenuEntity>>,
    scope: Option<Arc<MenuEntity>>,
    // Key whose press opened the current submenu; its release belongs to
    // the parent list and must not trigger a sub-item bound to the same key.
    opened_by: Option<String>,
}

impl MenuTree {
    pub fn new(cfg: &MenuConfig) -> Self {
        let root = cfg
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| Arc::new(MenuEntity::from_config(item, &i.to_string())))
            .collect();
        Self {
            root,
            scope: None,
            opened_by: None,
        }
    }

    /// Start background refresh for every entity in the tree.
    pub fn start(&self) {
        info!(items = self.root.len(), "starting menu pollers");
        for entity in &self.root {
            entity.prepare();
        }
    }

    pub fn root(&self) -> &[Arc<MenuEntity>] {
        &self.root
    }

    pub fn scope(&self) -> Option<&Arc<MenuEntity>> {
        self.scope.as_ref()
    }

    pub fn current_items(&self) -> &[Arc<MenuEntity>] {
        match &self.scope {
            Some(entity) => entity.sub_items(),
            None => &self.root,
        }
    }

    /// Show `entity`'s sub-items. Leaf entities have none, so they are ignored.
    pub fn activate_scope(&mut self, entity: Arc<MenuEntity>) {
        if entity.is_leaf() {
            return;
        }
        debug!(entity = %entity.id(), "enter submenu");
        self.scope = Some(entity);
    }

    pub fn reset_to_root(&mut self) {
        for entity in self.current_items() {
            entity.set_active(false);
        }
        self.opened_by = None;
        if let Some(entity) = self.scope.take() {
            debug!(entity = %entity.id(), "leave submenu");
        }
    }

    /// Enter the submenu bound to `key` in the current scope. Returns whether
    /// the scope changed.
    pub fn navigate(&mut self, key: &str) -> bool {
        let target = self
            .matching(key)
            .into_iter()
            .find(|entity| !entity.is_leaf());
        match target {
            Some(entity) => {
                self.activate_scope(entity);
                true
            }
            None => false,
        }
    }

    /// Key down: enter a submenu, or mark matching leaves as held.
    pub fn press(&mut self, key: &str) {
        if self.navigate(key) {
            self.opened_by = Some(key.to_string());
            return;
        }
        for entity in self.matching(key) {
            entity.set_active(true);
        }
    }

    /// Key up: release matching leaves and trigger them in the background.
    pub fn release(&mut self, key: &str) -> Vec<JoinHandle<()>> {
        if self.opened_by.as_deref() == Some(key) {
            self.opened_by = None;
            return Vec::new();
        }
        self.matching(key)
            .into_iter()
            .filter(|entity| entity.is_leaf())
            .filter_map(|entity| {
                entity.set_active(false);
                Self::trigger(entity)
            })
            .collect()
    }

    pub fn handle(&mut self, signal: InputSignal) -> Vec<JoinHandle<()>> {
        match signal {
            InputSignal::Press(key) => {
                self.press(&key);
                Vec::new()
            }
            InputSignal::Release(key) => self.release(&key),
            InputSignal::Escape => {
                self.reset_to_root();
                Vec::new()
            }
        }
    }

    /// Run `entity`'s action on a worker thread so the caller never waits on
    /// a command.
    pub fn trigger(entity: Arc<MenuEntity>) -> Option<JoinHandle<()>> {
        let spawned = thread::Builder::new()
            .name("themenu-trigger".into())
            .spawn(move || Self::dispatch(&entity));
        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(error = %e, "failed to start trigger thread");
                None
            }
        }
    }

    /// The one place trigger failures end up: errors and panics are logged
    /// and dropped here.
    pub fn dispatch(entity: &MenuEntity) {
        debug!(entity = %entity.id(), "trigger");
        guarded(entity.id(), || entity.trigger());
    }

    fn matching(&self, key: &str) -> Vec<Arc<MenuEntity>> {
        if key.is_empty() {
            return Vec::new();
        }
        self.current_items()
            .iter()
            .filter(|entity| entity.action_key() == key)
            .cloned()
            .collect()
    }
}

/// Run `f`, logging its error or panic. Returns whether it completed cleanly.
fn guarded(id: &str, f: impl FnOnce() -> Result<()>) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!(entity = %id, error = %e, "action failed");
            false
        }
        Err(panic) => {
            error!(
                entity = %id,
                panic = %panic_message(panic.as_ref()),
                "action panicked"
            );
            false
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{guarded, panic_message};
    use crate::error::Error;
    use std::panic::catch_unwind;

    #[test]
    fn guarded_swallows_errors_and_panics() {
        assert!(guarded("ok", || Ok(())));
        assert!(!guarded("err", || Err(Error::msg("boom"))));
        assert!(!guarded("panic", || panic!("action blew up")));
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let p = catch_unwind(|| panic!("plain")).unwrap_err();
        assert_eq!(panic_message(p.as_ref()), "plain");
        let p = catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(p.as_ref()), "formatted 7");
    }
}
