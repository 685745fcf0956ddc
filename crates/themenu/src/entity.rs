use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::condition::ConditionEvaluator;
use crate::config::ItemConfig;
use crate::error::Result;
use crate::poller::CommandPoller;
use crate::runner::run_shell;

/// Shown when nothing else yields a label, e.g. a toggle whose state
/// output matches none of its `states`.
pub const NO_NAME: &str = "no name";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Label,
    LabelCommand,
    Condition,
    Toggle,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Label => "label",
            EntityKind::LabelCommand => "label_command",
            EntityKind::Condition => "if",
            EntityKind::Toggle => "toggle",
        }
    }
}

pub struct Condition {
    evaluator: ConditionEvaluator,
    output: BTreeMap<String, MenuEntity>,
}

impl Condition {
    pub fn evaluator(&self) -> &ConditionEvaluator {
        &self.evaluator
    }

    /// The branch selected by the evaluator's cached output, if any.
    pub fn current(&self) -> Option<&MenuEntity> {
        let out = self.evaluator.cached_output()?;
        self.output.get(&out)
    }
}

pub struct Toggle {
    state_command: CommandPoller,
    states: BTreeMap<String, MenuEntity>,
}

impl Toggle {
    pub fn state_command(&self) -> &CommandPoller {
        &self.state_command
    }

    /// The state entry matching the last state reading, if any.
    pub fn current(&self) -> Option<&MenuEntity> {
        let out = self.state_command.last_output()?;
        self.states.get(&out)
    }
}

/// One configured menu item together with the pollers that feed it.
pub struct MenuEntity {
    id: String,
    action_key: String,
    active: AtomicBool,
    label: Option<String>,
    label_command: Option<CommandPoller>,
    action_command: Option<CommandPoller>,
    condition: Option<Condition>,
    toggle: Option<Toggle>,
    sub_items: Vec<Arc<MenuEntity>>,
}

impl MenuEntity {
    /// Build an entity (and everything under it) from its config record.
    /// `path` names the entity in logs when the record has no `id`.
    pub fn from_config(cfg: &ItemConfig, path: &str) -> Self {
        let condition = cfg.condition.as_ref().map(|c| Condition {
            evaluator: ConditionEvaluator::new(c.command.clone()),
            output: c
                .output
                .iter()
                .map(|(k, v)| (k.clone(), Self::from_config(v, &format!("{path}.if.{k}"))))
                .collect(),
        });
        let toggle = cfg.state_command.as_ref().map(|spec| Toggle {
            state_command: CommandPoller::new(spec.clone()),
            states: cfg
                .states
                .iter()
                .map(|(k, v)| (k.clone(), Self::from_config(v, &format!("{path}.states.{k}"))))
                .collect(),
        });
        Self {
            id: cfg.id.clone().unwrap_or_else(|| path.to_string()),
            action_key: cfg.key.clone(),
            active: AtomicBool::new(false),
            label: cfg.label.clone(),
            label_command: cfg.label_command.clone().map(CommandPoller::new),
            action_command: cfg.command.clone().map(CommandPoller::new),
            condition,
            toggle,
            sub_items: cfg
                .items
                .iter()
                .enumerate()
                .map(|(i, sub)| Arc::new(Self::from_config(sub, &format!("{path}.{i}"))))
                .collect(),
        }
    }

    /// Start the background refresh of every display-bound command in this
    /// subtree. Action commands are left alone; they only run on trigger.
    pub fn prepare(&self) {
        if let Some(p) = &self.label_command {
            p.start();
        }
        if let Some(t) = &self.toggle {
            t.state_command.start();
            t.states.values().for_each(MenuEntity::prepare);
        }
        if let Some(c) = &self.condition {
            c.evaluator.run();
            c.output.values().for_each(MenuEntity::prepare);
        }
        for sub in &self.sub_items {
            sub.prepare();
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn action_key(&self) -> &str {
        &self.action_key
    }

    pub fn kind(&self) -> EntityKind {
        if self.label_command.is_some() {
            EntityKind::LabelCommand
        } else if self.toggle.is_some() {
            EntityKind::Toggle
        } else if self.condition.is_some() {
            EntityKind::Condition
        } else {
            EntityKind::Label
        }
    }

    pub fn sub_items(&self) -> &[Arc<MenuEntity>] {
        &self.sub_items
    }

    pub fn is_leaf(&self) -> bool {
        self.sub_items.is_empty()
    }

    pub fn active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    pub fn label_command(&self) -> Option<&CommandPoller> {
        self.label_command.as_ref()
    }

    pub fn action_command(&self) -> Option<&CommandPoller> {
        self.action_command.as_ref()
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn toggle(&self) -> Option<&Toggle> {
        self.toggle.as_ref()
    }

    /// Resolve the text to display, reading only cached command state.
    ///
    /// Precedence: label command (error, then output), action command error,
    /// toggle or condition branch, static label, [`NO_NAME`].
    pub fn label(&self) -> String {
        if let Some(p) = &self.label_command {
            match p.last_result() {
                Some(Err(e)) => return e.to_string(),
                Some(Ok(out)) => return out,
                None => {}
            }
        }
        if let Some(e) = self.action_command.as_ref().and_then(CommandPoller::last_error) {
            return e.to_string();
        }
        if let Some(t) = &self.toggle {
            return t.current().map_or_else(|| NO_NAME.to_string(), MenuEntity::label);
        }
        if let Some(c) = &self.condition {
            return c.current().map_or_else(|| NO_NAME.to_string(), MenuEntity::label);
        }
        self.label.clone().unwrap_or_else(|| NO_NAME.to_string())
    }

    pub fn busy(&self) -> bool {
        self.label_command.as_ref().is_some_and(CommandPoller::busy)
            || self.action_command.as_ref().is_some_and(CommandPoller::busy)
            || self.toggle.as_ref().is_some_and(|t| t.state_command.busy())
            || self.condition.as_ref().is_some_and(|c| c.evaluator.busy())
    }

    /// Perform this entity's action on the calling thread.
    ///
    /// The first applicable branch wins: action command, toggle, condition.
    /// A branch whose command is still running ignores the trigger, since the
    /// value it would act on is about to change.
    /// Errors from the action command stay in its poller (and so in the
    /// label); only the one-shot condition command reports failure here.
    pub fn trigger(&self) -> Result<()> {
        if let Some(action) = &self.action_command {
            if action.busy() {
                debug!(entity = %self.id, "action still running; ignoring trigger");
                return Ok(());
            }
            if let Err(e) = action.execute_now() {
                warn!(entity = %self.id, error = %e, "action command failed");
            }
            return Ok(());
        }

        if let Some(t) = &self.toggle {
            if t.state_command.busy() {
                debug!(entity = %self.id, "toggle state is being read; ignoring trigger");
                return Ok(());
            }
            let Some(target) = t.current() else {
                debug!(entity = %self.id, "toggle state matches no entry; nothing to do");
                return Ok(());
            };
            let res = target.trigger();
            t.state_command.reset_timer();
            return res;
        }

        if let Some(c) = &self.condition {
            if c.evaluator.busy() {
                debug!(entity = %self.id, "condition is being evaluated; ignoring trigger");
                return Ok(());
            }
            let Some(target) = c.current() else {
                debug!(entity = %self.id, "condition output matches no entry; nothing to do");
                return Ok(());
            };
            if let Some(action) = &target.action_command {
                let spec = action.spec();
                // One-shot: exit status is not inspected.
                run_shell(&spec.shell_command, spec.timeout)?;
            }
        }

        Ok(())
    }
}
