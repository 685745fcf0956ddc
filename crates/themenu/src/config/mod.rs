use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::duration::parse_duration;
use crate::error::{Error, Result};

/// One shell command plus its refresh policy.
///
/// A zero `update_interval` means "run once"; a zero `timeout` means "wait
/// for as long as it takes".
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "CommandField")]
pub struct CommandSpec {
    pub shell_command: String,
    pub update_interval: Duration,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(shell_command: impl Into<String>) -> Self {
        Self {
            shell_command: shell_command.into(),
            update_interval: Duration::ZERO,
            timeout: Duration::ZERO,
        }
    }

    pub fn every(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// The wire shape: either `"echo hi"` or `{ "cmd": "echo hi", "update_interval": "5s" }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum CommandField {
    Full {
        cmd: String,
        #[serde(default)]
        update_interval: Option<String>,
        #[serde(default)]
        timeout: Option<String>,
    },
    Short(String),
}

impl TryFrom<CommandField> for CommandSpec {
    type Error = Error;

    fn try_from(field: CommandField) -> Result<Self> {
        let (cmd, interval, timeout) = match field {
            CommandField::Short(cmd) => (cmd, None, None),
            CommandField::Full {
                cmd,
                update_interval,
                timeout,
            } => (cmd, update_interval, timeout),
        };
        let parse_opt = |raw: Option<String>, what: &str| -> Result<Duration> {
            match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(Duration::ZERO),
                Some(s) => parse_duration(s).map_err(|e| Error::msg(format!("{what}: {e}"))),
            }
        };
        Ok(CommandSpec {
            shell_command: cmd,
            update_interval: parse_opt(interval, "update_interval")?,
            timeout: parse_opt(timeout, "timeout")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConditionConfig {
    pub command: String,
    #[serde(default, alias = "output_map")]
    pub output: BTreeMap<String, ItemConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ItemConfig {
    pub id: Option<String>,
    pub label: Option<String>,
    #[serde(alias = "action_key")]
    pub key: String,
    #[serde(alias = "action_command")]
    pub command: Option<CommandSpec>,
    pub label_command: Option<CommandSpec>,
    #[serde(rename = "if", alias = "condition")]
    pub condition: Option<ConditionConfig>,
    pub state_command: Option<CommandSpec>,
    pub states: BTreeMap<String, ItemConfig>,
    pub items: Vec<ItemConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlDoc {
    #[serde(default)]
    items: Vec<ItemConfig>,
}

/// A loaded, validated menu definition.
#[derive(Debug, Clone)]
pub struct MenuConfig {
    pub items: Vec<ItemConfig>,
}

impl MenuConfig {
    /// Accepts either a bare array of items or an object with an `items` array.
    pub fn from_json(data: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| Error::msg(format!("JSON parse error: {e}")))?;
        let items = match value {
            serde_json::Value::Object(mut obj) => match obj.remove("items") {
                Some(items) => serde_json::from_value(items),
                None => Ok(Vec::new()),
            },
            other => serde_json::from_value(other),
        }
        .map_err(|e| Error::msg(format!("invalid menu item: {e}")))?;
        Self::from_items(items)
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        let doc: TomlDoc =
            toml::from_str(data).map_err(|e| Error::msg(format!("TOML parse error: {e}")))?;
        Self::from_items(doc.items)
    }

    fn from_items(items: Vec<ItemConfig>) -> Result<Self> {
        let cfg = Self { items };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(Error::msg("menu has no items"));
        }
        for (idx, item) in self.items.iter().enumerate() {
            validate_item(item, &idx.to_string())?;
        }
        Ok(())
    }
}

fn validate_item(item: &ItemConfig, path: &str) -> Result<()> {
    let name = item.id.as_deref().unwrap_or(path);
    if item.key.chars().count() > 1 {
        return Err(Error::msg(format!(
            "item '{name}': key '{}' must be a single character",
            item.key
        )));
    }
    for (what, spec) in [
        ("command", &item.command),
        ("label_command", &item.label_command),
        ("state_command", &item.state_command),
    ] {
        if let Some(spec) = spec
            && spec.shell_command.trim().is_empty()
        {
            return Err(Error::msg(format!("item '{name}': {what} is empty")));
        }
    }
    match (&item.state_command, item.states.is_empty()) {
        (Some(_), true) => {
            return Err(Error::msg(format!(
                "item '{name}': state_command needs at least one entry in states"
            )));
        }
        (None, false) => {
            return Err(Error::msg(format!(
                "item '{name}': states given without state_command"
            )));
        }
        _ => {}
    }
    if let Some(cond) = &item.condition {
        if cond.command.trim().is_empty() {
            return Err(Error::msg(format!("item '{name}': if.command is empty")));
        }
        for (key, sub) in &cond.output {
            validate_item(sub, &format!("{path}.if.{key}"))?;
        }
    }
    for (key, sub) in &item.states {
        validate_item(sub, &format!("{path}.states.{key}"))?;
    }
    for (idx, sub) in item.items.iter().enumerate() {
        validate_item(sub, &format!("{path}.{idx}"))?;
    }
    Ok(())
}

/// Load a menu file; `.toml` files go through the TOML parser, everything else is JSON.
pub fn load(path: &Path) -> Result<MenuConfig> {
    let data = fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read config {}: {e}", path.display())))?;
    let parsed = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => MenuConfig::from_toml(&data),
        _ => MenuConfig::from_json(&data),
    };
    parsed.map_err(|e| Error::msg(format!("{}: {e}", path.display())))
}
