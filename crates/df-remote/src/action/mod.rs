//! Named administrative actions
//!
//! Every request names an action; the name is resolved exactly once
//! through [`ActionRegistry::resolve`] and the resulting [`Action`] says
//! how to produce the remote script and how to run it.

mod builtin;
mod runner;
pub mod system_info;

pub use runner::{ActionOutcome, ActionOutput, ActionRunner};
pub use system_info::{parse_system_info, SystemInfo};

use std::collections::BTreeMap;

use serde_json::Value;

use df_core::config::ActionTemplate;
use df_core::error::ActionError;
use df_core::{ActionScope, ReplyMode};

/// Builds a payload-dependent script; a declined payload is an error value
pub type CommandBuilder = fn(&Value) -> Result<String, ActionError>;

/// Source of the script an action runs
#[derive(Clone)]
pub enum CommandProducer {
    Static(String),
    Parameterized(CommandBuilder),
}

impl CommandProducer {
    pub fn produce(&self, payload: &Value) -> Result<String, ActionError> {
        match self {
            CommandProducer::Static(text) => Ok(text.clone()),
            CommandProducer::Parameterized(build) => build(payload),
        }
    }
}

impl std::fmt::Debug for CommandProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandProducer::Static(text) => f.debug_tuple("Static").field(text).finish(),
            CommandProducer::Parameterized(_) => f.write_str("Parameterized(..)"),
        }
    }
}

/// How the stdout of a command action is turned into a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDecoder {
    Text,
    SystemInfo,
}

#[derive(Debug, Clone)]
pub enum ActionKind {
    Command {
        producer: CommandProducer,
        decoder: OutputDecoder,
    },
    DisableLaunchers,
    RestoreLaunchers,
}

#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    pub scope: ActionScope,
    pub reply: ReplyMode,
    pub kind: ActionKind,
}

impl Action {
    /// Script for a command action; `None` for backup actions
    pub fn script(&self, payload: &Value) -> Option<Result<String, ActionError>> {
        match &self.kind {
            ActionKind::Command { producer, .. } => Some(producer.produce(payload)),
            _ => None,
        }
    }
}

/// Name to action lookup table
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Action>,
}

impl ActionRegistry {
    /// Registry holding only the built-in catalog
    pub fn builtin() -> Self {
        Self {
            actions: builtin::builtins()
                .into_iter()
                .map(|action| (action.name.clone(), action))
                .collect(),
        }
    }

    /// Built-ins plus configured static templates; templates win on name clashes
    pub fn with_templates(templates: &BTreeMap<String, ActionTemplate>) -> Self {
        let mut registry = Self::builtin();
        for (name, template) in templates {
            if registry.actions.contains_key(name) {
                tracing::warn!("Configured action {} overrides the built-in one", name);
            }
            registry.actions.insert(
                name.clone(),
                Action {
                    name: name.clone(),
                    scope: template.scope,
                    reply: template.reply,
                    kind: ActionKind::Command {
                        producer: CommandProducer::Static(template.command.clone()),
                        decoder: OutputDecoder::Text,
                    },
                },
            );
        }
        registry
    }

    pub fn resolve(&self, name: &str) -> Result<&Action, ActionError> {
        self.actions
            .get(name)
            .ok_or_else(|| ActionError::UnknownAction(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
