//! Entity extraction from non-test source files
//!
//! Each file is scanned by an ordered pipeline of [`DiscoveryStrategy`]s.
//! Strategies are pure: they read the file and the [`DiscoveryState`] built so
//! far, and return [`Discovery`] operations which the pipeline then applies.
//! Later strategies may override earlier ones, but only through
//! [`Discovery::ReplaceIfPresent`], so the precedence between strategies is
//! explicit in the operations they emit.
//!
//! After the pipeline, entities named like nested-schema helpers are dropped,
//! entities without attributes pick them up from their receiver's `Schema`
//! method, and resources are probed for an `ImportState` method.

pub mod attributes;
mod strategies;

pub use strategies::{
    ActionFactoryStrategy, FactoryFunctionStrategy, MetadataMethodStrategy,
    RegistryCallStrategy, ReturnTypeStrategy, SchemaMethodStrategy, default_strategies,
};

use crate::config::{Settings, build_globset};
use crate::error::ConfigError;
use crate::go_ast::{FuncDecl, GoFile, Import};
use crate::model::{Entity, EntityKey, EntityKind};
use crate::naming::to_title_case;
use globset::GlobSet;
use std::collections::HashMap;
use tracing::debug;

/// What a strategy wants done with an entity it found
#[derive(Debug, Clone, PartialEq)]
pub enum Discovery {
    /// Register the entity unless its key is already taken.
    /// `receiver` is the Go type implementing it, when known.
    Insert {
        entity: Entity,
        receiver: Option<String>,
    },
    /// Authoritative naming for `receiver`: if an entity is already indexed under
    /// that receiver type, rename it (keeping what was learned about it);
    /// otherwise behave like `Insert`.
    ReplaceIfPresent { receiver: String, entity: Entity },
}

/// Scratch state shared by the strategies scanning one file
#[derive(Debug, Default)]
pub struct DiscoveryState {
    entities: Vec<Entity>,
    receivers: HashMap<String, EntityKey>,
}

impl DiscoveryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.position(key).is_some()
    }

    /// Entity previously indexed under a receiver type
    pub fn by_receiver(&self, receiver: &str) -> Option<&Entity> {
        let key = self.receivers.get(receiver)?;
        self.position(key).map(|i| &self.entities[i])
    }

    /// Receiver type of an entity, when known
    pub fn receiver_of(&self, key: &EntityKey) -> Option<&str> {
        self.receivers
            .iter()
            .find(|(_, k)| *k == key)
            .map(|(r, _)| r.as_str())
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    fn position(&self, key: &EntityKey) -> Option<usize> {
        self.entities
            .iter()
            .position(|e| e.kind == key.kind && e.name == key.name)
    }

    pub fn apply(&mut self, discovery: Discovery) {
        match discovery {
            Discovery::Insert { entity, receiver } => self.insert(entity, receiver),
            Discovery::ReplaceIfPresent { receiver, entity } => {
                let Some(old_key) = self.receivers.get(&receiver).cloned() else {
                    self.insert(entity, Some(receiver));
                    return;
                };
                let new_key = entity.key();
                if old_key == new_key {
                    return;
                }
                let Some(index) = self.position(&old_key) else {
                    self.insert(entity, Some(receiver));
                    return;
                };
                let mut renamed = self.entities.remove(index);
                self.receivers.remove(&receiver);
                if self.contains(&new_key) {
                    debug!(
                        "{} already known, dropping provisional {} for {}",
                        new_key, old_key, receiver
                    );
                    return;
                }
                debug!("renaming {} to {} (receiver {})", old_key, new_key, receiver);
                renamed.name = entity.name;
                renamed.kind = entity.kind;
                if renamed.attributes.is_empty() {
                    renamed.attributes = entity.attributes;
                }
                renamed.import_capable |= entity.import_capable;
                self.entities.insert(index, renamed);
                self.receivers.insert(receiver, new_key);
            }
        }
    }

    fn insert(&mut self, entity: Entity, receiver: Option<String>) {
        let key = entity.key();
        if self.contains(&key) {
            return;
        }
        if let Some(receiver) = receiver {
            self.receivers.entry(receiver).or_insert_with(|| key.clone());
        }
        self.entities.push(entity);
    }

    pub fn into_entities(self) -> Vec<Entity> {
        self.entities
    }
}

/// Everything a strategy may look at while scanning one file
pub struct FileContext<'a> {
    pub file: &'a GoFile,
    pub imports: Vec<Import>,
    pub functions: Vec<FuncDecl<'a>>,
    pub settings: &'a Settings,
}

impl<'a> FileContext<'a> {
    pub fn new(file: &'a GoFile, settings: &'a Settings) -> Self {
        Self {
            file,
            imports: file.imports(),
            functions: file.functions(),
            settings,
        }
    }

    pub fn source(&self) -> &'a str {
        &self.file.source
    }

    /// Method `name` declared on `receiver`
    pub fn method(&self, receiver: &str, name: &str) -> Option<&FuncDecl<'a>> {
        self.functions
            .iter()
            .find(|f| f.receiver == Some(receiver) && f.name == name)
    }

    /// Import path behind an alias
    pub fn import_path(&self, alias: &str) -> Option<&str> {
        self.imports
            .iter()
            .find(|i| i.alias == alias)
            .map(|i| i.path.as_str())
    }
}

/// One way of recognising entity declarations
pub trait DiscoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn discover(&self, ctx: &FileContext<'_>, state: &DiscoveryState) -> Vec<Discovery>;
}

/// Runs the strategy pipeline and post-processing over files
pub struct Extractor {
    strategies: Vec<Box<dyn DiscoveryStrategy>>,
    nested_schema: GlobSet,
    settings: Settings,
}

impl Extractor {
    pub fn new(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            strategies: default_strategies(),
            nested_schema: build_globset(
                &settings.nested_schema_patterns,
                "nested-schema-patterns",
            )?,
            settings: settings.clone(),
        })
    }

    /// Entities declared in one non-test file, in discovery order
    pub fn extract(&self, file: &GoFile) -> Vec<Entity> {
        let ctx = FileContext::new(file, &self.settings);
        let mut state = DiscoveryState::new();
        for strategy in &self.strategies {
            for discovery in strategy.discover(&ctx, &state) {
                debug!("{}: {} in {}", strategy.name(), discovery_key(&discovery), file.path);
                state.apply(discovery);
            }
        }
        self.post_process(&ctx, state)
    }

    fn post_process(&self, ctx: &FileContext<'_>, state: DiscoveryState) -> Vec<Entity> {
        let mut entities = Vec::new();
        for entity in state.entities() {
            if self.nested_schema.is_match(&entity.name) {
                debug!("dropping nested schema helper {}", entity.key());
                continue;
            }
            let mut entity = entity.clone();
            let receiver = state.receiver_of(&entity.key());

            if entity.attributes.is_empty()
                && let Some(body) = receiver
                    .and_then(|r| ctx.method(r, "Schema"))
                    .and_then(|schema| schema.body)
            {
                entity.attributes = attributes::framework_attributes(body, ctx.source());
            }

            if entity.kind == EntityKind::Resource && !entity.import_capable {
                let synthesized = format!("{}Resource", to_title_case(&entity.name));
                entity.import_capable = ctx.method(&synthesized, "ImportState").is_some()
                    || receiver.is_some_and(|r| ctx.method(r, "ImportState").is_some());
            }
            entities.push(entity);
        }
        entities
    }
}

fn discovery_key(discovery: &Discovery) -> EntityKey {
    match discovery {
        Discovery::Insert { entity, .. } | Discovery::ReplaceIfPresent { entity, .. } => {
            entity.key()
        }
    }
}
