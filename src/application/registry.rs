//! Strategy registry: validated definitions and their table attachments.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use crate::domain::strategy::StrategyDefinition;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Strategy {0:?} is already registered")]
    DuplicateKey(String),

    #[error("Unknown strategy {0:?}")]
    UnknownStrategy(String),

    #[error("Strategy {strategy:?} is not attached to table {table:?}")]
    NotAttached { table: String, strategy: String },
}

/// Registered strategies plus which tables each one watches.
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    // Registration order matters for deterministic evaluation.
    strategies: Vec<StrategyDefinition>,
    by_key: HashMap<String, usize>,
    attachments: HashMap<String, HashSet<String>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: StrategyDefinition) -> Result<(), RegistryError> {
        if self.by_key.contains_key(&def.strategy_key) {
            return Err(RegistryError::DuplicateKey(def.strategy_key.clone()));
        }
        debug!(strategy = %def.strategy_key, "Registered strategy");
        self.by_key
            .insert(def.strategy_key.clone(), self.strategies.len());
        self.strategies.push(def);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&StrategyDefinition> {
        self.by_key.get(key).map(|&i| &self.strategies[i])
    }

    pub fn attach(&mut self, table_id: &str, strategy_key: &str) -> Result<(), RegistryError> {
        if !self.by_key.contains_key(strategy_key) {
            return Err(RegistryError::UnknownStrategy(strategy_key.to_string()));
        }
        self.attachments
            .entry(table_id.to_string())
            .or_default()
            .insert(strategy_key.to_string());
        debug!(table = table_id, strategy = strategy_key, "Attached strategy");
        Ok(())
    }

    pub fn detach(&mut self, table_id: &str, strategy_key: &str) -> Result<(), RegistryError> {
        let removed = self
            .attachments
            .get_mut(table_id)
            .is_some_and(|set| set.remove(strategy_key));
        if !removed {
            return Err(RegistryError::NotAttached {
                table: table_id.to_string(),
                strategy: strategy_key.to_string(),
            });
        }
        Ok(())
    }

    pub fn is_attached(&self, table_id: &str, strategy_key: &str) -> bool {
        self.attachments
            .get(table_id)
            .is_some_and(|set| set.contains(strategy_key))
    }

    /// Attached strategies for a table, in registration order.
    pub fn strategies_for_table(&self, table_id: &str) -> Vec<&StrategyDefinition> {
        match self.attachments.get(table_id) {
            Some(attached) => self
                .strategies
                .iter()
                .filter(|s| attached.contains(&s.strategy_key))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &StrategyDefinition> {
        self.strategies.iter()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
