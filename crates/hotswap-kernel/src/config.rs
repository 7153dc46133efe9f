//! Runtime configuration
//!
//! Budget limits and per-operation costs, reentrancy depth and the routing
//! mode new dispatchers start in. Every field has a default, so a TOML file
//! only needs the values it overrides:
//!
//! ```toml
//! max_call_depth = 8
//! default_routing_mode = "multi_entry"
//!
//! [budget]
//! limit = 50000
//! store_cost = 40
//! ```

use crate::error::ConfigError;
use hotswap_routing::RoutingMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Budget charged against every top-level invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Units available to one top-level invocation, nested calls included
    pub limit: u64,
    /// Charged on every dispatch (top-level or reentrant)
    pub invoke_cost: u64,
    /// Charged per storage read
    pub load_cost: u64,
    /// Charged per storage write
    pub store_cost: u64,
    /// Charged per governance operation
    pub governance_cost: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            limit: 1_000_000,
            invoke_cost: 100,
            load_cost: 5,
            store_cost: 20,
            governance_cost: 500,
        }
    }
}

/// Dispatcher runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Invocation budget
    pub budget: BudgetConfig,
    /// Deepest reentrant nesting allowed; deeper calls exhaust the budget
    pub max_call_depth: usize,
    /// Routing mode for dispatchers built from this config
    pub default_routing_mode: RoutingMode,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            budget: BudgetConfig::default(),
            max_call_depth: 16,
            default_routing_mode: RoutingMode::SinglePointer,
        }
    }
}

impl RuntimeConfig {
    /// Create config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the invocation budget limit
    #[must_use]
    pub fn with_budget_limit(mut self, limit: u64) -> Self {
        self.budget.limit = limit;
        self
    }

    /// Replace the whole budget table
    #[must_use]
    pub fn with_budget(mut self, budget: BudgetConfig) -> Self {
        self.budget = budget;
        self
    }

    /// Set maximum reentrant depth
    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Set the routing mode
    #[must_use]
    pub fn with_routing_mode(mut self, mode: RoutingMode) -> Self {
        self.default_routing_mode = mode;
        self
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// [`ConfigError::Parse`] on bad TOML, [`ConfigError::Invalid`] if a
    /// value is unusable.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`RuntimeConfig::from_toml_str`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        info!(
            path = %path.as_ref().display(),
            budget = config.budget.limit,
            mode = %config.default_routing_mode,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Check value constraints
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] when the budget limit is zero or an
    /// invocation alone costs more than the whole budget.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.budget.limit == 0 {
            return Err(ConfigError::Invalid {
                reason: "budget.limit must be positive".to_string(),
            });
        }
        if self.budget.invoke_cost > self.budget.limit {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "budget.invoke_cost {} exceeds budget.limit {}",
                    self.budget.invoke_cost, self.budget.limit
                ),
            });
        }
        Ok(())
    }
}
