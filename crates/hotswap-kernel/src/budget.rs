//! Invocation budget
//!
//! One budget covers a top-level invocation and everything nested under it.
//! Once exhausted it stays exhausted: every later charge fails, so module
//! code that swallows the fault still cannot make progress.

use crate::config::BudgetConfig;
use crate::error::DispatchError;
use hotswap_module::ModuleFault;

/// Budget ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Exhausted {
    pub(crate) used: u64,
    pub(crate) limit: u64,
}

impl From<Exhausted> for DispatchError {
    fn from(value: Exhausted) -> Self {
        DispatchError::ResourceExhausted {
            used: value.used,
            limit: value.limit,
        }
    }
}

impl From<Exhausted> for ModuleFault {
    fn from(_: Exhausted) -> Self {
        ModuleFault::BudgetExhausted
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Budget {
    costs: BudgetConfig,
    used: u64,
    exhausted: bool,
}

impl Budget {
    pub(crate) fn new(costs: BudgetConfig) -> Self {
        Self {
            costs,
            used: 0,
            exhausted: false,
        }
    }

    pub(crate) fn charge(&mut self, units: u64) -> Result<(), Exhausted> {
        if self.exhausted {
            return Err(self.state());
        }
        self.used = self.used.saturating_add(units);
        if self.used > self.costs.limit {
            self.exhausted = true;
            return Err(self.state());
        }
        Ok(())
    }

    pub(crate) fn charge_invoke(&mut self) -> Result<(), Exhausted> {
        self.charge(self.costs.invoke_cost)
    }

    pub(crate) fn charge_load(&mut self) -> Result<(), Exhausted> {
        self.charge(self.costs.load_cost)
    }

    pub(crate) fn charge_store(&mut self) -> Result<(), Exhausted> {
        self.charge(self.costs.store_cost)
    }

    pub(crate) fn charge_governance(&mut self) -> Result<(), Exhausted> {
        self.charge(self.costs.governance_cost)
    }

    /// Exhaust immediately (call depth exceeded)
    pub(crate) fn exhaust(&mut self) -> Exhausted {
        self.exhausted = true;
        self.state()
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub(crate) fn state(&self) -> Exhausted {
        Exhausted {
            used: self.used,
            limit: self.costs.limit,
        }
    }
}
