//! Test harness
//!
//! Randomized simulation of the dispatch runtime plus multi-seed
//! certification runs.

mod fixtures;
pub mod simulator;

pub use simulator::*;

use crate::error::DispatchError;
use serde::Serialize;

/// Entry point for certification runs
#[derive(Debug)]
pub struct TestHarness;

impl TestHarness {
    /// Run the simulator over `seeds` consecutive seeds
    ///
    /// # Errors
    /// Only if a simulated world cannot be set up.
    pub fn run_certification(
        seeds: u64,
        operations: u64,
    ) -> Result<CertificationReport, DispatchError> {
        let mut total_violations = 0;
        let mut failed_seeds = Vec::new();

        for seed in 0..seeds {
            let report = run_simulator(SimulatorConfig {
                seed,
                total_operations: operations,
                stop_on_first_violation: false,
                ..SimulatorConfig::default()
            })?;
            if !report.passed() {
                failed_seeds.push(seed);
            }
            total_violations += report.violations.len();
        }

        Ok(CertificationReport {
            passed: failed_seeds.is_empty(),
            total_violations,
            seeds_tested: seeds,
            failed_seeds,
        })
    }
}

/// Report from certification
#[derive(Debug, Clone, Serialize)]
pub struct CertificationReport {
    /// Every seed passed
    pub passed: bool,
    /// Violations summed over all seeds
    pub total_violations: usize,
    /// Seeds simulated
    pub seeds_tested: u64,
    /// Seeds that produced violations
    pub failed_seeds: Vec<u64>,
}
