//! Setup fault injection for mock collaborators.
//!
//! Lets tests make a particular stream fail during setup (device missing,
//! ring allocation refused, port busy) so the coordinator's abort path can be
//! exercised without hardware. Faults are reported as [`DriverError`]s, the
//! way a real driver reports its status codes; each mock maps them onto the
//! session taxonomy.

use std::collections::HashMap;
use std::sync::Arc;

use daq_core::error::{DriverError, DriverErrorKind};
use parking_lot::Mutex;

use super::rng::MockRng;

/// Fault injection configuration for a mock collaborator
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Per-operation failure rate (0.0 to 1.0), `"*"` for all operations
    failure_rates: Arc<HashMap<&'static str, f64>>,
    /// Specific failure scenarios
    scenarios: Arc<Vec<ErrorScenario>>,
    /// RNG for failure decisions
    rng: Arc<MockRng>,
    /// Operation counters for FailAfterN scenarios
    counts: Arc<Mutex<HashMap<&'static str, u32>>>,
}

/// A deterministic fault.
#[derive(Debug, Clone)]
pub enum ErrorScenario {
    /// Fail after N successful calls of `operation`
    FailAfterN {
        /// Operation name, e.g. `"open"` or `"start"`
        operation: &'static str,
        /// Successful calls before failing
        count: u32,
    },
    /// The device is not present
    DeviceMissing,
    /// Ring allocation is refused on `start`
    AllocationRefused,
    /// Port open is refused
    PortBusy,
    /// Device reports a fault code on `start`
    HardwareFault {
        /// Vendor fault code
        code: u32,
    },
}

impl ErrorConfig {
    /// Create error config with no errors (default)
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// Create error config with uniform random failures and specific seed
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate);
        Self::build(rates, Vec::new(), seed)
    }

    /// Create error config with a single scenario
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Create error config with multiple scenarios
    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    fn build(
        rates: HashMap<&'static str, f64>,
        scenarios: Vec<ErrorScenario>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check whether `operation` should fail, and with which driver error.
    pub fn check_operation(
        &self,
        driver_type: &str,
        operation: &'static str,
    ) -> Result<(), DriverError> {
        for scenario in self.scenarios.iter() {
            match scenario {
                ErrorScenario::FailAfterN {
                    operation: op,
                    count,
                } if *op == operation => {
                    let mut counts = self.counts.lock();
                    let current = counts.entry(operation).or_insert(0);
                    *current += 1;
                    if *current > *count {
                        return Err(DriverError::new(
                            driver_type,
                            DriverErrorKind::Hardware,
                            format!("Injected failure after {} operations", count),
                        ));
                    }
                }
                ErrorScenario::DeviceMissing if operation == "start" || operation == "open" => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Initialization,
                        "No device detected",
                    ));
                }
                ErrorScenario::AllocationRefused if operation == "start" => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Allocation,
                        "Failed to allocate memory",
                    ));
                }
                ErrorScenario::PortBusy if operation == "open" => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Initialization,
                        "Access is denied",
                    ));
                }
                ErrorScenario::HardwareFault { code } if operation == "start" => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Hardware,
                        format!("Hardware fault: {}", code),
                    ));
                }
                _ => {}
            }
        }

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);

        if self.rng.should_fail(rate) {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Hardware,
                format!("Random failure on operation '{}'", operation),
            ));
        }

        Ok(())
    }

    /// Reset scenario counters
    pub fn reset(&self) {
        self.counts.lock().clear();
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}
