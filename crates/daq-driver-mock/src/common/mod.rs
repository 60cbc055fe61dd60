//! Common infrastructure for mock collaborators.
//!
//! - **mode**: Operational modes (Instant, Realistic, Chaos)
//! - **timing**: Setup delays and read timeouts
//! - **errors**: Setup fault injection
//! - **rng**: Seeded random number generator

pub mod errors;
pub mod mode;
pub mod rng;
pub mod timing;

// Re-export commonly used types
pub use errors::{ErrorConfig, ErrorScenario};
pub use mode::MockMode;
pub use rng::MockRng;
pub use timing::TimingConfig;
