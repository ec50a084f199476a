//! Account warmup: daily ramp, partner exchanges and reputation scoring

mod engine;
mod health;
mod ramp;

pub use engine::{WarmupEngine, WarmupSession};
pub use health::{HealthScore, WindowTotals, HEALTH_WINDOW_DAYS};
pub use ramp::{RampEntry, RampTable, RAMP_DAYS};
