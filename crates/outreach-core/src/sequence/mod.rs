//! Campaign sequencing: windows, conditions, capacity, rendering and the scheduler

mod business_hours;
mod capacity;
mod conditions;
mod manager;
mod scheduler;
mod template;

pub use business_hours::BusinessHoursGate;
pub use capacity::CapacityAllocator;
pub use conditions::{ConditionEvaluator, LINKEDIN_CONNECTED};
pub use manager::{CampaignError, CampaignManager};
pub use scheduler::{CycleReport, CycleSkip, EnrollmentOutcome, SequenceScheduler};
pub use template::{RenderContext, TemplateRenderer, TrackingLinks};
