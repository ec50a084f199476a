//! Step branch conditions

use crate::channels::CapabilityProbe;
use outreach_common::Result;
use outreach_storage::models::{Contact, Message, StepConditions};
use std::sync::Arc;

/// Capability asked of the channel driver for `skipIfLinkedinConnected`
pub const LINKEDIN_CONNECTED: &str = "linkedin_connected";

/// Evaluates a step's conditions against an enrollment's message history
#[derive(Clone)]
pub struct ConditionEvaluator {
    probe: Arc<dyn CapabilityProbe>,
}

impl ConditionEvaluator {
    pub fn new(probe: Arc<dyn CapabilityProbe>) -> Self {
        Self { probe }
    }

    /// The history-based part of the predicate; no I/O
    pub fn history_allows(conditions: &StepConditions, history: &[Message]) -> bool {
        if conditions.only_if_opened && !history.iter().any(|m| m.opened_at.is_some()) {
            return false;
        }
        if conditions.only_if_clicked && !history.iter().any(|m| m.clicked_at.is_some()) {
            return false;
        }
        if conditions.only_if_not_replied && history.iter().any(|m| m.replied_at.is_some()) {
            return false;
        }
        true
    }

    /// Whether the step should run. All declared conditions must hold.
    pub async fn evaluate(
        &self,
        conditions: &StepConditions,
        history: &[Message],
        contact: &Contact,
    ) -> Result<bool> {
        if conditions.is_empty() {
            return Ok(true);
        }
        if !Self::history_allows(conditions, history) {
            return Ok(false);
        }
        if conditions.skip_if_linkedin_connected
            && self.probe.has_capability(contact, LINKEDIN_CONNECTED).await?
        {
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::NoCapabilities;
    use crate::testing::{contact_row, message_row, FixedProbe};
    use chrono::Utc;

    #[test]
    fn test_no_conditions_always_proceed() {
        assert!(ConditionEvaluator::history_allows(
            &StepConditions::default(),
            &[]
        ));
    }

    #[test]
    fn test_only_if_opened() {
        let conditions = StepConditions {
            only_if_opened: true,
            ..Default::default()
        };
        let mut opened = message_row("t1");
        assert!(!ConditionEvaluator::history_allows(&conditions, &[opened.clone()]));

        opened.opened_at = Some(Utc::now());
        assert!(ConditionEvaluator::history_allows(&conditions, &[message_row("t0"), opened]));
    }

    #[test]
    fn test_only_if_not_replied_is_negated() {
        let conditions = StepConditions {
            only_if_not_replied: true,
            ..Default::default()
        };
        let mut replied = message_row("t1");
        assert!(ConditionEvaluator::history_allows(&conditions, &[replied.clone()]));

        replied.replied_at = Some(Utc::now());
        assert!(!ConditionEvaluator::history_allows(&conditions, &[replied]));
    }

    #[test]
    fn test_conditions_are_conjunctive() {
        let conditions = StepConditions {
            only_if_opened: true,
            only_if_clicked: true,
            ..Default::default()
        };
        let mut message = message_row("t1");
        message.opened_at = Some(Utc::now());
        assert!(!ConditionEvaluator::history_allows(&conditions, &[message.clone()]));

        message.clicked_at = Some(Utc::now());
        assert!(ConditionEvaluator::history_allows(&conditions, &[message]));
    }

    #[tokio::test]
    async fn test_skip_if_linkedin_connected_asks_driver() {
        let contact = contact_row("lead@example.org");
        let conditions = StepConditions {
            skip_if_linkedin_connected: true,
            ..Default::default()
        };

        let probe = Arc::new(FixedProbe::default());
        let evaluator = ConditionEvaluator::new(probe.clone());
        assert!(evaluator.evaluate(&conditions, &[], &contact).await.unwrap());

        probe.connected.lock().unwrap().push(contact.id);
        assert!(!evaluator.evaluate(&conditions, &[], &contact).await.unwrap());

        let without_driver = ConditionEvaluator::new(Arc::new(NoCapabilities));
        assert!(without_driver.evaluate(&conditions, &[], &contact).await.unwrap());
    }
}
