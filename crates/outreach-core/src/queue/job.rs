//! Job payloads

use crate::warmup::WarmupSession;
use outreach_common::types::{AccountId, CampaignId, ChannelAction, ContactId};
use serde::{Deserialize, Serialize};

/// Worker category; each has its own concurrency limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobCategory {
    SequenceAdvance,
    Warmup,
    ChannelAction,
}

impl JobCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobCategory::SequenceAdvance => "sequence-advance",
            JobCategory::Warmup => "warmup",
            JobCategory::ChannelAction => "channel-action",
        }
    }
}

impl std::fmt::Display for JobCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{campaignId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceAdvanceJob {
    pub campaign_id: CampaignId,
}

/// `{accountId}`; `session` is carried between exchanges of one warmup day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupJob {
    pub account_id: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<WarmupSession>,
}

/// `{accountId, action, targetUrl, content, contactId, campaignId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelActionJob {
    pub account_id: AccountId,
    pub action: ChannelAction,
    pub target_url: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub contact_id: Option<ContactId>,
    #[serde(default)]
    pub campaign_id: Option<CampaignId>,
}

/// Everything the workers know how to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Job {
    SequenceAdvance(SequenceAdvanceJob),
    Warmup(WarmupJob),
    ChannelAction(ChannelActionJob),
}

impl Job {
    pub fn sequence_advance(campaign_id: CampaignId) -> Self {
        Job::SequenceAdvance(SequenceAdvanceJob { campaign_id })
    }

    pub fn warmup(account_id: AccountId) -> Self {
        Job::Warmup(WarmupJob {
            account_id,
            session: None,
        })
    }

    pub fn category(&self) -> JobCategory {
        match self {
            Job::SequenceAdvance(_) => JobCategory::SequenceAdvance,
            Job::Warmup(_) => JobCategory::Warmup,
            Job::ChannelAction(_) => JobCategory::ChannelAction,
        }
    }

    /// At most one live job per campaign cycle and per warming account
    pub fn dedupe_key(&self) -> Option<String> {
        match self {
            Job::SequenceAdvance(j) => Some(format!("sequence-advance:{}", j.campaign_id)),
            Job::Warmup(j) => Some(format!("warmup:{}", j.account_id)),
            Job::ChannelAction(_) => None,
        }
    }
}
