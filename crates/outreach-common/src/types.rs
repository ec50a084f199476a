//! Common types for the outreach engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for organizations
pub type OrganizationId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for campaign steps
pub type StepId = Uuid;

/// Unique identifier for contacts
pub type ContactId = Uuid;

/// Unique identifier for campaign enrollments (campaign contacts)
pub type EnrollmentId = Uuid;

/// Unique identifier for sending accounts
pub type AccountId = Uuid;

/// Unique identifier for messages
pub type MessageId = Uuid;

/// Unique identifier for queued jobs
pub type JobId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Outreach channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Linkedin,
    /// Only valid on campaigns: steps pick email or linkedin individually
    Multi,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Linkedin => write!(f, "linkedin"),
            Channel::Multi => write!(f, "multi"),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "linkedin" => Ok(Channel::Linkedin),
            "multi" => Ok(Channel::Multi),
            _ => Err(crate::Error::Validation(format!("Invalid channel: {}", s))),
        }
    }
}

/// Channel-driver action for LinkedIn-style steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelAction {
    Send,
    Connect,
    Visit,
}

impl std::fmt::Display for ChannelAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelAction::Send => write!(f, "send"),
            ChannelAction::Connect => write!(f, "connect"),
            ChannelAction::Visit => write!(f, "visit"),
        }
    }
}

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.trim().splitn(2, '@').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            Some(Self::new(parts[0], parts[1].to_lowercase()))
        } else {
            None
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid email address".to_string()))
    }
}
