//! Campaign backend collaborator
//!
//! The backend owns the telephony account: it places server-side IVR calls,
//! reports their status, redirects live calls, and lists the caller-ID
//! numbers the operator may dial from. [`HttpBackend`](crate::http::HttpBackend)
//! talks to the real REST API; tests supply their own implementations.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::CampaignConfig;
use crate::contact::{CallOutcome, Contact};
use crate::error::DialerResult;

/// Backend identifier for a placed call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallSid(pub String);

impl CallSid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallSid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// IVR script carried by a server-side call or a power-dialer connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IvrScript {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_music_url: Option<String>,
    pub record: bool,
}

impl IvrScript {
    /// Snapshot the script fields of the campaign
    pub fn from_campaign(campaign: &CampaignConfig) -> Self {
        Self {
            message: campaign.intro_message.clone(),
            ai_prompt: campaign.ai_prompt.clone(),
            forward_number: campaign.forward_number.clone(),
            agent_number: campaign.agent_number.clone(),
            hold_music_url: campaign.hold_music_url.clone(),
            record: campaign.record,
        }
    }
}

/// Request body for a single server-side IVR call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IvrCallRequest {
    pub to: String,
    pub from: String,
    pub contact_name: String,
    #[serde(flatten)]
    pub script: IvrScript,
}

impl IvrCallRequest {
    pub fn new(contact: &Contact, from: impl Into<String>, script: IvrScript) -> Self {
        Self {
            to: contact.phone.clone(),
            from: from.into(),
            contact_name: contact.name.clone(),
            script,
        }
    }
}

/// Request body for redirecting a live call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectRequest {
    /// Number the call is redirected to
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_music_url: Option<String>,
    pub record: bool,
}

/// A caller-ID number available to the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FromNumber {
    pub number: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// Status of a server-side call as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCallStatus {
    Queued,
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Failed,
    Busy,
    NoAnswer,
    Canceled,
    Other(String),
}

impl RemoteCallStatus {
    /// Parse the backend's status string
    pub fn parse(status: &str) -> Self {
        match status.trim().to_lowercase().replace('_', "-").as_str() {
            "queued" => Self::Queued,
            "initiated" => Self::Initiated,
            "ringing" => Self::Ringing,
            "in-progress" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "busy" => Self::Busy,
            "no-answer" => Self::NoAnswer,
            "canceled" | "cancelled" => Self::Canceled,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the call will not change status again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Busy | Self::NoAnswer | Self::Canceled
        )
    }

    /// Outcome for terminal statuses
    pub fn outcome(&self) -> Option<CallOutcome> {
        match self {
            Self::Completed => Some(CallOutcome::Completed),
            Self::Failed => Some(CallOutcome::Failed("call failed".to_string())),
            Self::Busy => Some(CallOutcome::Failed("line busy".to_string())),
            Self::NoAnswer => Some(CallOutcome::Failed("no answer".to_string())),
            Self::Canceled => Some(CallOutcome::Failed("call canceled".to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Initiated => "initiated",
            Self::Ringing => "ringing",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Busy => "busy",
            Self::NoAnswer => "no-answer",
            Self::Canceled => "canceled",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for RemoteCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// REST operations the sequencer and console need from the backend
#[async_trait]
pub trait CampaignBackend: Send + Sync {
    /// Place one server-side IVR call
    async fn dispatch_call(&self, request: &IvrCallRequest) -> DialerResult<CallSid>;

    /// Current status of a placed call
    async fn call_status(&self, sid: &CallSid) -> DialerResult<RemoteCallStatus>;

    /// Redirect a live call to another number
    async fn redirect_call(&self, sid: &CallSid, request: &RedirectRequest) -> DialerResult<()>;

    /// Caller-ID numbers available to the account
    async fn list_from_numbers(&self) -> DialerResult<Vec<FromNumber>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::ContactId;

    #[test]
    fn test_status_parsing() {
        assert_eq!(RemoteCallStatus::parse("in-progress"), RemoteCallStatus::InProgress);
        assert_eq!(RemoteCallStatus::parse("NO_ANSWER"), RemoteCallStatus::NoAnswer);
        assert_eq!(RemoteCallStatus::parse("cancelled"), RemoteCallStatus::Canceled);
        assert_eq!(
            RemoteCallStatus::parse("transferring"),
            RemoteCallStatus::Other("transferring".to_string())
        );
    }

    #[test]
    fn test_terminal_statuses_have_outcomes() {
        for status in ["completed", "failed", "busy", "no-answer", "canceled"] {
            let status = RemoteCallStatus::parse(status);
            assert!(status.is_terminal());
            assert!(status.outcome().is_some());
        }
        for status in ["queued", "initiated", "ringing", "in-progress", "weird"] {
            let status = RemoteCallStatus::parse(status);
            assert!(!status.is_terminal());
            assert!(status.outcome().is_none());
        }
        assert_eq!(RemoteCallStatus::Completed.outcome(), Some(CallOutcome::Completed));
    }

    #[test]
    fn test_call_request_body() {
        let contact = Contact::new(ContactId(1), "Ada", "+15551234567", "5551234567");
        let campaign = CampaignConfig::new()
            .with_intro_message("Hello")
            .with_agent_number("+15550009999");
        let script = IvrScript::from_campaign(&campaign);
        let request = IvrCallRequest::new(&contact, "+15550001111", script);

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["to"], "+15551234567");
        assert_eq!(body["from"], "+15550001111");
        assert_eq!(body["message"], "Hello");
        assert_eq!(body["agent_number"], "+15550009999");
        assert!(body.get("forward_number").is_none());
    }
}
