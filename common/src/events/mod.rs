use std::fmt;

use serde::{Deserialize, Serialize};

pub mod enriched_event;
pub mod ticket_event;

pub use enriched_event::{decode_enriched, encode_enriched, Citation, EnrichedEvent};
pub use ticket_event::{decode_ticket, TicketEvent};

/// Wire-format version shared by ticket and enriched events.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// Closed category set for enriched tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    AccountAccess,
    Billing,
    SecurityIncident,
    DataRefresh,
    Exports,
    FeatureRequest,
    Integration,
    Notifications,
    General,
}

impl Category {
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "account_access" => Some(Self::AccountAccess),
            "billing" => Some(Self::Billing),
            "security_incident" => Some(Self::SecurityIncident),
            "data_refresh" => Some(Self::DataRefresh),
            "exports" => Some(Self::Exports),
            "feature_request" => Some(Self::FeatureRequest),
            "integration" => Some(Self::Integration),
            "notifications" => Some(Self::Notifications),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Self::AccountAccess => "account_access",
            Self::Billing => "billing",
            Self::SecurityIncident => "security_incident",
            Self::DataRefresh => "data_refresh",
            Self::Exports => "exports",
            Self::FeatureRequest => "feature_request",
            Self::Integration => "integration",
            Self::Notifications => "notifications",
            Self::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Closed sentiment set for enriched tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// The normalized LLM annotation committed to the store and published
/// downstream. Field bounds are enforced by the normalizer before anything
/// reaches this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub summary: String,
    pub category: Category,
    pub sentiment: Sentiment,
    pub risk: f64,
    pub suggested_reply: String,
}
