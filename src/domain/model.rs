use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Reads a JSON value as a non-empty string; empty strings and non-strings count as absent.
fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Renders a field for display: strings verbatim, anything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A single `$pageview` event from the analytics API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageviewEvent {
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl PageviewEvent {
    pub fn pathname(&self) -> &str {
        non_empty_str(self.properties.get("$pathname")).unwrap_or("/")
    }

    pub fn utm_source(&self) -> Option<&str> {
        non_empty_str(self.properties.get("$utm_source"))
    }

    pub fn referring_domain(&self) -> Option<&str> {
        non_empty_str(self.properties.get("$referring_domain"))
    }

    pub fn gclid(&self) -> Option<&str> {
        non_empty_str(self.properties.get("gclid"))
    }

    /// `utm_source`, then the referring domain, then `direct`.
    pub fn traffic_source(&self) -> &str {
        self.utm_source()
            .or_else(|| self.referring_domain())
            .unwrap_or("direct")
    }

    /// Arrived through a paid Google ad.
    pub fn is_ad_click(&self) -> bool {
        self.gclid().is_some() || self.utm_source() == Some("google")
    }
}

/// One row of the CRM table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmRecord {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "createdTime", default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl CrmRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        non_empty_str(self.fields.get(name))
    }

    pub fn status(&self) -> &str {
        self.fields
            .get("Status")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn contact_type(&self) -> Option<&str> {
        self.field_str("Contact Type")
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_time.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Lead counts per pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCounts {
    #[serde(default)]
    pub new: u64,
    #[serde(default)]
    pub quoted: u64,
    #[serde(default)]
    pub booked: u64,
    #[serde(default)]
    pub no_go: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    New,
    Quoted,
    Booked,
    NoGo,
}

impl PipelineStage {
    /// Maps a CRM status label onto its stage. Unknown labels have no stage.
    pub fn from_status(status: &str) -> Option<Self> {
        match status {
            "New Request" => Some(Self::New),
            "talked to/ quoted" => Some(Self::Quoted),
            "Booked" | "Booked - Deposit" => Some(Self::Booked),
            "No Go" | "No Go - Coming to Town" | "No Go - Not Coming to Town" => Some(Self::NoGo),
            _ => None,
        }
    }
}

impl PipelineCounts {
    pub fn record(&mut self, stage: PipelineStage) {
        match stage {
            PipelineStage::New => self.new += 1,
            PipelineStage::Quoted => self.quoted += 1,
            PipelineStage::Booked => self.booked += 1,
            PipelineStage::NoGo => self.no_go += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.new + self.quoted + self.booked + self.no_go
    }

    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a str>) -> Self {
        let mut counts = Self::default();
        for stage in statuses.into_iter().filter_map(PipelineStage::from_status) {
            counts.record(stage);
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCount {
    pub url: String,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCount {
    pub source: String,
    pub sessions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowupLead {
    pub name: String,
    pub status: String,
    pub last_contact: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    #[serde(default)]
    pub top_pages: Vec<PageCount>,
    #[serde(default)]
    pub traffic_sources: Vec<SourceCount>,
    #[serde(default)]
    pub total_pageviews_7d: u64,
    #[serde(default)]
    pub avg_daily_pageviews: f64,
    #[serde(default)]
    pub ad_landing_pages: Vec<PageCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrmSummary {
    #[serde(default)]
    pub new_leads_7d: u64,
    #[serde(default)]
    pub pipeline: PipelineCounts,
    #[serde(default)]
    pub leads_needing_followup: Vec<FollowupLead>,
    #[serde(default)]
    pub total_pipeline_value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub opportunities: Vec<String>,
}

/// The collector's output and the analyzer's input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    #[serde(default)]
    pub generated_at: String,
    #[serde(default = "default_period_days")]
    pub period_days: u32,
    #[serde(default)]
    pub posthog: AnalyticsSummary,
    #[serde(default)]
    pub airtable: CrmSummary,
    #[serde(default)]
    pub insights: Insights,
}

fn default_period_days() -> u32 {
    7
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub priority: Priority,
    pub category: String,
    pub issue: String,
    pub solution: String,
    pub effort: String,
    pub expected_impact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalSet {
    pub generated_at: String,
    pub proposals: Vec<Proposal>,
}

/// Payload of the dashboard's `/api/data` endpoint. Sections that were not
/// fetched are left out of the JSON entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pageviews_7d: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_pages: Option<Vec<PageCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posthog_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_leads: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub airtable_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}
