use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Servers are inconsistent about numeric vs string ids; both map to a string.
fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        S(String),
        N(i64),
    }
    Ok(match Id::deserialize(d)? {
        Id::S(s) => s,
        Id::N(n) => n.to_string(),
    })
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(deserialize_with = "id_string")]
    pub sender_id: String,
    #[serde(deserialize_with = "id_string")]
    pub receiver_id: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
    /// Echo of the sender's temporary id, when the server provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_temp_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BufferMetadata {
    pub job_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BufferPage {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BufferData {
    #[serde(flatten)]
    pub metadata: BufferMetadata,
    #[serde(default)]
    pub pages: Vec<BufferPage>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingCommitsStatus {
    pub pending_count: u32,
    pub threshold: u32,
    #[serde(default)]
    pub ready_for_version: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CommitOutcome {
    pub job_id: String,
    #[serde(default)]
    pub version_id: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Feedback {
    pub positive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CrawlJob {
    pub job_id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SupportStatus {
    Open,
    Accepted,
    Rejected,
    Resolved,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SupportRequest {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub requester: String,
    pub subject: String,
    pub status: SupportStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportAction {
    Accept,
    Reject,
    Resolve,
}

impl SupportAction {
    pub fn as_path(self) -> &'static str {
        match self {
            SupportAction::Accept => "accept",
            SupportAction::Reject => "reject",
            SupportAction::Resolve => "resolve",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Course {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct CourseUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AccessCode {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(deserialize_with = "id_string")]
    pub course_id: String,
    pub code: String,
    #[serde(default)]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub uses: u32,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct AccessCodeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct EnrollmentImportSummary {
    #[serde(default)]
    pub imported: u32,
    #[serde(default)]
    pub skipped: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReportHistoryEntry {
    pub version: u32,
    pub action: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReportVersion {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Added,
    Removed,
    Unchanged,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DiffLine {
    pub kind: DiffKind,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReportDiff {
    pub from: u32,
    pub to: u32,
    #[serde(default)]
    pub lines: Vec<DiffLine>,
}
