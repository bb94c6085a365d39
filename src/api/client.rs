use crate::api::envelope::{parse_item, parse_list};
use crate::api::models::{
    AccessCode, AccessCodeUpdate, BufferData, BufferMetadata, CommitOutcome, Course, CourseUpdate,
    CrawlJob, EnrollmentImportSummary, Feedback, Message, PendingCommitsStatus, ReportDiff,
    ReportHistoryEntry, ReportVersion, SupportAction, SupportRequest,
};
use crate::error::{Error, Result};
use reqwest::Client as HttpClient;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub http: HttpClient,
    base_api: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let http = HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?;
        Self::with_http(http, base_url, token)
    }

    pub fn with_http(http: HttpClient, base_url: &str, token: Option<String>) -> Result<Self> {
        let base = Self::base_api(base_url);
        let base_api = Url::parse(&base).map_err(|e| Error::InvalidUrl(format!("{}: {}", base, e)))?;
        if base_api.cannot_be_a_base() {
            return Err(Error::InvalidUrl(base));
        }
        Ok(Self { http, base_api, token })
    }

    fn base_api(base_url: &str) -> String {
        let trimmed = base_url.trim_end_matches('/');
        if trimmed.ends_with("/api") { trimmed.to_string() } else { format!("{}/api", trimmed) }
    }

    /// Appends `segments` to the API root. Each one is percent-encoded, so
    /// ids containing `/`, `?` or `#` stay a single path segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_api.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.header("Authorization", format!("Bearer {}", t)),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Value> {
        let resp = self.with_auth(req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status { status: status.as_u16(), body: body.trim().to_string() });
        }
        let bytes = resp.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &[&str]) -> Result<Vec<T>> {
        let json = self.send(self.http.get(self.url(path))).await?;
        Ok(parse_list(json)?)
    }

    async fn get_item<T: DeserializeOwned>(&self, path: &[&str]) -> Result<T> {
        let json = self.send(self.http.get(self.url(path))).await?;
        Ok(parse_item(json)?)
    }

    async fn post_item<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &[&str], body: &B) -> Result<T> {
        let json = self.send(self.http.post(self.url(path)).json(body)).await?;
        Ok(parse_item(json)?)
    }

    async fn put_item<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &[&str], body: &B) -> Result<T> {
        let json = self.send(self.http.put(self.url(path)).json(body)).await?;
        Ok(parse_item(json)?)
    }

    pub async fn ping(&self) -> Result<()> {
        self.send(self.http.get(self.url(&["health"]))).await.map(|_| ())
    }

    // Training review

    pub async fn pending_buffers(&self) -> Result<Vec<BufferMetadata>> {
        self.get_list(&["training", "buffers", "pending"]).await
    }

    pub async fn pending_commits(&self) -> Result<PendingCommitsStatus> {
        self.get_item(&["training", "commits", "pending"]).await
    }

    pub async fn buffer(&self, job_id: &str) -> Result<BufferData> {
        self.get_item(&["training", "buffers", job_id]).await
    }

    pub async fn commit_buffer(&self, job_id: &str) -> Result<CommitOutcome> {
        self.post_item(&["training", "buffers", job_id, "commit"], &serde_json::json!({})).await
    }

    pub async fn discard_buffer(&self, job_id: &str) -> Result<()> {
        let url = self.url(&["training", "buffers", job_id, "discard"]);
        self.send(self.http.post(url)).await.map(|_| ())
    }

    pub async fn submit_feedback(&self, job_id: &str, feedback: &Feedback) -> Result<()> {
        let url = self.url(&["training", "buffers", job_id, "feedback"]);
        self.send(self.http.post(url).json(feedback)).await.map(|_| ())
    }

    pub async fn submit_crawl(&self, url: &str) -> Result<CrawlJob> {
        self.post_item(&["training", "crawl"], &serde_json::json!({ "url": url })).await
    }

    // Messaging

    pub async fn conversation_messages(&self, peer_id: &str) -> Result<Vec<Message>> {
        self.get_list(&["messages", "conversation", peer_id]).await
    }

    pub async fn delete_message(&self, message_id: &str) -> Result<()> {
        let url = self.url(&["messages", message_id]);
        self.send(self.http.delete(url)).await.map(|_| ())
    }

    // Support desk

    pub async fn support_requests(&self) -> Result<Vec<SupportRequest>> {
        self.get_list(&["support", "requests"]).await
    }

    pub async fn update_support_request(&self, id: &str, action: SupportAction) -> Result<SupportRequest> {
        self.post_item(&["support", "requests", id, action.as_path()], &serde_json::json!({})).await
    }

    // Courses and access codes

    pub async fn courses(&self) -> Result<Vec<Course>> {
        self.get_list(&["courses"]).await
    }

    pub async fn update_course(&self, id: &str, update: &CourseUpdate) -> Result<Course> {
        self.put_item(&["courses", id], update).await
    }

    pub async fn access_codes(&self, course_id: &str) -> Result<Vec<AccessCode>> {
        self.get_list(&["courses", course_id, "access-codes"]).await
    }

    pub async fn update_access_code(&self, id: &str, update: &AccessCodeUpdate) -> Result<AccessCode> {
        self.put_item(&["access-codes", id], update).await
    }

    /// Uploads an enrollment spreadsheet (CSV or XLSX) for `course_id`.
    pub async fn import_enrollments(
        &self,
        course_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<EnrollmentImportSummary> {
        let mime = if file_name.to_ascii_lowercase().ends_with(".csv") {
            "text/csv"
        } else {
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        };
        let part = Part::bytes(bytes).file_name(file_name.to_string()).mime_str(mime)?;
        let form = Form::new().part("file", part);
        let url = self.url(&["courses", course_id, "enrollments", "import"]);
        let json = self.send(self.http.post(url).multipart(form)).await?;
        Ok(parse_item(json)?)
    }

    // Reports

    pub async fn report_history(&self, report_id: &str) -> Result<Vec<ReportHistoryEntry>> {
        self.get_list(&["reports", report_id, "history"]).await
    }

    pub async fn report_versions(&self, report_id: &str) -> Result<Vec<ReportVersion>> {
        self.get_list(&["reports", report_id, "versions"]).await
    }

    pub async fn report_diff(&self, report_id: &str, from: u32, to: u32) -> Result<ReportDiff> {
        let mut url = self.url(&["reports", report_id, "diff"]);
        url.query_pairs_mut().append_pair("from", &from.to_string()).append_pair("to", &to.to_string());
        let json = self.send(self.http.get(url)).await?;
        Ok(parse_item(json)?)
    }
}
