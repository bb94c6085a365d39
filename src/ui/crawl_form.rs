use crate::api::models::CrawlJob;
use crate::error::Result;
use crate::sync::review::ReviewBackend;
use crate::utils::is_valid_http_url;

pub const INVALID_URL_TEXT: &str = "Please enter a valid HTTP or HTTPS URL";

/// "New crawl" form. Invalid input disables submission instead of erroring.
#[derive(Debug, Default)]
pub struct CrawlForm {
    url: String,
    submitting: bool,
}

impl CrawlForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Inline error text. Empty input shows nothing, it is just not submittable.
    pub fn error(&self) -> Option<&'static str> {
        if self.url.trim().is_empty() || is_valid_http_url(&self.url) {
            None
        } else {
            Some(INVALID_URL_TEXT)
        }
    }

    pub fn can_submit(&self) -> bool {
        !self.submitting && is_valid_http_url(&self.url)
    }

    /// Returns Ok(None) without contacting the server when the form cannot
    /// be submitted. The field is cleared after a successful submission.
    pub async fn submit<B: ReviewBackend + ?Sized>(&mut self, backend: &B) -> Result<Option<CrawlJob>> {
        if !self.can_submit() {
            return Ok(None);
        }
        self.submitting = true;
        let result = backend.submit_crawl(self.url.trim()).await;
        self.submitting = false;
        let job = result?;
        log::info!("crawl {} queued for {}", job.job_id, self.url.trim());
        self.url.clear();
        Ok(Some(job))
    }
}
