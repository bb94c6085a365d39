use crate::api::models::BufferMetadata;
use crate::sync::review::{BufferReview, ReviewBackend};
use crate::ui::commit_progress::CommitProgress;

pub const EMPTY_TEXT: &str = "No pending buffers";

pub struct BufferList;

impl BufferList {
    pub fn row(buffer: &BufferMetadata, busy: bool) -> String {
        let mut row = format!("{}  {}  {} pages  [{}]", buffer.job_id, buffer.url, buffer.page_count, buffer.status);
        if busy {
            row.push_str("  …");
        }
        row
    }

    pub fn render<B: ReviewBackend>(review: &BufferReview<B>) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(status) = review.commits() {
            let progress = CommitProgress::from(status);
            lines.push(format!("{} {}", progress.bar(20), progress.label));
        }
        if review.buffers().is_empty() {
            lines.push(EMPTY_TEXT.to_string());
        }
        for b in review.buffers() {
            lines.push(Self::row(b, review.is_busy(&b.job_id)));
        }
        if let Some(err) = review.error() {
            lines.push(format!("! {}", err));
        }
        lines
    }
}
