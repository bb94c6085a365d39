use crate::api::models::PendingCommitsStatus;

pub const READY_TEXT: &str = "Ready to create version";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Still collecting commits.
    Blue,
    /// Enough commits for a new version.
    Emerald,
}

impl Tone {
    pub fn css_class(self) -> &'static str {
        match self {
            Tone::Blue => "bg-blue-500",
            Tone::Emerald => "bg-emerald-500",
        }
    }
}

/// Progress bar towards the next model version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitProgress {
    pub percent: u8,
    pub tone: Tone,
    pub label: String,
}

impl From<PendingCommitsStatus> for CommitProgress {
    fn from(status: PendingCommitsStatus) -> Self {
        let ready = status.ready_for_version || (status.threshold > 0 && status.pending_count >= status.threshold);
        let percent = if ready {
            100
        } else if status.threshold == 0 {
            0
        } else {
            (u64::from(status.pending_count) * 100 / u64::from(status.threshold)).min(100) as u8
        };
        let label = if ready {
            READY_TEXT.to_string()
        } else {
            format!("{} / {} commits until next version", status.pending_count, status.threshold)
        };
        Self { percent, tone: if ready { Tone::Emerald } else { Tone::Blue }, label }
    }
}

impl CommitProgress {
    /// Fixed-width text bar for terminals.
    pub fn bar(&self, width: usize) -> String {
        let filled = width * usize::from(self.percent) / 100;
        format!("[{}{}] {:>3}%", "#".repeat(filled), "-".repeat(width - filled), self.percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(pending: u32, threshold: u32, ready: bool) -> PendingCommitsStatus {
        PendingCommitsStatus { pending_count: pending, threshold, ready_for_version: ready }
    }

    #[test]
    fn full_threshold_is_ready() {
        let p = CommitProgress::from(status(5, 5, false));
        assert_eq!(p.percent, 100);
        assert_eq!(p.tone, Tone::Emerald);
        assert_eq!(p.tone.css_class(), "bg-emerald-500");
        assert_eq!(p.label, "Ready to create version");
    }

    #[test]
    fn partial_progress() {
        let p = CommitProgress::from(status(2, 5, false));
        assert_eq!(p.percent, 40);
        assert_eq!(p.tone, Tone::Blue);
        assert_eq!(p.label, "2 / 5 commits until next version");
        assert_eq!(p.bar(10), "[####------]  40%");
    }

    #[test]
    fn overshoot_and_zero_threshold() {
        assert_eq!(CommitProgress::from(status(9, 5, false)).percent, 100);
        assert_eq!(CommitProgress::from(status(0, 0, false)).percent, 0);
        assert_eq!(CommitProgress::from(status(1, 10, true)).tone, Tone::Emerald);
    }
}
