use crate::error::Error;

/// Inline error banner with a manual retry action.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorBanner {
    message: Option<String>,
}

impl ErrorBanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, err: &Error) {
        self.message = Some(err.user_message());
    }

    pub fn show_text(&mut self, text: impl Into<String>) {
        self.message = Some(text.into());
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_visible(&self) -> bool {
        self.message.is_some()
    }

    pub fn dismiss(&mut self) {
        self.message = None;
    }

    /// Runs `action` again. The banner hides while it runs and comes back
    /// with the new error if it fails a second time.
    pub async fn retry<T, F, Fut>(&mut self, action: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        self.dismiss();
        match action().await {
            Ok(v) => Some(v),
            Err(e) => {
                self.show(&e);
                None
            }
        }
    }

    pub fn render(&self) -> Option<String> {
        self.message.as_ref().map(|m| format!("! {}  [r]etry", m))
    }
}
