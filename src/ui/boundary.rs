use std::panic::{AssertUnwindSafe, catch_unwind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered<T> {
    Ok(T),
    /// A render panicked; holds the panic message.
    Crashed(String),
}

/// Last line of defence for view rendering. A panic inside `render` is
/// caught and the view switches to a fallback offering "try again"
/// (state reset to default) or a full reload (state rebuilt from scratch).
pub struct ErrorBoundary<S> {
    state: S,
    crashed: Option<String>,
    reload: Box<dyn Fn() -> S + Send>,
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown error".to_string()
    }
}

impl<S: Default> ErrorBoundary<S> {
    pub fn new<F>(reload: F) -> Self
    where
        F: Fn() -> S + Send + 'static,
    {
        Self { state: reload(), crashed: None, reload: Box::new(reload) }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn crashed(&self) -> Option<&str> {
        self.crashed.as_deref()
    }

    /// Renders unless a previous render crashed; in that case the fallback
    /// stays up until `try_again` or `reload`.
    pub fn render<T>(&mut self, render: impl FnOnce(&mut S) -> T) -> Rendered<T> {
        if let Some(reason) = &self.crashed {
            return Rendered::Crashed(reason.clone());
        }
        let state = &mut self.state;
        match catch_unwind(AssertUnwindSafe(|| render(state))) {
            Ok(out) => Rendered::Ok(out),
            Err(payload) => {
                let reason = panic_text(payload.as_ref());
                log::error!("view crashed: {}", reason);
                self.crashed = Some(reason.clone());
                Rendered::Crashed(reason)
            }
        }
    }

    pub fn try_again(&mut self) {
        self.state = S::default();
        self.crashed = None;
    }

    pub fn reload(&mut self) {
        self.state = (self.reload)();
        self.crashed = None;
    }
}
