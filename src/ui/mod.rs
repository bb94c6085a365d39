//! Front-end agnostic view models. Each one turns client state into what a
//! screen shows; the terminal front end prints them as text.

pub mod banner;
pub mod boundary;
pub mod buffer_list;
pub mod chat_view;
pub mod commit_progress;
pub mod crawl_form;

/// Badge text for the push channel state.
pub fn connectivity_badge(connected: bool) -> &'static str {
    if connected { "● live" } else { "○ offline (polling)" }
}
