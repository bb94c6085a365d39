//! Response shapes accepted from list endpoints.
//!
//! The backend returns lists either bare, wrapped in `data`, `items` or
//! `results`, or as an empty object. Everything is normalized to a `Vec<T>`
//! here so callers never inspect payload shapes themselves; any other shape
//! is a decode error.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
    Bare(Vec<T>),
    Data { data: Vec<T> },
    Items { items: Vec<T> },
    Results { results: Vec<T> },
    Empty(EmptyObject),
}

/// Matches `{}` and nothing else.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmptyObject {}

impl<T> ListEnvelope<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListEnvelope::Bare(v)
            | ListEnvelope::Data { data: v }
            | ListEnvelope::Items { items: v }
            | ListEnvelope::Results { results: v } => v,
            ListEnvelope::Empty(_) => Vec::new(),
        }
    }
}

/// Single-object responses, optionally wrapped in `data`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ItemEnvelope<T> {
    Data { data: T },
    Bare(T),
}

impl<T> ItemEnvelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            ItemEnvelope::Data { data } | ItemEnvelope::Bare(data) => data,
        }
    }
}

pub fn parse_list<T: DeserializeOwned>(value: Value) -> Result<Vec<T>, serde_json::Error> {
    serde_json::from_value::<ListEnvelope<T>>(value).map(ListEnvelope::into_vec)
}

pub fn parse_item<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value::<ItemEnvelope<T>>(value).map(ItemEnvelope::into_inner)
}
