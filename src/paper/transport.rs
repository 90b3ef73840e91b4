//! Requests a session makes to the document server and the replies it expects.
//!
//! The transport itself (a websocket in production) lives in the host. Paint
//! and notification messages for an open document are delivered by the host
//! straight to [`crate::paper::document::ServerDocument::handle_message`].

#![allow(async_fn_in_trait)]

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::paper::chapters::Chapter;

/// A server reply: either the payload or a list of error messages.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Reply<T> {
    Errors { errors: Vec<String> },
    Ack(T),
}

impl<T> Reply<T> {
    pub fn into_result(self) -> std::result::Result<T, Vec<String>> {
        match self {
            Reply::Ack(value) => Ok(value),
            Reply::Errors { errors } => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Default)]
pub struct Margins {
    #[serde(default)]
    pub top: f64,
    #[serde(default)]
    pub left: f64,
    #[serde(default)]
    pub bottom: f64,
    #[serde(default)]
    pub right: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PageGeometry {
    pub width: f64,
    /// Missing for continuous documents.
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub margins: Margins,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OpenResponse {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub page: PageGeometry,
}

/// Where the server should put the caret after loading.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Focus {
    Start,
    End,
    None,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoadRequest {
    pub id: String,
    pub editable: bool,
    pub path: String,
    pub scale: f64,
    pub focus: Focus,
    /// Chapter page to show; negative counts from the end.
    pub page: i64,
}

/// Cursor direction sent along with a committed value.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

pub trait Transport {
    async fn open_document(&mut self, chapter: &Chapter) -> Result<Reply<OpenResponse>>;
    /// Asks the host to route `D:`/`n:` messages for `id` to this document.
    fn register_document(&mut self, id: &str);
    async fn load_document(&mut self, request: &LoadRequest) -> Result<Reply<Value>>;
    async fn set_scale(&mut self, id: &str, scale: f64) -> Result<Reply<Value>>;
    async fn goto_page(&mut self, id: &str, page: u32) -> Result<Reply<Value>>;
    async fn send_click(
        &mut self,
        id: &str,
        x: f64,
        y: f64,
        value: Option<&str>,
    ) -> Result<Reply<Value>>;
    async fn close_document(&mut self, id: &str) -> Result<Reply<Value>>;
    async fn send_command(&mut self, id: &str, command: &str) -> Result<Reply<Value>>;
    async fn add_band(&mut self, id: &str, kind: &str, band_id: i64) -> Result<Reply<Value>>;
    async fn delete_band(&mut self, id: &str, kind: &str, band_id: i64) -> Result<Reply<Value>>;
    async fn set_text(
        &mut self,
        id: &str,
        text: &str,
        direction: Direction,
    ) -> Result<Reply<Value>>;
}

fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "document id must be a string or number, got {other}"
        ))),
    }
}
