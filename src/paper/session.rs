//! The open → load → post-load chain and the other round trips of an open document.
//!
//! Every request that comes back with an error payload, fails in the
//! transport or is cancelled leaves the session closed and the document
//! cleared. There is no half-open state.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::paper::chapters::DocumentModel;
use crate::paper::document::ServerDocument;
use crate::paper::events::DocumentEvent;
use crate::paper::model::Color;
use crate::paper::surface::Surface;
use crate::paper::transport::{Direction, Focus, LoadRequest, Reply, Transport};

/// Page height used when the server reports none, for continuous documents.
pub const CONTINUOUS_PAGE_HEIGHT: f64 = 4000.0;

#[derive(Debug)]
pub enum SessionError {
    /// The server answered with an error payload.
    Protocol(Vec<String>),
    Cancelled,
    /// Another open or navigation is still in flight.
    Busy,
    Transport(anyhow::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Protocol(errors) => write!(f, "server error: {}", errors.join("; ")),
            SessionError::Cancelled => f.write_str("operation cancelled"),
            SessionError::Busy => f.write_str("another document operation is in progress"),
            SessionError::Transport(err) => write!(f, "transport failure: {err:#}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Transport(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Shared flag checked between the steps of a chain.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycle {
    Closed,
    Opening,
    Open,
    Navigating,
    Closing,
}

pub fn can_transition(from: SessionLifecycle, to: SessionLifecycle) -> bool {
    use SessionLifecycle::*;
    matches!(
        (from, to),
        (Closed, Opening)
            | (Open, Opening)
            | (Opening, Open)
            | (Opening, Closed)
            | (Open, Navigating)
            | (Navigating, Open)
            | (Navigating, Closed)
            | (Open, Closing)
            | (Closed, Closing)
            | (Closing, Closed)
    )
}

#[derive(Debug, Clone, PartialEq)]
struct OpenedReport {
    jrxml: String,
    locale: String,
}

pub struct DocumentSession<T: Transport, S: Surface> {
    transport: T,
    document: ServerDocument<S>,
    lifecycle: SessionLifecycle,
    cancel: CancellationToken,
    document_id: Option<String>,
    opened: Option<OpenedReport>,
    document_scale: Option<f64>,
}

impl<T: Transport, S: Surface> DocumentSession<T, S> {
    pub fn new(transport: T, document: ServerDocument<S>) -> Self {
        Self {
            transport,
            document,
            lifecycle: SessionLifecycle::Closed,
            cancel: CancellationToken::new(),
            document_id: None,
            opened: None,
            document_scale: None,
        }
    }

    pub fn document(&self) -> &ServerDocument<S> {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut ServerDocument<S> {
        &mut self.document
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn lifecycle(&self) -> SessionLifecycle {
        self.lifecycle
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    /// Token that aborts the chain in flight at its next step.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Opens the first chapter of `model`.
    pub async fn open(&mut self, model: DocumentModel) -> Result<(), SessionError> {
        self.ensure(SessionLifecycle::Opening)?;
        self.prepare(model);
        self.open_chapter(1, None).await
    }

    /// Opens the chapter built from `report` and highlights a parameter, or a
    /// field of `row`, once it is loaded.
    pub async fn open_and_highlight(
        &mut self,
        model: DocumentModel,
        report: &str,
        field: &str,
        row: Option<u32>,
    ) -> Result<(), SessionError> {
        self.ensure(SessionLifecycle::Opening)?;
        let chapter = model
            .chapter_for_report(report)
            .ok_or_else(|| SessionError::Protocol(vec![format!("no chapter uses report {report}")]))?;
        self.prepare(model);
        self.document.paging_mut().set_chapter_index(chapter);
        self.open_chapter(1, Some(highlight_command(field, row))).await
    }

    /// Shows document page `page`, counted across chapters from 1.
    pub async fn goto_page(&mut self, page: u32) -> Result<(), SessionError> {
        let Some((chapter, chapter_page)) = self
            .document
            .paging()
            .model()
            .and_then(|model| model.locate_page(page))
        else {
            tracing::debug!(page, "page outside the document");
            return Ok(());
        };
        if chapter != self.document.paging().chapter_index() {
            self.ensure(SessionLifecycle::Opening)?;
            self.document.paging_mut().set_chapter_index(chapter);
            return self.open_chapter(i64::from(chapter_page), None).await;
        }
        if self.document.paging().chapter_page().0 == chapter_page {
            return Ok(());
        }
        self.begin(SessionLifecycle::Navigating)?;
        let id = self.require_id()?;
        self.document.set_viewport(None);
        let reply = self.transport.goto_page(&id, chapter_page).await;
        self.settle(reply)?;
        self.lifecycle = SessionLifecycle::Open;
        Ok(())
    }

    /// Moves to the next chapter. Returns `false` on the last one.
    pub async fn next_chapter(&mut self) -> Result<bool, SessionError> {
        let paging = self.document.paging();
        let count = paging.model().map(|m| m.chapters.len()).unwrap_or(0);
        let next = paging.chapter_index() + 1;
        if next >= count {
            return Ok(false);
        }
        self.ensure(SessionLifecycle::Opening)?;
        self.document.paging_mut().set_chapter_index(next);
        self.open_chapter(1, None).await.map(|_| true)
    }

    /// Moves to the last page of the previous chapter. Returns `false` on the first one.
    pub async fn previous_chapter(&mut self) -> Result<bool, SessionError> {
        let current = self.document.paging().chapter_index();
        if current == 0 || self.document.paging().model().is_none() {
            return Ok(false);
        }
        self.ensure(SessionLifecycle::Opening)?;
        self.document.paging_mut().set_chapter_index(current - 1);
        self.open_chapter(-1, None).await.map(|_| true)
    }

    /// Resizes the canvas and tells the server the new scale.
    pub async fn set_zoom(&mut self, zoom: f64) -> Result<(), SessionError> {
        let Some(scale) = self.document.set_zoom(zoom) else {
            return Ok(());
        };
        if self.document_scale == Some(scale) {
            return Ok(());
        }
        let Some(id) = self.document_id.clone() else {
            return Ok(());
        };
        if self.lifecycle != SessionLifecycle::Open {
            return Ok(());
        }
        let reply = self.transport.set_scale(&id, scale).await;
        self.settle(reply)?;
        self.document_scale = Some(scale);
        Ok(())
    }

    /// Pointer released over the canvas at a CSS pixel offset.
    pub async fn click(
        &mut self,
        offset_x: f64,
        offset_y: f64,
        value: Option<&str>,
    ) -> Result<(), SessionError> {
        let Some((x, y)) = self.document.scale().pointer_to_server(offset_x, offset_y) else {
            return Ok(());
        };
        let id = self.require_id()?;
        let reply = self.transport.send_click(&id, x, y, value).await;
        self.settle(reply)?;
        Ok(())
    }

    /// Inserts a line after the band the context menu is attached to.
    pub async fn add_line(&mut self) -> Result<bool, SessionError> {
        let Some((kind, band_id)) = self.menu_band() else {
            return Ok(false);
        };
        let id = self.require_id()?;
        let reply = self.transport.add_band(&id, &kind, band_id).await;
        self.settle(reply)?;
        Ok(true)
    }

    /// Deletes the band the context menu is attached to.
    pub async fn remove_line(&mut self) -> Result<bool, SessionError> {
        let Some((kind, band_id)) = self.menu_band() else {
            return Ok(false);
        };
        let id = self.require_id()?;
        let reply = self.transport.delete_band(&id, &kind, band_id).await;
        self.settle(reply)?;
        Ok(true)
    }

    /// Sends the overlay's value and moves the caret.
    pub async fn commit_editor_value(
        &mut self,
        text: &str,
        direction: Direction,
    ) -> Result<(), SessionError> {
        let id = self.require_id()?;
        let reply = self.transport.set_text(&id, text, direction).await;
        self.settle(reply)?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), SessionError> {
        self.begin(SessionLifecycle::Closing)?;
        let result = match self.document_id.clone() {
            Some(id) => {
                let reply = self.transport.close_document(&id).await;
                flatten(reply).map(|_| ())
            }
            None => Ok(()),
        };
        self.clear();
        self.document.paging_mut().reset(None);
        result
    }

    /// Gives up on whatever is in flight and clears everything.
    pub fn abort(&mut self) {
        self.cancel.cancel();
        self.clear();
    }

    fn prepare(&mut self, model: DocumentModel) {
        let background = model
            .background_color
            .as_deref()
            .and_then(Color::from_hex)
            .unwrap_or(Color::WHITE);
        self.document.set_background(background);
        self.document.paging_mut().reset(Some(model));
    }

    async fn open_chapter(
        &mut self,
        page: i64,
        post_load: Option<String>,
    ) -> Result<(), SessionError> {
        self.begin(SessionLifecycle::Opening)?;
        self.cancel.reset();
        match self.open_chain(page, post_load).await {
            Ok(()) => {
                self.lifecycle = SessionLifecycle::Open;
                Ok(())
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    async fn open_chain(&mut self, page: i64, post_load: Option<String>) -> Result<(), SessionError> {
        let chapter = self
            .document
            .paging()
            .chapter()
            .cloned()
            .ok_or_else(|| SessionError::Protocol(vec!["document has no chapters".into()]))?;
        self.document.paging_mut().set_loading(true);
        self.document.set_editable(false);
        self.document.set_viewport(None);

        let page = if page == 0 { 1 } else { page };
        let focus = match (chapter.editable, page > 0) {
            (false, _) => Focus::None,
            (true, true) => Focus::Start,
            (true, false) => Focus::End,
        };

        let report = OpenedReport {
            jrxml: chapter.jrxml.clone(),
            locale: chapter.locale.clone(),
        };
        if self.opened.as_ref() != Some(&report) || self.document_id.is_none() {
            tracing::info!(jrxml = %chapter.jrxml, locale = %chapter.locale, "opening document");
            let reply = self
                .transport
                .open_document(&chapter)
                .await
                .map_err(SessionError::Transport)?;
            self.check_cancelled()?;
            let open = reply.into_result().map_err(SessionError::Protocol)?;
            let height = match open.page.height {
                Some(h) if h.is_finite() && h >= 0.0 => h,
                _ => CONTINUOUS_PAGE_HEIGHT,
            };
            self.transport.register_document(&open.id);
            self.document
                .configure_page(open.page.width, height, open.page.margins.right);
            self.document_id = Some(open.id);
            self.opened = Some(report);
        }

        let id = self.require_id()?;
        let scale = self.document.scale().document_to_canvas_scale();
        let request = LoadRequest {
            id: id.clone(),
            editable: chapter.editable,
            path: chapter.path.clone(),
            scale,
            focus,
            page,
        };
        tracing::info!(path = %request.path, page, scale, "loading document");
        let reply = self
            .transport
            .load_document(&request)
            .await
            .map_err(SessionError::Transport)?;
        self.check_cancelled()?;
        reply.into_result().map_err(SessionError::Protocol)?;

        self.document.set_editable(chapter.editable);
        self.document_scale = Some(scale);
        self.document.repaint_all();
        self.document.paging_mut().set_loading(false);
        let (page_width, page_height) = self.document.scale().page_size();
        self.document.push_event(DocumentEvent::Loaded {
            page_width,
            page_height,
            landscape: page_height < page_width,
        });

        if let Some(command) = post_load {
            let reply = self.transport.send_command(&id, &command).await;
            self.check_cancelled()?;
            flatten(reply)?;
        }
        Ok(())
    }

    fn ensure(&self, to: SessionLifecycle) -> Result<(), SessionError> {
        if can_transition(self.lifecycle, to) {
            Ok(())
        } else {
            Err(SessionError::Busy)
        }
    }

    fn begin(&mut self, to: SessionLifecycle) -> Result<(), SessionError> {
        self.ensure(to)?;
        self.lifecycle = to;
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        Ok(())
    }

    fn require_id(&self) -> Result<String, SessionError> {
        self.document_id
            .clone()
            .ok_or_else(|| SessionError::Protocol(vec!["no document is open".into()]))
    }

    fn menu_band(&self) -> Option<(String, i64)> {
        self.document
            .context_menu_band()
            .map(|band| (band.kind.clone(), band.id))
    }

    /// Converts a reply, clearing everything if it carries an error.
    fn settle(&mut self, reply: anyhow::Result<Reply<Value>>) -> Result<Value, SessionError> {
        let result = flatten(reply);
        if let Err(err) = &result {
            self.fail(err);
        }
        result
    }

    fn fail(&mut self, err: &SessionError) {
        tracing::warn!(error = %err, "document operation failed");
        self.clear();
        self.document.push_event(DocumentEvent::LoadError(err.to_string()));
    }

    fn clear(&mut self) {
        self.document.reset();
        self.document.set_editable(false);
        self.document.paging_mut().set_loading(false);
        self.document_id = None;
        self.opened = None;
        self.document_scale = None;
        self.lifecycle = SessionLifecycle::Closed;
    }
}

fn flatten(reply: anyhow::Result<Reply<Value>>) -> Result<Value, SessionError> {
    reply
        .map_err(SessionError::Transport)?
        .into_result()
        .map_err(SessionError::Protocol)
}

/// Server command that highlights a parameter, or a field when `row` is set.
pub fn highlight_command(field: &str, row: Option<u32>) -> String {
    match row.filter(|&r| r > 0) {
        Some(row) => format!("document highlight field \"{field}\",{row};"),
        None => format!("document highlight parameter \"{field}\";"),
    }
}
