//! Multi-chapter documents and the page numbering across them.

use serde::{Deserialize, Serialize};

use crate::paper::events::DocumentEvent;

pub const DEFAULT_LOCALE: &str = "pt_PT";

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

fn default_page_count() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    pub path: String,
    pub jrxml: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub editable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<String>,
    #[serde(default = "default_page_count", rename = "pageCount")]
    pub page_count: u32,
}

impl Chapter {
    /// Report name without any directory prefix.
    pub fn report_name(&self) -> &str {
        match self.jrxml.rfind('/') {
            Some(idx) => &self.jrxml[idx + 1..],
            None => &self.jrxml,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DocumentModel {
    pub chapters: Vec<Chapter>,
    #[serde(default, rename = "backgroundColor", skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

impl DocumentModel {
    pub fn total_pages(&self) -> u32 {
        self.chapters.iter().map(|c| c.page_count.max(1)).sum()
    }

    /// Maps a 1-based document page to `(chapter index, chapter page)`.
    pub fn locate_page(&self, page: u32) -> Option<(usize, u32)> {
        let mut first = 1;
        for (idx, chapter) in self.chapters.iter().enumerate() {
            let count = chapter.page_count.max(1);
            if page >= first && page < first + count {
                return Some((idx, 1 + page - first));
            }
            first += count;
        }
        None
    }

    pub fn chapter_for_report(&self, report: &str) -> Option<usize> {
        self.chapters.iter().position(|c| c.report_name() == report)
    }
}

/// Page bookkeeping of an open document.
#[derive(Debug, Clone, Default)]
pub struct Paging {
    model: Option<DocumentModel>,
    chapter_index: usize,
    chapter_page: (u32, u32),
    page_number: u32,
    total_pages: u32,
    loading: bool,
}

impl Paging {
    pub fn reset(&mut self, model: Option<DocumentModel>) {
        self.total_pages = model.as_ref().map(DocumentModel::total_pages).unwrap_or(0);
        self.model = model;
        self.chapter_index = 0;
        self.chapter_page = (0, 0);
        self.page_number = 1;
    }

    pub fn model(&self) -> Option<&DocumentModel> {
        self.model.as_ref()
    }

    pub fn chapter(&self) -> Option<&Chapter> {
        self.model.as_ref()?.chapters.get(self.chapter_index)
    }

    pub fn chapter_index(&self) -> usize {
        self.chapter_index
    }

    pub fn set_chapter_index(&mut self, idx: usize) {
        self.chapter_index = idx;
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// `(page, count)` of the open chapter as last reported by `kp`.
    pub fn chapter_page(&self) -> (u32, u32) {
        self.chapter_page
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Records a `kp` report. Returns the event to raise if anything changed.
    pub fn set_chapter_page(&mut self, number: u32, count: u32) -> Option<DocumentEvent> {
        if self.chapter_page == (number, count) {
            return None;
        }
        self.chapter_page = (number, count);
        Some(DocumentEvent::ChapterPage { number, count })
    }

    /// New page count for the open chapter.
    pub fn update_page_count(&mut self, count: u32) -> Option<DocumentEvent> {
        let idx = self.chapter_index;
        let chapter = self.model.as_mut()?.chapters.get_mut(idx)?;
        let previous = self.total_pages;
        self.total_pages = self.total_pages - chapter.page_count.max(1) + count.max(1);
        chapter.page_count = count;
        (self.total_pages != previous && !self.loading)
            .then_some(DocumentEvent::PageCount(self.total_pages))
    }

    /// New page number inside the open chapter.
    pub fn update_page_number(&mut self, chapter_page: u32) -> Option<DocumentEvent> {
        let model = self.model.as_ref()?;
        let before: u32 = model
            .chapters
            .iter()
            .take(self.chapter_index)
            .map(|c| c.page_count.max(1))
            .sum();
        self.page_number = before + chapter_page;
        (!self.loading).then_some(DocumentEvent::PageNumber(self.page_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> DocumentModel {
        serde_json::from_str(
            r#"{"chapters":[
                {"path":"invoices/1","jrxml":"reports/invoice","pageCount":3},
                {"path":"invoices/1","jrxml":"annex","locale":"en_GB","editable":true}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn chapter_defaults() {
        let m = model();
        assert_eq!(m.chapters[0].locale, "pt_PT");
        assert!(!m.chapters[0].editable);
        assert_eq!(m.chapters[1].page_count, 1);
        assert!(m.chapters[1].editable);
        assert_eq!(m.total_pages(), 4);
    }

    #[test]
    fn pages_map_to_chapters() {
        let m = model();
        assert_eq!(m.locate_page(1), Some((0, 1)));
        assert_eq!(m.locate_page(3), Some((0, 3)));
        assert_eq!(m.locate_page(4), Some((1, 1)));
        assert_eq!(m.locate_page(5), None);
        assert_eq!(m.locate_page(0), None);
    }

    #[test]
    fn reports_are_matched_by_file_name() {
        let m = model();
        assert_eq!(m.chapter_for_report("invoice"), Some(0));
        assert_eq!(m.chapter_for_report("annex"), Some(1));
        assert_eq!(m.chapter_for_report("reports/invoice"), None);
    }

    #[test]
    fn page_updates_raise_events_unless_loading() {
        let mut paging = Paging::default();
        paging.reset(Some(model()));
        paging.set_chapter_index(1);
        assert_eq!(paging.update_page_count(2), Some(DocumentEvent::PageCount(5)));
        assert_eq!(paging.update_page_count(2), None);
        assert_eq!(paging.update_page_number(2), Some(DocumentEvent::PageNumber(5)));

        paging.set_loading(true);
        assert_eq!(paging.update_page_count(6), None);
        assert_eq!(paging.total_pages(), 9);
        assert_eq!(paging.update_page_number(1), None);
        assert_eq!(paging.page_number(), 4);
    }

    #[test]
    fn chapter_page_changes_only_once() {
        let mut paging = Paging::default();
        assert_eq!(
            paging.set_chapter_page(1, 3),
            Some(DocumentEvent::ChapterPage { number: 1, count: 3 })
        );
        assert_eq!(paging.set_chapter_page(1, 3), None);
    }
}
