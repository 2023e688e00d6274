//! The total is eventually consistent: until every page has reported, a page
//! arriving late shifts the global index of every match after it. Callers
//! holding a global index across reports should re-resolve it.

use crate::error::TextLayerError;
use crate::search::Match;

#[derive(Debug, Clone)]
pub struct PageMatches {
    pub page_number: usize,
    pub matches: Vec<Match>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchNavigator {
    pages: Vec<PageMatches>,
}

impl SearchNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report_page_matches(&mut self, page_number: usize, matches: Vec<Match>) {
        match self
            .pages
            .binary_search_by_key(&page_number, |page| page.page_number)
        {
            Ok(pos) => self.pages[pos].matches = matches,
            Err(pos) => self.pages.insert(
                pos,
                PageMatches {
                    page_number,
                    matches,
                },
            ),
        }
    }

    pub fn remove_page(&mut self, page_number: usize) -> Option<PageMatches> {
        self.pages
            .binary_search_by_key(&page_number, |page| page.page_number)
            .ok()
            .map(|pos| self.pages.remove(pos))
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn pages(&self) -> &[PageMatches] {
        &self.pages
    }

    pub fn page_matches(&self, page_number: usize) -> &[Match] {
        self.pages
            .binary_search_by_key(&page_number, |page| page.page_number)
            .map(|pos| self.pages[pos].matches.as_slice())
            .unwrap_or(&[])
    }

    pub fn total_count(&self) -> usize {
        self.pages.iter().map(|page| page.matches.len()).sum()
    }

    pub fn next(&self, current: usize) -> Option<usize> {
        match self.total_count() {
            0 => None,
            total => Some((current % total + 1) % total),
        }
    }

    pub fn prev(&self, current: usize) -> Option<usize> {
        match self.total_count() {
            0 => None,
            total => Some((current % total + total - 1) % total),
        }
    }

    pub fn resolve(&self, global_index: usize) -> Result<(usize, usize), TextLayerError> {
        let mut remaining = global_index;
        for page in &self.pages {
            if remaining < page.matches.len() {
                return Ok((page.page_number, remaining));
            }
            remaining -= page.matches.len();
        }
        Err(TextLayerError::IndexOutOfRange {
            index: global_index,
            total: self.total_count(),
        })
    }

    pub fn global_index_of(&self, page_number: usize, in_page_index: usize) -> Option<usize> {
        let mut offset = 0;
        for page in &self.pages {
            if page.page_number == page_number {
                return (in_page_index < page.matches.len()).then_some(offset + in_page_index);
            }
            if page.page_number > page_number {
                return None;
            }
            offset += page.matches.len();
        }
        None
    }

    pub fn match_at(&self, global_index: usize) -> Option<&Match> {
        let (page_number, in_page) = self.resolve(global_index).ok()?;
        self.page_matches(page_number).get(in_page)
    }
}
