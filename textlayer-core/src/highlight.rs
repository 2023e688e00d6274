use std::ops::Range;

use serde::Serialize;

use crate::layout::TextFragment;
use crate::search::Match;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HighlightRect {
    pub fragment_index: usize,
    pub match_index: usize,
    /// Character range `[start, end)` within the fragment.
    pub start: usize,
    pub end: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub angle: f32,
    pub selected: bool,
}

pub fn clip_to_fragment(
    found: &Match,
    fragment_index: usize,
    fragment_len: usize,
) -> Option<Range<usize>> {
    if !found.touches(fragment_index) {
        return None;
    }
    let start = if fragment_index == found.start_fragment {
        found.start_offset
    } else {
        0
    };
    let end = if fragment_index == found.end_fragment {
        found.end_offset
    } else {
        fragment_len
    };
    let start = start.min(fragment_len);
    let end = end.min(fragment_len);
    (start < end).then_some(start..end)
}

pub fn highlight_fragment(
    fragment: &TextFragment,
    page_matches: &[Match],
    selected: Option<usize>,
) -> Vec<HighlightRect> {
    let len = fragment.char_count();
    let char_width = fragment.char_width();
    let (sin, cos) = fragment.angle.sin_cos();

    page_matches
        .iter()
        .enumerate()
        .filter_map(|(match_index, found)| {
            let range = clip_to_fragment(found, fragment.index, len)?;
            let advance = range.start as f32 * char_width;
            Some(HighlightRect {
                fragment_index: fragment.index,
                match_index,
                start: range.start,
                end: range.end,
                x: fragment.x + advance * cos,
                y: fragment.y + advance * sin,
                width: (range.end - range.start) as f32 * char_width,
                height: fragment.height,
                angle: fragment.angle,
                selected: selected == Some(match_index),
            })
        })
        .collect()
}

pub fn highlight_page(
    fragments: &[TextFragment],
    page_matches: &[Match],
    selected: Option<usize>,
) -> Vec<HighlightRect> {
    if page_matches.is_empty() {
        return Vec::new();
    }
    fragments
        .iter()
        .flat_map(|fragment| highlight_fragment(fragment, page_matches, selected))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Plain,
    Highlighted,
    Selected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSegment {
    pub text: String,
    pub kind: SegmentKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightedText {
    pub fragment_index: usize,
    pub segments: Vec<TextSegment>,
}

impl HighlightedText {
    pub fn plain(fragment: &TextFragment) -> Self {
        let mut out = Self {
            fragment_index: fragment.index,
            segments: Vec::new(),
        };
        out.push(fragment.text.clone(), SegmentKind::Plain);
        out
    }

    /// Splits the fragment text at the ranges in `rects`. Rectangles from
    /// other fragments are ignored; overlapping ranges are trimmed.
    pub fn from_rects(fragment: &TextFragment, rects: &[HighlightRect]) -> Self {
        let chars: Vec<char> = fragment.text.chars().collect();
        let mut ranges: Vec<&HighlightRect> = rects
            .iter()
            .filter(|rect| rect.fragment_index == fragment.index)
            .collect();
        ranges.sort_by_key(|rect| (rect.start, rect.end));

        let mut out = Self {
            fragment_index: fragment.index,
            segments: Vec::new(),
        };
        let mut cursor = 0;
        for rect in ranges {
            let start = rect.start.max(cursor).min(chars.len());
            let end = rect.end.min(chars.len());
            if start >= end {
                continue;
            }
            out.push(chars[cursor..start].iter().collect(), SegmentKind::Plain);
            let kind = if rect.selected {
                SegmentKind::Selected
            } else {
                SegmentKind::Highlighted
            };
            out.push(chars[start..end].iter().collect(), kind);
            cursor = end;
        }
        out.push(chars[cursor..].iter().collect(), SegmentKind::Plain);
        out
    }

    pub fn is_highlighted(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| segment.kind != SegmentKind::Plain)
    }

    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|segment| segment.text.as_str())
            .collect()
    }

    pub fn clear(&mut self) {
        if !self.is_highlighted() && self.segments.len() <= 1 {
            return;
        }
        let text = self.text();
        self.segments.clear();
        self.push(text, SegmentKind::Plain);
    }

    fn push(&mut self, text: String, kind: SegmentKind) {
        if text.is_empty() {
            return;
        }
        match self.segments.last_mut() {
            Some(last) if last.kind == kind => last.text.push_str(&text),
            _ => self.segments.push(TextSegment { text, kind }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{find_matches, SearchOptions};

    const EPS: f32 = 1e-4;

    fn fragment(index: usize, text: &str, x: f32) -> TextFragment {
        TextFragment {
            index,
            x,
            y: 50.0,
            width: text.chars().count() as f32 * 5.0,
            height: 10.0,
            font_size: 10.0,
            angle: 0.0,
            scale_x: 10.0,
            scale_y: 10.0,
            text: text.to_string(),
            font_name: String::new(),
            direction: None,
        }
    }

    fn spanning() -> SearchOptions {
        SearchOptions {
            span_fragments: true,
            ..SearchOptions::default()
        }
    }

    #[test]
    fn single_fragment_match_maps_to_pixels() {
        let frag = fragment(0, "banana split", 100.0);
        let matches = find_matches(1, std::slice::from_ref(&frag), "split", spanning()).unwrap();
        let rects = highlight_fragment(&frag, &matches, Some(0));
        assert_eq!(rects.len(), 1);
        let rect = rects[0];
        assert_eq!((rect.start, rect.end), (7, 12));
        assert!((rect.x - 135.0).abs() < EPS);
        assert!((rect.width - 25.0).abs() < EPS);
        assert!((rect.height - 10.0).abs() < EPS);
        assert!(rect.selected);
    }

    #[test]
    fn cross_fragment_match_is_clipped_per_fragment() {
        let page = vec![
            fragment(0, "Hel", 0.0),
            fragment(1, "lo wor", 15.0),
            fragment(2, "ld!", 45.0),
        ];
        let matches = find_matches(1, &page, "ello world", spanning()).unwrap();
        assert_eq!(matches.len(), 1);

        let rects = highlight_page(&page, &matches, None);
        let ranges: Vec<_> = rects
            .iter()
            .map(|rect| (rect.fragment_index, rect.start, rect.end))
            .collect();
        assert_eq!(ranges, vec![(0, 1, 3), (1, 0, 6), (2, 0, 2)]);
        assert!(rects.iter().all(|rect| !rect.selected));
    }

    #[test]
    fn exactly_one_match_is_selected() {
        let frag = fragment(0, "a b a b a", 0.0);
        let matches = find_matches(1, std::slice::from_ref(&frag), "a", spanning()).unwrap();
        let rects = highlight_fragment(&frag, &matches, Some(1));
        assert_eq!(rects.len(), 3);
        assert_eq!(rects.iter().filter(|rect| rect.selected).count(), 1);
        assert!(rects[1].selected);

        let none = highlight_fragment(&frag, &matches, Some(7));
        assert!(none.iter().all(|rect| !rect.selected));
    }

    #[test]
    fn rotated_fragment_offsets_follow_baseline() {
        let mut frag = fragment(0, "abcd", 10.0);
        frag.angle = std::f32::consts::FRAC_PI_2;
        let matches = find_matches(1, std::slice::from_ref(&frag), "cd", spanning()).unwrap();
        let rect = highlight_fragment(&frag, &matches, None)[0];
        assert!((rect.x - 10.0).abs() < EPS);
        assert!((rect.y - 60.0).abs() < EPS);
    }

    #[test]
    fn segments_split_text_and_clear_restores_it() {
        let frag = fragment(0, "one two one", 0.0);
        let matches = find_matches(1, std::slice::from_ref(&frag), "one", spanning()).unwrap();
        let rects = highlight_fragment(&frag, &matches, Some(1));
        let mut text = HighlightedText::from_rects(&frag, &rects);

        let kinds: Vec<_> = text.segments.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SegmentKind::Highlighted,
                SegmentKind::Plain,
                SegmentKind::Selected
            ]
        );
        assert_eq!(text.text(), frag.text);

        text.clear();
        assert_eq!(text, HighlightedText::plain(&frag));
        text.clear();
        assert_eq!(text, HighlightedText::plain(&frag));
        assert!(!text.is_highlighted());
    }

    #[test]
    fn clear_restores_text_with_multibyte_characters() {
        let frag = fragment(3, "Grüße, grüße", 0.0);
        let matches = find_matches(1, std::slice::from_ref(&frag), "GRÜSSE", spanning()).unwrap();
        let rects = highlight_fragment(&frag, &matches, None);
        let mut text = HighlightedText::from_rects(&frag, &rects);
        text.clear();
        assert_eq!(text.text(), "Grüße, grüße");

        let matches = find_matches(1, std::slice::from_ref(&frag), "grüße", spanning()).unwrap();
        assert_eq!(matches.len(), 2);
        let rects = highlight_fragment(&frag, &matches, Some(0));
        let mut text = HighlightedText::from_rects(&frag, &rects);
        assert!(text.is_highlighted());
        text.clear();
        assert_eq!(text.text(), frag.text);
    }

    #[test]
    fn segments_serialize_with_lowercase_kinds() {
        let frag = fragment(0, "find me", 0.0);
        let matches = find_matches(1, std::slice::from_ref(&frag), "me", spanning()).unwrap();
        let rects = highlight_fragment(&frag, &matches, Some(0));
        let text = HighlightedText::from_rects(&frag, &rects);
        let value = serde_json::to_value(&text).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "fragment_index": 0,
                "segments": [
                    { "text": "find ", "kind": "plain" },
                    { "text": "me", "kind": "selected" },
                ],
            })
        );
    }
}
