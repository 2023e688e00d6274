use std::ops::Range;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::TextLayerError;
use crate::layout::{TextFragment, TextPosition};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    /// Only match occurrences delimited by word boundaries. Whole-word
    /// matches never span fragments. The query is literal, so one that
    /// starts or ends with a non-word character (`C++`, `(usd)`) never
    /// matches in this mode.
    pub whole_word: bool,
    /// Scan the page as one string so a phrase broken across runs is found.
    pub span_fragments: bool,
}

/// One occurrence of the query on a page.
///
/// Offsets are character offsets; `end_offset` is exclusive and relative to
/// `end_fragment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub page_number: usize,
    pub start_fragment: usize,
    pub start_offset: usize,
    pub end_fragment: usize,
    pub end_offset: usize,
    pub involved_fragments: Vec<usize>,
    pub text: String,
}

impl Match {
    pub fn start(&self) -> TextPosition {
        TextPosition::new(self.start_fragment, self.start_offset)
    }

    pub fn end(&self) -> TextPosition {
        TextPosition::new(self.end_fragment, self.end_offset)
    }

    pub fn is_cross_fragment(&self) -> bool {
        self.start_fragment != self.end_fragment
    }

    pub fn touches(&self, fragment: usize) -> bool {
        self.involved_fragments.binary_search(&fragment).is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct Matcher {
    pattern: Regex,
    options: SearchOptions,
}

impl Matcher {
    /// Returns `None` for an empty or whitespace-only query.
    pub fn new(query: &str, options: SearchOptions) -> Result<Option<Self>, TextLayerError> {
        if query.trim().is_empty() {
            return Ok(None);
        }
        let literal = regex::escape(query);
        let source = if options.whole_word {
            format!(r"\b{literal}\b")
        } else {
            literal
        };
        let pattern = RegexBuilder::new(&source)
            .case_insensitive(!options.case_sensitive)
            .build()?;
        Ok(Some(Self { pattern, options }))
    }

    pub fn spans_fragments(&self) -> bool {
        self.options.span_fragments && !self.options.whole_word
    }

    /// Matches in fragment order, then offset order.
    pub fn find(&self, page_number: usize, fragments: &[TextFragment]) -> Vec<Match> {
        if self.spans_fragments() {
            self.find_across(page_number, fragments)
        } else {
            self.find_within(page_number, fragments)
        }
    }

    pub fn find_within(&self, page_number: usize, fragments: &[TextFragment]) -> Vec<Match> {
        let mut matches = Vec::new();
        for fragment in fragments {
            for hit in self.scan(&fragment.text) {
                matches.push(Match {
                    page_number,
                    start_fragment: fragment.index,
                    start_offset: hit.chars.start,
                    end_fragment: fragment.index,
                    end_offset: hit.chars.end,
                    involved_fragments: vec![fragment.index],
                    text: fragment.text[hit.bytes].to_string(),
                });
            }
        }
        matches
    }

    pub fn find_across(&self, page_number: usize, fragments: &[TextFragment]) -> Vec<Match> {
        let mut joined = String::new();
        let mut owners: Vec<TextPosition> = Vec::new();
        for fragment in fragments {
            joined.push_str(&fragment.text);
            owners.extend(
                (0..fragment.char_count()).map(|offset| TextPosition::new(fragment.index, offset)),
            );
        }

        let mut matches = Vec::new();
        for hit in self.scan(&joined) {
            let covered = &owners[hit.chars.clone()];
            let (Some(first), Some(last)) = (covered.first(), covered.last()) else {
                continue;
            };
            let mut involved_fragments: Vec<usize> =
                covered.iter().map(|position| position.fragment).collect();
            involved_fragments.dedup();
            matches.push(Match {
                page_number,
                start_fragment: first.fragment,
                start_offset: first.offset,
                end_fragment: last.fragment,
                end_offset: last.offset + 1,
                involved_fragments,
                text: joined[hit.bytes].to_string(),
            });
        }
        matches
    }

    fn scan(&self, text: &str) -> Vec<Hit> {
        let boundaries: Vec<usize> = text.char_indices().map(|(byte, _)| byte).collect();
        let char_index = |byte: usize| boundaries.partition_point(|&b| b < byte);
        self.pattern
            .find_iter(text)
            .filter(|found| !found.is_empty())
            .map(|found| Hit {
                bytes: found.range(),
                chars: char_index(found.start())..char_index(found.end()),
            })
            .collect()
    }
}

struct Hit {
    bytes: Range<usize>,
    chars: Range<usize>,
}

pub fn find_matches(
    page_number: usize,
    fragments: &[TextFragment],
    query: &str,
    options: SearchOptions,
) -> Result<Vec<Match>, TextLayerError> {
    Ok(Matcher::new(query, options)?
        .map(|matcher| matcher.find(page_number, fragments))
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments(texts: &[&str]) -> Vec<TextFragment> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| TextFragment {
                index,
                x: 0.0,
                y: 0.0,
                width: text.chars().count() as f32 * 6.0,
                height: 10.0,
                font_size: 10.0,
                angle: 0.0,
                scale_x: 10.0,
                scale_y: 10.0,
                text: text.to_string(),
                font_name: String::new(),
                direction: None,
            })
            .collect()
    }

    fn per_fragment() -> SearchOptions {
        SearchOptions::default()
    }

    #[test]
    fn blank_query_matches_nothing() {
        let page = fragments(&["anything"]);
        assert!(find_matches(1, &page, "", per_fragment()).unwrap().is_empty());
        assert!(find_matches(1, &page, "  \t", per_fragment())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn substring_scan_does_not_overlap() {
        let page = fragments(&["banana"]);
        let matches = find_matches(1, &page, "ana", per_fragment()).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].start_offset, 1);
        assert_eq!(matches[0].end_offset, 4);

        let page = fragments(&["aa"]);
        let matches = find_matches(1, &page, "a", per_fragment()).unwrap();
        assert_eq!(
            matches.iter().map(|m| m.start_offset).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn case_folding_follows_flag() {
        let page = fragments(&["Rust rust RUST"]);
        let insensitive = find_matches(1, &page, "rust", per_fragment()).unwrap();
        assert_eq!(insensitive.len(), 3);
        assert_eq!(insensitive[2].text, "RUST");

        let options = SearchOptions {
            case_sensitive: true,
            ..SearchOptions::default()
        };
        let sensitive = find_matches(1, &page, "rust", options).unwrap();
        assert_eq!(sensitive.len(), 1);
        assert_eq!(sensitive[0].start_offset, 5);
    }

    #[test]
    fn whole_word_excludes_prefixes() {
        let page = fragments(&["cat category catalog"]);
        let options = SearchOptions {
            whole_word: true,
            ..SearchOptions::default()
        };
        let matches = find_matches(1, &page, "cat", options).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].start_offset, 0);
    }

    #[test]
    fn query_is_literal() {
        let page = fragments(&["cost (USD) is $5.00 or 5x00"]);
        let matches = find_matches(1, &page, "$5.00", per_fragment()).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].text, "$5.00");

        let matches = find_matches(1, &page, "(usd)", per_fragment()).unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn phrase_broken_across_fragments_is_found() {
        let page = fragments(&["Hel", "lo wor", "ld"]);
        let options = SearchOptions {
            span_fragments: true,
            ..SearchOptions::default()
        };
        let matches = find_matches(4, &page, "llo wo", options).unwrap();
        assert_eq!(matches.len(), 1);
        let found = &matches[0];
        assert_eq!(found.page_number, 4);
        assert_eq!(found.start_fragment, 0);
        assert_eq!(found.end_fragment, 1);
        assert_eq!(found.involved_fragments, vec![0, 1]);
        assert_eq!(found.start_offset, 2);
        assert_eq!(found.end_offset, 5);
        assert_eq!(found.text, "llo wo");
        assert!(found.is_cross_fragment());

        assert!(find_matches(4, &page, "llo wo", per_fragment())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn match_starting_on_fragment_boundary_stays_in_one_fragment() {
        // "Hel" + "lo wor": the "lo" begins the second run.
        let page = fragments(&["Hel", "lo wor", "ld"]);
        let options = SearchOptions {
            span_fragments: true,
            ..SearchOptions::default()
        };
        let matches = find_matches(1, &page, "lo wo", options).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].start_fragment, 1);
        assert_eq!(matches[0].start_offset, 0);
        assert_eq!(matches[0].involved_fragments, vec![1]);
        assert!(!matches[0].is_cross_fragment());
    }

    #[test]
    fn interior_fragments_are_involved() {
        let page = fragments(&["Hel", "lo wor", "ld"]);
        let options = SearchOptions {
            span_fragments: true,
            ..SearchOptions::default()
        };
        let matches = find_matches(1, &page, "hello world", options).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].involved_fragments, vec![0, 1, 2]);
        assert_eq!(matches[0].end_offset, 2);
        assert!(matches[0].touches(1));
        assert!(!matches[0].touches(3));
    }

    #[test]
    fn views_agree_when_nothing_spans() {
        let page = fragments(&["one two", "two three", "two"]);
        let within = find_matches(1, &page, "two", per_fragment()).unwrap();
        let across = find_matches(
            1,
            &page,
            "two",
            SearchOptions {
                span_fragments: true,
                ..SearchOptions::default()
            },
        )
        .unwrap();
        assert_eq!(within, across);
        assert_eq!(within.len(), 3);
    }

    #[test]
    fn whole_word_never_spans() {
        let page = fragments(&["wo", "rd word"]);
        let options = SearchOptions {
            whole_word: true,
            span_fragments: true,
            ..SearchOptions::default()
        };
        let matches = find_matches(1, &page, "word", options).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].start_fragment, 1);
        assert_eq!(matches[0].start_offset, 3);
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let page = fragments(&["naïve café, café"]);
        let matches = find_matches(1, &page, "café", per_fragment()).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].start_offset, 6);
        assert_eq!(matches[0].end_offset, 10);
        assert_eq!(matches[1].start_offset, 12);
    }

    #[test]
    fn matching_is_deterministic() {
        let page = fragments(&["abc abc", "cab", "bca"]);
        let options = SearchOptions {
            span_fragments: true,
            ..SearchOptions::default()
        };
        let first = find_matches(1, &page, "ab", options).unwrap();
        let second = find_matches(1, &page, "ab", options).unwrap();
        assert_eq!(first, second);
        let starts: Vec<_> = first.iter().map(Match::start).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
    }
}
