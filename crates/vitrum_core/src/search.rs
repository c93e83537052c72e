//! Weighted fuzzy search over the document index.
//!
//! The matcher scores a query as a case-insensitive subsequence of a field,
//! with bonuses for word-boundary and consecutive matches, then normalizes
//! the result into a distance in `[0, 1]` where lower is better. Matches may
//! occur anywhere in a field (ignore-location). Fields are weighted: title
//! counts double, tags 1.5x, content 1x; a document's score is the best
//! weighted field distance.

use serde::Serialize;

use crate::document::{DocType, Document};

const SCORE_MATCH: i32 = 16;
const SCORE_GAP_START: i32 = -3;
const SCORE_GAP_EXTENSION: i32 = -1;
const BONUS_BOUNDARY: i32 = 8;
const BONUS_CONSECUTIVE: i32 = 4;
const BONUS_FIRST_CHAR_MULTIPLIER: i32 = 2;

const WEIGHT_TITLE: f64 = 2.0;
const WEIGHT_TAGS: f64 = 1.5;
const WEIGHT_CONTENT: f64 = 1.0;

/// Hits whose best weighted distance exceeds this are dropped.
const MAX_DISTANCE: f64 = 0.98;

/// One ranked search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// The matched document.
    pub document: Document,
    /// Normalized distance in `[0, 1]`; lower is better.
    pub score: f64,
}

/// Optional post-ranking filters.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Keep only documents of this type.
    pub doc_type: Option<DocType>,
    /// Keep only documents carrying this tag.
    pub tag: Option<String>,
}

/// Rank `docs` against `query`, filter, and return ascending by score.
///
/// Ordering is deterministic for a fixed corpus: the sort is stable, so
/// equal scores keep index iteration order.
pub fn search<'a, I>(docs: I, query: &str, filter: &SearchFilter) -> Vec<SearchHit>
where
    I: IntoIterator<Item = &'a Document>,
{
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit> = docs
        .into_iter()
        .filter_map(|doc| score_document(doc, query).map(|score| SearchHit {
            document: doc.clone(),
            score,
        }))
        .collect();

    hits.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));

    hits.retain(|hit| {
        filter
            .doc_type
            .map(|t| hit.document.doc_type == t)
            .unwrap_or(true)
            && filter
                .tag
                .as_ref()
                .map(|t| hit.document.tags.iter().any(|dt| dt == t))
                .unwrap_or(true)
    });

    hits
}

/// Best weighted field distance for one document, `None` when no field
/// contains the query as a subsequence.
pub fn score_document(doc: &Document, query: &str) -> Option<f64> {
    let mut best: Option<f64> = None;

    let mut consider = |distance: Option<f64>, weight: f64| {
        if let Some(d) = distance {
            let weighted = (d / weight).min(1.0);
            if best.is_none_or(|b| weighted < b) {
                best = Some(weighted);
            }
        }
    };

    consider(field_distance(query, &doc.title), WEIGHT_TITLE);
    for tag in &doc.tags {
        consider(field_distance(query, tag), WEIGHT_TAGS);
    }
    consider(field_distance(query, &doc.content), WEIGHT_CONTENT);

    best.filter(|d| *d <= MAX_DISTANCE)
}

/// Normalized distance of `needle` against `haystack`, `None` when the
/// needle is not a subsequence of the haystack.
fn field_distance(needle: &str, haystack: &str) -> Option<f64> {
    let raw = match_score(needle, haystack)?;
    let n = needle.chars().count() as i32;
    // A perfect hit: every char matched, all consecutive, starting on a
    // word boundary.
    let ideal = n * (SCORE_MATCH + BONUS_CONSECUTIVE)
        + BONUS_BOUNDARY * (BONUS_FIRST_CHAR_MULTIPLIER - 1);
    let quality = (raw as f64 / ideal as f64).clamp(0.0, 1.0);
    // Floor at a small epsilon so a perfect hit in a heavy field still
    // outranks a perfect hit in a light one after weighting.
    Some((1.0 - quality).max(0.001))
}

fn is_boundary(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(c) => !c.is_alphanumeric(),
    }
}

/// Greedy-with-lookback subsequence scoring.
///
/// Scans the haystack once per needle char, preferring boundary matches in
/// the forward window, and charges gap penalties between matched positions.
/// Deterministic for fixed inputs.
fn match_score(needle: &str, haystack: &str) -> Option<i32> {
    let needle: Vec<char> = needle.chars().flat_map(|c| c.to_lowercase()).collect();
    let hay: Vec<char> = haystack.chars().flat_map(|c| c.to_lowercase()).collect();
    if needle.is_empty() || needle.len() > hay.len() {
        return None;
    }

    let mut score = 0i32;
    let mut pos = 0usize;
    let mut last_match: Option<usize> = None;

    for (qi, qc) in needle.iter().enumerate() {
        // Find the next occurrence; prefer a boundary occurrence within a
        // short lookahead so `no` matches the word "notes" over "anode".
        let mut found: Option<usize> = None;
        let mut idx = pos;
        while idx < hay.len() {
            if hay[idx] == *qc {
                let prev = if idx == 0 { None } else { Some(hay[idx - 1]) };
                if found.is_none() {
                    found = Some(idx);
                    if is_boundary(prev) || last_match == Some(idx.wrapping_sub(1)) {
                        break;
                    }
                } else if is_boundary(prev) && idx - found.unwrap() <= 32 {
                    found = Some(idx);
                    break;
                } else if idx - found.unwrap() > 32 {
                    break;
                }
            }
            idx += 1;
        }
        let at = found?;

        score += SCORE_MATCH;
        let prev = if at == 0 { None } else { Some(hay[at - 1]) };
        if last_match == Some(at.wrapping_sub(1)) && at > 0 {
            score += BONUS_CONSECUTIVE;
        }
        if is_boundary(prev) {
            score += if qi == 0 {
                BONUS_BOUNDARY * BONUS_FIRST_CHAR_MULTIPLIER
            } else {
                BONUS_BOUNDARY
            };
        }
        if let Some(last) = last_match
            && at > last + 1
        {
            let gap = (at - last - 1) as i32;
            score += SCORE_GAP_START + SCORE_GAP_EXTENSION * (gap - 1).min(16);
        }

        last_match = Some(at);
        pos = at + 1;
    }

    Some(score)
}
