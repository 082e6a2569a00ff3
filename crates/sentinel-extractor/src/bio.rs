//! BIO span decoding
//!
//! Converts a per-token tag sequence (`O`, `B-<Type>`, `I-<Type>`) into
//! non-overlapping entity spans. Decoding is an explicit two-state machine:
//!
//! | state    | `B-X`                 | `I-Y`              | `O`          |
//! |----------|-----------------------|--------------------|--------------|
//! | `Idle`   | open X                | stay idle          | stay idle    |
//! | `InSpan` | close, open X         | extend (any Y)     | close        |
//!
//! An `I-` tag whose type differs from the open span still extends it.
//! Malformed input never fails; it only yields fewer or shorter spans.

use serde::{Deserialize, Serialize};
use tracing::trace;

use sentinel_core::EntitySpan;

/// Parsed tag class
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BioTag {
    Outside,
    Begin(String),
    Inside(String),
}

impl BioTag {
    /// Parse a raw tag. Anything that is not a well-formed `B-`/`I-` tag with
    /// a non-empty type counts as `Outside`.
    pub fn parse(tag: &str) -> Self {
        let tag = tag.trim();
        if let Some(label) = tag.strip_prefix("B-").filter(|l| !l.is_empty()) {
            return Self::Begin(label.to_string());
        }
        if let Some(label) = tag.strip_prefix("I-").filter(|l| !l.is_empty()) {
            return Self::Inside(label.to_string());
        }
        Self::Outside
    }
}

/// One token of model output.
///
/// `offset` is the token's byte range in the source text; tokens without one
/// (padding, special tokens) are skipped by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedToken {
    pub token: String,
    pub tag: String,
    #[serde(default)]
    pub offset: Option<(usize, usize)>,
}

impl TaggedToken {
    pub fn new(token: impl Into<String>, tag: impl Into<String>, offset: Option<(usize, usize)>) -> Self {
        Self {
            token: token.into(),
            tag: tag.into(),
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DecoderState {
    Idle,
    InSpan {
        start: usize,
        end: usize,
        label: String,
    },
}

/// A span closed by a transition, before text extraction
type ClosedSpan = (usize, usize, String);

impl DecoderState {
    /// Apply one tag over the token range `start..end`, returning the next
    /// state and the span the transition closed, if any.
    fn transition(self, tag: BioTag, start: usize, end: usize) -> (Self, Option<ClosedSpan>) {
        match (self, tag) {
            (state, BioTag::Begin(label)) => (Self::InSpan { start, end, label }, state.close()),
            (
                Self::InSpan {
                    start: open_start,
                    label,
                    ..
                },
                BioTag::Inside(_),
            ) => (
                Self::InSpan {
                    start: open_start,
                    end,
                    label,
                },
                None,
            ),
            (Self::Idle, BioTag::Inside(_)) => (Self::Idle, None),
            (state, BioTag::Outside) => (Self::Idle, state.close()),
        }
    }

    fn close(self) -> Option<ClosedSpan> {
        match self {
            Self::Idle => None,
            Self::InSpan { start, end, label } => Some((start, end, label)),
        }
    }
}

/// BIO decoder producing ordered, non-overlapping spans
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanDecoder;

impl SpanDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode `tokens` over `text`.
    ///
    /// Tokens whose offsets are missing, out of bounds, not on character
    /// boundaries, empty, or that start before the previous token ended are
    /// skipped, so output spans are always ordered and disjoint.
    pub fn decode(&self, text: &str, tokens: &[TaggedToken]) -> Vec<EntitySpan> {
        let mut state = DecoderState::Idle;
        let mut closed = Vec::new();
        let mut cursor = 0;

        for token in tokens {
            let Some((start, end)) = token.offset else {
                continue;
            };
            if start < cursor || !is_valid_range(text, start, end) {
                trace!(token = %token.token, start, end, "Skipping token with unusable offset");
                continue;
            }
            cursor = end;

            let (next, span) = state.transition(BioTag::parse(&token.tag), start, end);
            state = next;
            closed.extend(span);
        }
        closed.extend(state.close());

        closed
            .into_iter()
            .filter_map(|(start, end, label)| {
                let trimmed = text[start..end].trim();
                (!trimmed.is_empty()).then(|| EntitySpan::new(start, end, label, trimmed))
            })
            .collect()
    }
}

fn is_valid_range(text: &str, start: usize, end: usize) -> bool {
    start < end && end <= text.len() && text.is_char_boundary(start) && text.is_char_boundary(end)
}

/// Compute byte offsets for `tokens` by searching `text` left to right.
///
/// WordPiece continuation markers (`##`) are ignored for matching. Tokens
/// that cannot be found after the previous match (special or padding tokens)
/// get `None`.
pub fn align_tokens<S: AsRef<str>>(text: &str, tokens: &[S]) -> Vec<Option<(usize, usize)>> {
    let mut cursor = 0;
    tokens
        .iter()
        .map(|token| {
            let token = token.as_ref();
            let needle = token.strip_prefix("##").unwrap_or(token);
            if needle.is_empty() {
                return None;
            }
            let found = text[cursor..].find(needle)?;
            let start = cursor + found;
            let end = start + needle.len();
            cursor = end;
            Some((start, end))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
