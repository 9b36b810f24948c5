//! Glob-style matching over colon-segmented signal names.
//!
//! Compiles a pattern such as `agent:*:done` or `state:**` into a predicate
//! over signal names. Used by the [`Bus`](crate::bus::Bus), the recording
//! controller's filters, and the telemetry sampler.
//!
//! Patterns are narrow enough (`*` for one segment, `**` for zero or more)
//! that a hand-compiled matcher is simpler and cheaper than pulling in a
//! regex engine for the whole crate.

use std::fmt;

/// A single segment of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// A literal segment that must match exactly.
    Literal(String),
    /// `*` — exactly one segment, any content.
    One,
    /// `**` — zero or more segments.
    Any,
}

/// A pattern compiled into segments, ready for repeated matching.
///
/// Construct via [`SignalPattern::compile`] or [`SignalPattern::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl SignalPattern {
    /// Compile `pattern` into a matcher. Never fails — any string is a
    /// legal pattern (segments that aren't `*`/`**` are literal).
    pub fn new(pattern: impl Into<String>) -> Self {
        let raw = pattern.into();
        let segments = raw
            .split(':')
            .map(|segment| match segment {
                "*" => Segment::One,
                "**" => Segment::Any,
                literal => Segment::Literal(literal.to_string()),
            })
            .collect();
        Self { raw, segments }
    }

    /// Alias for [`SignalPattern::new`], matching the "compile" verb used
    /// throughout the specification this matcher implements.
    pub fn compile(pattern: impl Into<String>) -> Self {
        Self::new(pattern)
    }

    /// The original, uncompiled pattern string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True if `name` is matched by this pattern.
    pub fn matches(&self, name: &str) -> bool {
        let name_segments: Vec<&str> = name.split(':').collect();
        matches_from(&self.segments, &name_segments)
    }
}

impl fmt::Display for SignalPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn matches_from(pattern: &[Segment], name: &[&str]) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some((Segment::Any, rest)) => {
            // `**` matches zero or more segments: try consuming 0, 1, 2, ...
            // segments of `name` before matching the remainder of the
            // pattern against what's left.
            (0..=name.len()).any(|take| matches_from(rest, &name[take..]))
        }
        Some((head, rest)) => match name.split_first() {
            None => false,
            Some((name_head, name_rest)) => {
                let head_matches = match head {
                    Segment::One => true,
                    Segment::Literal(literal) => literal == name_head,
                    Segment::Any => unreachable!("handled above"),
                };
                head_matches && matches_from(rest, name_rest)
            }
        },
    }
}

/// Pure function form of [`SignalPattern::matches`], for callers that don't
/// want to keep a compiled pattern around.
pub fn matches(name: &str, pattern: &str) -> bool {
    SignalPattern::new(pattern).matches(name)
}

/// True if `name` matches any of `patterns`. Short-circuits on the first
/// match.
pub fn matches_any(name: &str, patterns: &[SignalPattern]) -> bool {
    patterns.iter().any(|pattern| pattern.matches(name))
}
