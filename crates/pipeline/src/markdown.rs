//! Markdown operation grammar.
//!
//! Turns free-form proposer text into an ordered [`OperationSet`]. Three
//! marker forms are recognised, each scanned independently and then merged by
//! their byte offset in the source text:
//!
//! | Marker | Example | Payload |
//! |--------|---------|---------|
//! | modify / create | ``Changes for `src/a.py`:`` followed by a fenced block | block content |
//! | delete | ``Delete file `src/old.py` `` | none |
//! | no-change | ``No changes needed for `src/b.py`.`` | none |
//!
//! A modify header claims the first fenced block that starts after it and
//! before the next marker; prose in between is allowed. Markers that appear
//! inside a fenced block are ignored, as are unterminated fences. Fences
//! follow CommonMark: a block closes on a run of the opening character that is
//! at least as long as the opening run.
//!
//! [`parse_operations`] is a pure function: the same text always yields the
//! same sequence, and text without markers yields an empty set rather than an
//! error.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::{FileOperation, FilePath, OperationSet};

/// Leading list/heading/quote decoration allowed before a marker keyword.
const DECORATION: &str = r"^[ \t]*(?:(?:[#>*_-]+|\d+[.)])[ \t]*)*";

/// The backticked path and the rest of the marker line.
const PATH_TAIL: &str = r"[ \t]*:?[ \t]*[*_]*`([^`\n]+)`[^\n]*$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Modify,
    Delete,
    NoChange,
}

struct Grammar {
    rules: [(MarkerKind, Regex); 3],
}

fn compile(body: &str) -> Regex {
    let pattern = format!("(?im){DECORATION}{body}{PATH_TAIL}");
    Regex::new(&pattern).unwrap_or_else(|e| unreachable!("static marker pattern is valid: {e}"))
}

fn grammar() -> &'static Grammar {
    static GRAMMAR: OnceLock<Grammar> = OnceLock::new();
    GRAMMAR.get_or_init(|| Grammar {
        rules: [
            (
                MarkerKind::Modify,
                compile(
                    r"(?:(?:proposed[ \t]+)?(?:changes|modifications|updates?)[ \t]+(?:for|to)|(?:create|add)(?:[ \t]+new)?[ \t]+file|new[ \t]+file)",
                ),
            ),
            (
                MarkerKind::Delete,
                compile(r"(?:delete|remove)(?:[ \t]+the)?(?:[ \t]+file)?"),
            ),
            (
                MarkerKind::NoChange,
                compile(
                    r"no[ \t]+changes?[ \t]+(?:(?:are|is)[ \t]+)?(?:needed|required|necessary)[ \t]+(?:for|to|in)",
                ),
            ),
        ],
    })
}

#[derive(Debug)]
struct Marker {
    kind: MarkerKind,
    start: usize,
    end: usize,
    path: String,
}

#[derive(Debug)]
struct Fence {
    start: usize,
    end: usize,
    content: String,
}

/// Opening fence of a block: its character and run length.
#[derive(Debug, Clone, Copy)]
struct FenceOpen {
    marker: char,
    width: usize,
    start: usize,
    content_start: usize,
}

/// The fence run at the start of `line`, if it is at least three long.
fn fence_run(line: &str) -> Option<(char, usize)> {
    let marker = line.chars().next().filter(|c| matches!(c, '`' | '~'))?;
    let width = line.chars().take_while(|&c| c == marker).count();
    (width >= 3).then_some((marker, width))
}

/// Locates every terminated fenced block.
///
/// An opening fence may carry an info string (```` ```python ````). A block
/// closes only on a line made of the opening character alone, at least as
/// long as the opening run, so a four-backtick fence can wrap three-backtick
/// blocks.
fn scan_fences(text: &str) -> Vec<Fence> {
    let mut fences = Vec::new();
    let mut open: Option<FenceOpen> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let trimmed = line.trim();

        match open {
            None => {
                if let Some((marker, width)) = fence_run(trimmed) {
                    open = Some(FenceOpen {
                        marker,
                        width,
                        start: line_start,
                        content_start: offset,
                    });
                }
            }
            Some(fence) => {
                let closes = fence_run(trimmed).is_some_and(|(marker, width)| {
                    marker == fence.marker
                        && width >= fence.width
                        && trimmed.chars().all(|c| c == marker)
                });
                if closes {
                    fences.push(Fence {
                        start: fence.start,
                        end: offset,
                        content: text[fence.content_start..line_start].to_string(),
                    });
                    open = None;
                }
            }
        }
    }

    if let Some(fence) = open {
        debug!(offset = fence.start, "ignoring unterminated code fence");
    }
    fences
}

fn scan_markers(text: &str, fences: &[Fence]) -> Vec<Marker> {
    let inside_fence = |pos: usize| fences.iter().any(|f| pos >= f.start && pos < f.end);

    let mut markers: Vec<Marker> = grammar()
        .rules
        .iter()
        .flat_map(|(kind, regex)| {
            regex.captures_iter(text).filter_map(move |caps| {
                let whole = caps.get(0)?;
                let path = caps.get(1)?;
                Some(Marker {
                    kind: *kind,
                    start: whole.start(),
                    end: whole.end(),
                    path: path.as_str().to_string(),
                })
            })
        })
        .filter(|m| !inside_fence(m.start))
        .collect();

    markers.sort_by_key(|m| m.start);
    markers
}

/// Parses proposer output into operations, ordered by marker position.
pub fn parse_operations(text: &str) -> OperationSet {
    let fences = scan_fences(text);
    let markers = scan_markers(text, &fences);

    let mut operations = Vec::with_capacity(markers.len());
    for (index, marker) in markers.iter().enumerate() {
        let Some(path) = FilePath::new(marker.path.as_str()) else {
            continue;
        };
        match marker.kind {
            MarkerKind::Modify => {
                let window_end = markers.get(index + 1).map_or(text.len(), |next| next.start);
                let block = fences
                    .iter()
                    .find(|f| f.start >= marker.end && f.start < window_end);
                match block {
                    Some(fence) => {
                        operations.push(FileOperation::modify(path, fence.content.trim()));
                    }
                    None => debug!(path = %path, "modify marker without a code block"),
                }
            }
            MarkerKind::Delete => operations.push(FileOperation::delete(path)),
            MarkerKind::NoChange => operations.push(FileOperation::no_change(path)),
        }
    }

    OperationSet::new(operations)
}
