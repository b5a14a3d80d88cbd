//! The core-set string parser.
//!
//! Grammar grounded on `caf::affinity::parser` (`affinity_parser.cpp`):
//! groups are delimited by angle brackets, items within a group are
//! comma-separated integers or closed ranges (`lo-hi`), and whitespace is
//! tolerated around tokens. Any malformed group invalidates the whole
//! string (the core logs a warning and ignores the configuration) rather
//! than partially applying it.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AffinityParseError {
    #[error("unmatched '<' in core-set string")]
    UnmatchedOpen,
    #[error("unmatched '>' in core-set string")]
    UnmatchedClose,
    #[error("empty group in core-set string")]
    EmptyGroup,
    #[error("invalid token \"{0}\" in core-set string")]
    InvalidToken(String),
    #[error("invalid range \"{0}\" in core-set string")]
    InvalidRange(String),
}

/// Parses a core-set string into an ordered list of core-id groups.
///
/// `"<0,1,2><3-5>"` -> `[{0,1,2}, {3,4,5}]`.
pub fn parse_core_sets(input: &str) -> Result<Vec<BTreeSet<usize>>, AffinityParseError> {
    let mut groups = Vec::new();
    let mut rest = input;
    while !rest.trim().is_empty() {
        let open = rest.find('<').ok_or(AffinityParseError::UnmatchedOpen)?;
        if rest[..open].chars().any(|c| !c.is_whitespace()) {
            return Err(AffinityParseError::UnmatchedOpen);
        }
        let after_open = &rest[open + 1..];
        let close = after_open.find('>').ok_or(AffinityParseError::UnmatchedClose)?;
        if let Some(next_open) = after_open.find('<') {
            if next_open < close {
                return Err(AffinityParseError::UnmatchedClose);
            }
        }
        let body = &after_open[..close];
        let group = parse_group(body)?;
        if group.is_empty() {
            return Err(AffinityParseError::EmptyGroup);
        }
        groups.push(group);
        rest = &after_open[close + 1..];
    }
    Ok(groups)
}

fn parse_group(body: &str) -> Result<BTreeSet<usize>, AffinityParseError> {
    let mut set = BTreeSet::new();
    if body.trim().is_empty() {
        return Ok(set);
    }
    for item in body.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err(AffinityParseError::InvalidToken(item.to_string()));
        }
        if let Some(dash) = item.find('-') {
            if dash == 0 || dash == item.len() - 1 {
                return Err(AffinityParseError::InvalidRange(item.to_string()));
            }
            let lo = parse_num(&item[..dash])?;
            let hi = parse_num(&item[dash + 1..])?;
            if lo > hi {
                return Err(AffinityParseError::InvalidRange(item.to_string()));
            }
            for core in lo..=hi {
                set.insert(core);
            }
        } else {
            set.insert(parse_num(item)?);
        }
    }
    Ok(set)
}

fn parse_num(s: &str) -> Result<usize, AffinityParseError> {
    let s = s.trim();
    s.parse::<usize>().map_err(|_| AffinityParseError::InvalidToken(s.to_string()))
}

/// Parses a core-set string, logging and falling back to "no affinity" on
/// any syntax error rather than propagating it: malformed configuration is
/// ignored with a warning, not a hard failure.
pub fn parse_core_sets_lenient(input: &str) -> Vec<BTreeSet<usize>> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    match parse_core_sets(input) {
        Ok(groups) => groups,
        Err(e) => {
            warn!(error = %e, input, "ignoring malformed affinity configuration");
            Vec::new()
        }
    }
}

/// Hands out core groups to threads of one class in round-robin order.
pub struct AffinityAssigner {
    groups: Vec<BTreeSet<usize>>,
    next: AtomicUsize,
}

impl AffinityAssigner {
    pub fn new(groups: Vec<BTreeSet<usize>>) -> AffinityAssigner {
        AffinityAssigner {
            groups,
            next: AtomicUsize::new(0),
        }
    }

    /// Returns the next group to pin a freshly spawned thread to, or `None`
    /// if no groups were configured for this thread class.
    pub fn next_group(&self) -> Option<&BTreeSet<usize>> {
        if self.groups.is_empty() {
            return None;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.groups.len();
        self.groups.get(idx)
    }
}
