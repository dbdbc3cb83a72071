//! Structured parsing of recorded-output filenames in a generation directory.
//!
//! Two shapes are recognised:
//!
//! - `<stage>.<index>.<invocation-id>.out`, where `index` is a non-negative
//!   integer and `invocation-id` is a canonical hyphenated UUID.
//! - `<stage>.out`, the legacy shape written before rerun metadata existed.
//!   It counts as index 0.
//!
//! Anything else is ignored by rerun indexing. An index made of digits that
//! does not fit in 64 bits is still recognised, as `OversizedIndex`, so that
//! callers can refuse to number past it.

use uuid::Uuid;

use crate::core::stage::Stage;

const OUT_SUFFIX: &str = ".out";
const HYPHENATED_UUID_LEN: usize = 36;

/// Classification of a single filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFileName {
    Matched {
        stage: Stage,
        index: u64,
        invocation_id: Uuid,
    },
    LegacyMatched(Stage),
    OversizedIndex(Stage),
    NoMatch,
}

impl LogFileName {
    pub fn parse(name: &str) -> Self {
        let Some(body) = name.strip_suffix(OUT_SUFFIX) else {
            return LogFileName::NoMatch;
        };

        if let Ok(stage) = body.parse::<Stage>() {
            return LogFileName::LegacyMatched(stage);
        }

        let mut parts = body.splitn(3, '.');
        let (Some(stage), Some(index), Some(invocation_id)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return LogFileName::NoMatch;
        };

        let Ok(stage) = stage.parse::<Stage>() else {
            return LogFileName::NoMatch;
        };
        let Some(index) = parse_index(index) else {
            return LogFileName::NoMatch;
        };
        let Some(invocation_id) = parse_invocation_id(invocation_id) else {
            return LogFileName::NoMatch;
        };

        match index {
            Some(index) => LogFileName::Matched {
                stage,
                index,
                invocation_id,
            },
            None => LogFileName::OversizedIndex(stage),
        }
    }

    /// Stage and rerun index carried by the filename, if it is recognised.
    /// `OversizedIndex` carries no usable index and yields `None`.
    pub fn stage_index(&self) -> Option<(Stage, u64)> {
        match *self {
            LogFileName::Matched { stage, index, .. } => Some((stage, index)),
            LogFileName::LegacyMatched(stage) => Some((stage, 0)),
            LogFileName::OversizedIndex(_) | LogFileName::NoMatch => None,
        }
    }
}

/// Render the filename recorded for one run of `task`.
pub fn log_file_name(task: &str, index: u64, invocation_id: &str) -> String {
    format!("{task}.{index}.{invocation_id}{OUT_SUFFIX}")
}

/// `None` when `raw` is not a digit string, `Some(None)` when it is one too
/// large for `u64`.
fn parse_index(raw: &str) -> Option<Option<u64>> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(raw.parse().ok())
}

fn parse_invocation_id(raw: &str) -> Option<Uuid> {
    // Only the 8-4-4-4-12 form is 36 characters long; braced, urn and simple
    // forms are rejected by the length check.
    if raw.len() != HYPHENATED_UUID_LEN {
        return None;
    }
    Uuid::try_parse(raw).ok()
}
