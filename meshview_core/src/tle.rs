//! Two-Line Element (TLE) batch parsing.
//!
//! A batch is plain text in 3-line groups: a name line followed by line 1 and
//! line 2 of the element set. Parsing is lenient at the group level and strict
//! inside a group: one bad group is skipped and reported, the rest of the batch
//! still loads.

use sgp4::{Constants, Elements};
use thiserror::Error;
use tracing::{debug, warn};

use crate::source::SourceError;

/// Exact length of TLE line 1 and line 2.
pub const TLE_LINE_LEN: usize = 69;

/// Why a group was skipped.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MalformedReason {
    #[error("line lengths {line1}/{line2}, expected {TLE_LINE_LEN}")]
    WrongLineLength { line1: usize, line2: usize },

    #[error("incomplete group of {0} line(s)")]
    Incomplete(usize),

    #[error("rejected by SGP4: {0}")]
    Rejected(String),
}

/// One skipped group.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("TLE group {group} ({name}): {reason}")]
pub struct MalformedEntry {
    /// 1-based group number within the batch
    pub group: usize,
    pub name: String,
    pub reason: MalformedReason,
}

/// A parsed element set, ready for propagation.
pub struct TleRecord {
    pub name: String,
    pub elements: Elements,
    pub constants: Constants,
}

impl TleRecord {
    pub fn norad_id(&self) -> u64 {
        self.elements.norad_id
    }
}

impl std::fmt::Debug for TleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TleRecord")
            .field("name", &self.name)
            .field("norad_id", &self.elements.norad_id)
            .field("epoch", &self.elements.datetime)
            .finish()
    }
}

/// Result of parsing one text body.
#[derive(Debug, Default)]
pub struct TleBatch {
    pub records: Vec<TleRecord>,
    pub skipped: Vec<MalformedEntry>,
}

impl TleBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parses a 3-line TLE body, keeping at most `max_records` element sets.
///
/// A body that looks like an HTML page (an error page served with 200) is
/// non-conforming as a whole.
pub fn parse_tle_batch(text: &str, max_records: usize) -> Result<TleBatch, SourceError> {
    if text.to_lowercase().contains("<html") {
        return Err(SourceError::NonConforming(
            "received HTML instead of TLE data".to_string(),
        ));
    }

    let lines: Vec<&str> = text.trim().lines().collect();
    let mut batch = TleBatch::default();

    for (offset, group) in lines.chunks(3).enumerate() {
        if batch.records.len() >= max_records {
            debug!(max_records, "TLE cap reached");
            break;
        }

        let number = offset + 1;
        match parse_group(number, group) {
            Ok(record) => batch.records.push(record),
            Err(entry) => {
                warn!("Skipping malformed TLE: {}", entry);
                batch.skipped.push(entry);
            }
        }
    }

    Ok(batch)
}

fn parse_group(number: usize, group: &[&str]) -> Result<TleRecord, MalformedEntry> {
    let name = match group.first().map(|l| l.trim()) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => format!("Unnamed Satellite {}", number),
    };
    let malformed = |reason| MalformedEntry {
        group: number,
        name: name.clone(),
        reason,
    };

    let [_, line1, line2] = group else {
        return Err(malformed(MalformedReason::Incomplete(group.len())));
    };
    let (line1, line2) = (line1.trim(), line2.trim());

    if line1.len() != TLE_LINE_LEN || line2.len() != TLE_LINE_LEN {
        return Err(malformed(MalformedReason::WrongLineLength {
            line1: line1.len(),
            line2: line2.len(),
        }));
    }

    let elements = Elements::from_tle(Some(name.clone()), line1.as_bytes(), line2.as_bytes())
        .map_err(|e| malformed(MalformedReason::Rejected(e.to_string())))?;
    let constants = Constants::from_elements(&elements)
        .map_err(|e| malformed(MalformedReason::Rejected(e.to_string())))?;

    Ok(TleRecord {
        name,
        elements,
        constants,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub const ISS: &str = "ISS (ZARYA)
1 25544U 98067A   20194.88612269 -.00002218  00000-0 -31515-4 0  9992
2 25544  51.6461 221.2784 0001413  89.1723 280.4612 15.49507896236008";

    pub const VANGUARD: &str = "VANGUARD 1
1 00005U 58002B   00179.78495062  .00000023  00000-0  28098-4 0  4753
2 00005  34.2682 348.7242 1859667 331.7664  19.3264 10.82419157413667";

    /// Line 1 is one character short.
    pub const TRUNCATED: &str = "BROKEN SAT
1 99999U 98067A   20194.88612269 -.00002218  00000-0 -31515-4 0  999
2 99999  51.6461 221.2784 0001413  89.1723 280.4612 15.49507896236008";
}
