//! Continuation cursor for pull-back search queries

use std::fmt;
use std::str::FromStr;

use crate::FleetError;

/// Position inside the results of one search job, encoded as `"<sid>$<offset>"`.
///
/// A cursor is only meaningful for the job that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCursor {
    pub sid: String,
    pub offset: usize,
}

impl SearchCursor {
    pub fn new(sid: impl Into<String>, offset: usize) -> Self {
        Self { sid: sid.into(), offset }
    }
}

impl fmt::Display for SearchCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}${}", self.sid, self.offset)
    }
}

impl FromStr for SearchCursor {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sid, offset) = s
            .split_once('$')
            .ok_or_else(|| FleetError::InvalidInput(format!("invalid cursor: {}", s)))?;
        if sid.is_empty() {
            return Err(FleetError::InvalidInput(format!("invalid cursor: {}", s)));
        }
        let offset = offset
            .parse::<usize>()
            .map_err(|_| FleetError::InvalidInput(format!("invalid cursor offset: {}", s)))?;
        Ok(Self { sid: sid.to_string(), offset })
    }
}
