//! Hook path parsing.
//!
//! A hook path names a signal in the tree plus the phase and priority to
//! attach at:
//!
//! ```text
//! entity.add.position:post@150
//! entity.add.*:pre
//! external.update@10[]
//! ```
//!
//! The phase defaults to the broadcast (`emit`) phase and the priority to the
//! engine's configured default. A trailing `[]` asks for raw-mode invocation,
//! where the listener receives the argument list as a single array value.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::signal::{Phase, SlotOptions};

const RAW_MARKER: &str = "[]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookPath {
    pub segments: Vec<String>,
    pub phase: Phase,
    pub priority: Option<i32>,
    pub raw: bool,
}

impl HookPath {
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidHookPath {
            path: path.to_owned(),
            reason: reason.to_owned(),
        };

        let (rest, raw) = match path.strip_suffix(RAW_MARKER) {
            Some(rest) => (rest, true),
            None => (path, false),
        };

        let (rest, priority) = match rest.rsplit_once('@') {
            Some((rest, priority)) => {
                let priority = priority
                    .parse::<i32>()
                    .map_err(|_| invalid("priority must be an integer"))?;
                (rest, Some(priority))
            }
            None => (rest, None),
        };

        let (rest, phase) = match rest.split_once(':') {
            Some((rest, phase)) => (rest, phase.parse::<Phase>().map_err(|e| invalid(&e))?),
            None => (rest, Phase::default()),
        };

        let segments: Vec<String> = rest.split('.').map(str::to_owned).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(invalid("empty path segment"));
        }
        if segments.iter().any(|segment| segment.contains([':', '@'])) {
            return Err(invalid("phase and priority must come after the path"));
        }

        Ok(Self {
            segments,
            phase,
            priority,
            raw,
        })
    }

    /// The dotted signal path without phase or priority.
    pub fn signal_path(&self) -> String {
        self.segments.join(".")
    }

    /// Registration options, falling back to `default_priority`.
    pub fn options(&self, default_priority: i32) -> SlotOptions {
        SlotOptions {
            priority: self.priority.unwrap_or(default_priority),
            raw: self.raw,
            once: false,
        }
    }
}

impl FromStr for HookPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for HookPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.signal_path(), self.phase)?;
        if let Some(priority) = self.priority {
            write!(f, "@{priority}")?;
        }
        if self.raw {
            f.write_str(RAW_MARKER)?;
        }
        Ok(())
    }
}
