//! Action record codec
//!
//! An action record pairs an action id with the output it produced and the
//! output's modification time. The wire form is a single ASCII line with no
//! trailing newline:
//!
//! ```text
//! <lower-hex output-id> <signed-decimal nanoseconds-since-epoch>
//! ```
//!
//! Parsing is strict: exactly two fields, a non-empty lower-hex id, and a
//! valid `i64` nanosecond count. Trailing garbage is rejected.

use chrono::{DateTime, Utc};

use crate::error::{StratusError, StratusResult};

/// Decoded action record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    /// Content-addressed id of the referenced output
    pub output_id: String,
    /// Modification time of the output when it was stored
    pub mod_time: DateTime<Utc>,
}

impl ActionRecord {
    /// Create a record for `output_id` stamped with `mod_time`
    pub fn new(output_id: impl Into<String>, mod_time: DateTime<Utc>) -> Self {
        Self {
            output_id: output_id.into(),
            mod_time,
        }
    }

    /// Encode to the single-line wire form
    pub fn encode(&self) -> String {
        format!(
            "{} {}",
            self.output_id,
            self.mod_time.timestamp_nanos_opt().unwrap_or_default()
        )
    }

    /// Parse the wire form, rejecting anything malformed
    pub fn parse(data: &[u8]) -> StratusResult<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| StratusError::MalformedAction("not valid UTF-8".to_string()))?;

        let mut fields = text.split(' ');
        let output_id = fields
            .next()
            .filter(|id| is_hex_id(id))
            .ok_or_else(|| StratusError::MalformedAction(format!("bad output id in {text:?}")))?;
        let nanos = fields
            .next()
            .and_then(|f| f.parse::<i64>().ok())
            .ok_or_else(|| StratusError::MalformedAction(format!("bad timestamp in {text:?}")))?;
        if fields.next().is_some() {
            return Err(StratusError::MalformedAction(format!(
                "trailing data in {text:?}"
            )));
        }

        Ok(Self {
            output_id: output_id.to_string(),
            mod_time: DateTime::from_timestamp_nanos(nanos),
        })
    }
}

/// Check that `id` is a lower-hex string of at least two characters
///
/// Record ids are opaque to the engine but must be safe to embed in file
/// paths and remote keys, and key partitioning takes the first two
/// characters, so anything shorter or outside `[0-9a-f]+` is refused.
pub fn is_hex_id(id: &str) -> bool {
    id.len() >= 2
        && id
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
