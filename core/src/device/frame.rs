use serde::{Deserialize, Serialize};
use std::fmt;

/// One bracket-delimited payload pulled verbatim out of a raw telemetry line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelemetryFrame(String);

impl TelemetryFrame {
    /// Locates the first `{` and the last `}` of `line` and returns the span
    /// between them, inclusive. Lines without a well-formed pair yield `None`;
    /// the interior is not validated here.
    pub fn extract(line: &str) -> Option<Self> {
        let open = line.find('{')?;
        let close = line.rfind('}')?;
        if close <= open {
            return None;
        }
        Some(Self(line[open..=close].to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TelemetryFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_strips_surrounding_noise() {
        let frame = TelemetryFrame::extract("row 3 -> {0, 5, 7.0}, {0, 10, 2.5}\r").unwrap();
        assert_eq!(frame.as_str(), "{0, 5, 7.0}, {0, 10, 2.5}");
    }

    #[test]
    fn extract_ignores_lines_without_a_bracket_pair() {
        assert_eq!(TelemetryFrame::extract("READY"), None);
        assert_eq!(TelemetryFrame::extract("{0, 5, 7.0"), None);
        assert_eq!(TelemetryFrame::extract("0, 5, 7.0}"), None);
        assert_eq!(TelemetryFrame::extract("} garbage {"), None);
        assert_eq!(TelemetryFrame::extract(""), None);
    }

    #[test]
    fn extract_keeps_interior_unvalidated() {
        let frame = TelemetryFrame::extract("{not, a, triplet}").unwrap();
        assert_eq!(frame.to_string(), "{not, a, triplet}");
    }
}
