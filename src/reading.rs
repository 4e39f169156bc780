//! Inbound reading messages.
//!
//! Every channel carries text messages of the form
//! `[<timestamp>, <value-or-empty>]`, for example `[03/07/23 14:06:00, 35.5]`.
//! The value always starts at byte [`VALUE_OFFSET`]; producers and consumers
//! must agree on the timestamp width for that to hold.

use serde::Serialize;

use crate::error::ReadingError;

/// Width of the timestamp field (`MM/DD/YY HH:MM:SS`).
pub const TIMESTAMP_WIDTH: usize = 17;

/// Byte offset of the value field: `[`, the timestamp, then `, `.
pub const VALUE_OFFSET: usize = TIMESTAMP_WIDTH + 3;

/// A single timestamped reading for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    /// Timestamp exactly as sent by the producer.
    pub timestamp: String,
    /// Sensor value, `None` when no probe is inserted.
    pub value: Option<f64>,
    /// The message the reading was extracted from.
    pub raw: String,
}

impl Reading {
    /// Parse an inbound message.
    ///
    /// An empty or blank value field yields an absent reading. Anything that
    /// is not a finite number is rejected.
    pub fn parse(payload: &str) -> Result<Self, ReadingError> {
        let raw = payload.trim();
        let malformed = |reason| ReadingError::Malformed {
            payload: raw.to_string(),
            reason,
        };

        if !raw.starts_with('[') {
            return Err(malformed("missing opening '['"));
        }
        let body = raw
            .strip_suffix(']')
            .ok_or_else(|| malformed("missing closing ']'"))?;
        if body.len() < VALUE_OFFSET {
            return Err(malformed("shorter than the timestamp prefix"));
        }

        // `get` also rejects offsets that fall inside a multi-byte character
        match body.get(TIMESTAMP_WIDTH + 1..VALUE_OFFSET) {
            Some(", ") => {}
            _ => return Err(malformed("no ', ' after the timestamp")),
        }

        let timestamp = &body[1..=TIMESTAMP_WIDTH];
        let field = &body[VALUE_OFFSET..];
        let value = parse_value(field).ok_or_else(|| ReadingError::NotNumeric {
            payload: raw.to_string(),
            value: field.trim().to_string(),
        })?;

        Ok(Self {
            timestamp: timestamp.to_string(),
            value,
            raw: raw.to_string(),
        })
    }

    /// Build a numeric reading together with its wire form.
    pub fn numeric(timestamp: &str, value: f64) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            value: Some(value),
            raw: format!("[{}, {}]", timestamp, value),
        }
    }

    /// Build an absent reading together with its wire form.
    pub fn absent(timestamp: &str) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            value: None,
            raw: format!("[{}, ]", timestamp),
        }
    }

    /// Whether this reading carries no value.
    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }
}

/// `Some(None)` for blank, `Some(Some(v))` for a finite number, `None` otherwise.
fn parse_value(field: &str) -> Option<Option<f64>> {
    let field = field.trim();
    if field.is_empty() {
        return Some(None);
    }
    match field.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(Some(v)),
        _ => None,
    }
}

/// Format a message in the wire layout [`Reading::parse`] expects.
///
/// `value` is passed through untouched (it may be empty).
pub fn format_message(timestamp: &str, value: &str) -> Result<String, ReadingError> {
    if timestamp.len() != TIMESTAMP_WIDTH {
        return Err(ReadingError::TimestampWidth {
            timestamp: timestamp.to_string(),
            expected: TIMESTAMP_WIDTH,
        });
    }
    Ok(format!("[{}, {}]", timestamp, value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: &str = "03/07/23 14:06:00";

    #[test]
    fn test_value_offset_matches_prefix() {
        let message = format!("[{}, ", TS);
        assert_eq!(message.len(), VALUE_OFFSET);
        assert_eq!(VALUE_OFFSET, 20);
    }

    #[test]
    fn test_parse_numeric() {
        let reading = Reading::parse("[03/07/23 14:06:00, 35.5]").unwrap();
        assert_eq!(reading.timestamp, TS);
        assert_eq!(reading.value, Some(35.5));
        assert_eq!(reading.raw, "[03/07/23 14:06:00, 35.5]");
    }

    #[test]
    fn test_parse_empty_value_is_absent() {
        let reading = Reading::parse("[03/07/23 14:06:00, ]").unwrap();
        assert!(reading.is_absent());
        assert_eq!(reading.timestamp, TS);
    }

    #[test]
    fn test_parse_blank_value_is_absent() {
        let reading = Reading::parse("[03/07/23 14:06:00,    ]").unwrap();
        assert!(reading.is_absent());
    }

    #[test]
    fn test_parse_zero_is_not_absent() {
        let reading = Reading::parse("[03/07/23 14:06:00, 0]").unwrap();
        assert_eq!(reading.value, Some(0.0));
    }

    #[test]
    fn test_parse_trims_line_endings() {
        let reading = Reading::parse("[03/07/23 14:06:00, 150.25]\r\n").unwrap();
        assert_eq!(reading.value, Some(150.25));
        assert_eq!(reading.raw, "[03/07/23 14:06:00, 150.25]");
    }

    #[test]
    fn test_parse_negative_value() {
        let reading = Reading::parse("[03/07/23 14:06:00, -4.5]").unwrap();
        assert_eq!(reading.value, Some(-4.5));
    }

    #[test]
    fn test_parse_garbage_value() {
        let err = Reading::parse("[03/07/23 14:06:00, hot]").unwrap_err();
        assert_eq!(
            err,
            ReadingError::NotNumeric {
                payload: "[03/07/23 14:06:00, hot]".to_string(),
                value: "hot".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_non_finite() {
        assert!(matches!(
            Reading::parse("[03/07/23 14:06:00, NaN]"),
            Err(ReadingError::NotNumeric { .. })
        ));
        assert!(matches!(
            Reading::parse("[03/07/23 14:06:00, inf]"),
            Err(ReadingError::NotNumeric { .. })
        ));
    }

    #[test]
    fn test_parse_missing_brackets() {
        assert!(matches!(
            Reading::parse("03/07/23 14:06:00, 35.5]"),
            Err(ReadingError::Malformed { .. })
        ));
        assert!(matches!(
            Reading::parse("[03/07/23 14:06:00, 35.5"),
            Err(ReadingError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_short_timestamp() {
        // A 16-character timestamp shifts the separator off the fixed offset
        let err = Reading::parse("[3/07/23 14:06:00, 35.5]").unwrap_err();
        assert!(matches!(err, ReadingError::Malformed { .. }));
    }

    #[test]
    fn test_parse_too_short() {
        assert!(matches!(
            Reading::parse("[]"),
            Err(ReadingError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_multibyte_does_not_panic() {
        let err = Reading::parse("[03/07/23 14:06:0é, 1]").unwrap_err();
        assert!(matches!(err, ReadingError::Malformed { .. }));
    }

    #[test]
    fn test_format_message() {
        assert_eq!(
            format_message(TS, "35.5").unwrap(),
            "[03/07/23 14:06:00, 35.5]"
        );
        assert_eq!(format_message(TS, "").unwrap(), "[03/07/23 14:06:00, ]");
    }

    #[test]
    fn test_format_message_rejects_wrong_width() {
        let err = format_message("2023-03-07T14:06:00Z", "35.5").unwrap_err();
        assert_eq!(
            err,
            ReadingError::TimestampWidth {
                timestamp: "2023-03-07T14:06:00Z".to_string(),
                expected: TIMESTAMP_WIDTH,
            }
        );
    }

    #[test]
    fn test_constructors_produce_parseable_messages() {
        let numeric = Reading::numeric(TS, 148.5);
        assert_eq!(Reading::parse(&numeric.raw).unwrap(), numeric);

        let absent = Reading::absent(TS);
        assert_eq!(Reading::parse(&absent.raw).unwrap(), absent);
    }
}
