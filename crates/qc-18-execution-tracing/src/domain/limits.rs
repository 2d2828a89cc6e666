//! # Bounded Serializer
//!
//! Every span log field passes through [`cut_length`] so that a single
//! oversized payload cannot make a span unbounded. Collectors drop spans that
//! grow too large.

use serde::Serialize;

/// Appended to a truncated field.
pub const TRUNCATION_MARKER: &str = "... >-8 cut";

/// Per-category caps for span log fields, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceLimits {
    /// Raw store I/O dump.
    pub max_store_traced: usize,
    /// Message and result payload dumps.
    pub max_message_traced: usize,
    /// Captured logger output.
    pub max_logger_traced: usize,
    /// Cross-module packet descriptions.
    pub max_packet_description: usize,
    /// Applied to every field on top of its category cap.
    pub default_max_length: usize,
}

impl Default for TraceLimits {
    fn default() -> Self {
        Self {
            max_store_traced: 5_000,
            max_message_traced: 5_000,
            max_logger_traced: 5_000,
            max_packet_description: 5_000,
            default_max_length: 10_000,
        }
    }
}

impl TraceLimits {
    /// Cap a field with the default limit only.
    pub fn safe_field(&self, value: &str) -> String {
        cut_length(value, self.default_max_length)
    }

    /// Cap a field with its category limit, then with the default limit.
    pub fn capped_field(&self, value: &str, category_max: usize) -> String {
        self.safe_field(&cut_length(value, category_max))
    }
}

/// Truncate `data` to at most `max` bytes plus [`TRUNCATION_MARKER`].
///
/// Input that fits is returned trimmed but otherwise unchanged. Truncation
/// never splits a UTF-8 character, so the kept prefix may be a few bytes
/// shorter than `max`.
pub fn cut_length(data: &str, max: usize) -> String {
    if data.len() <= max {
        return data.trim().to_string();
    }
    let mut end = max;
    while !data.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &data[..end], TRUNCATION_MARKER)
        .trim()
        .to_string()
}

/// Serialize a payload for a log field. Failures are reported in place.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => format!("marshal error: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::ser::Error as _;
    use serde::Serializer;

    #[test]
    fn test_short_input_is_trimmed_only() {
        assert_eq!(cut_length("  hello \n", 100), "hello");
        assert_eq!(cut_length("", 0), "");
    }

    #[test]
    fn test_long_input_is_cut_with_marker() {
        let got = cut_length("abcdefghij", 4);
        assert_eq!(got, format!("abcd{TRUNCATION_MARKER}"));
    }

    #[test]
    fn test_cut_respects_char_boundaries() {
        // 'é' is two bytes; a cut at 3 would split the second one
        let got = cut_length("éé", 3);
        assert_eq!(got, format!("é{TRUNCATION_MARKER}"));
    }

    #[test]
    fn test_capped_field_applies_both_limits() {
        let limits = TraceLimits {
            max_message_traced: 8,
            default_max_length: 5,
            ..TraceLimits::default()
        };
        let got = limits.capped_field("0123456789", limits.max_message_traced);
        assert_eq!(got, format!("01234{TRUNCATION_MARKER}"));
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("boom"))
        }
    }

    #[test]
    fn test_to_json_reports_failure_in_place() {
        assert_eq!(to_json(&vec![1, 2]), "[1,2]");
        assert_eq!(to_json(&Unserializable), "marshal error: boom");
    }

    proptest! {
        #[test]
        fn prop_output_is_bounded(s in ".{0,200}", max in 0usize..150) {
            let got = cut_length(&s, max);
            prop_assert!(got.len() <= max + TRUNCATION_MARKER.len());
        }

        #[test]
        fn prop_fitting_input_is_unchanged(s in ".{0,64}") {
            let got = cut_length(&s, s.len());
            prop_assert_eq!(got, s.trim().to_string());
        }
    }
}
