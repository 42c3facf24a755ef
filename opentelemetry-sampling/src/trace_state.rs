//! Codec for the `ot` trace-state member carrying the sampling threshold and
//! the shared random draw.
//!
//! Every process participating in a trace re-encodes this member, in any
//! language, so parsing and serialization have to be bit-exact: `th:` holds
//! the 56-bit rejection threshold as its most-significant hex digits with
//! trailing zeros trimmed, `rv:` holds the 56-bit random draw as exactly 14
//! hex digits, and unrecognized sub-members round-trip verbatim, in order.

use opentelemetry::trace::TraceState;

/// The lowest threshold that can never be satisfied by a random value.
///
/// Thresholds live in `[0, 2^56]`: `0` samples everything, values above the
/// maximum 56-bit sample point (`2^56 - 1`) sample nothing.
pub const MAX_THRESHOLD: u64 = 1 << 56;

/// Sentinel for "no usable threshold".
pub const INVALID_THRESHOLD: u64 = u64::MAX;

/// Sentinel for "no random value present".
pub const INVALID_RANDOM_VALUE: u64 = u64::MAX;

/// The trace-state key owned by this crate. All other keys pass through
/// untouched.
pub(crate) const TRACE_STATE_KEY: &str = "ot";

const MAX_VALUE_LEN: usize = 256;
const HEX_DIGITS: usize = 14;

/// The parsed sampling member of a [`TraceState`].
///
/// Derived fresh from the parent trace state on every decision; input is
/// untrusted wire data, so parsing never fails; malformed fields degrade to
/// the invalid sentinels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OtelTraceState {
    threshold: u64,
    random_value: u64,
    rest: Vec<String>,
}

impl Default for OtelTraceState {
    fn default() -> Self {
        OtelTraceState {
            threshold: INVALID_THRESHOLD,
            random_value: INVALID_RANDOM_VALUE,
            rest: Vec::new(),
        }
    }
}

impl OtelTraceState {
    /// Parse the sampling member out of `trace_state`.
    ///
    /// An absent, empty or oversized member yields the all-invalid state.
    pub fn parse(trace_state: &TraceState) -> Self {
        match trace_state.get(TRACE_STATE_KEY) {
            Some(value) => Self::parse_value(value),
            None => Self::default(),
        }
    }

    fn parse_value(value: &str) -> Self {
        if value.is_empty() || value.len() > MAX_VALUE_LEN {
            return Self::default();
        }
        let mut state = Self::default();
        for member in value.split(';') {
            if let Some(hex) = member.strip_prefix("th:") {
                state.threshold = parse_threshold(hex);
            } else if let Some(hex) = member.strip_prefix("rv:") {
                state.random_value = parse_random_value(hex);
            } else if !member.is_empty() {
                state.rest.push(member.to_string());
            }
        }
        state
    }

    /// The rejection threshold, or [`INVALID_THRESHOLD`].
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// The shared random draw, or [`INVALID_RANDOM_VALUE`].
    pub fn random_value(&self) -> u64 {
        self.random_value
    }

    /// Unrecognized sub-members, preserved verbatim in arrival order.
    pub fn rest(&self) -> &[String] {
        &self.rest
    }

    /// Whether a usable threshold is present (`<= 2^56`).
    pub fn has_valid_threshold(&self) -> bool {
        self.threshold <= MAX_THRESHOLD
    }

    /// Whether a usable random value is present (`< 2^56`).
    pub fn has_valid_random_value(&self) -> bool {
        self.random_value < MAX_THRESHOLD
    }

    /// Set the threshold carried forward to child spans.
    pub fn set_threshold(&mut self, threshold: u64) {
        self.threshold = threshold;
    }

    /// Remove the threshold so descendants cannot misread it as calibrated.
    pub fn clear_threshold(&mut self) {
        self.threshold = INVALID_THRESHOLD;
    }

    /// Set the random draw carried forward to child spans.
    pub fn set_random_value(&mut self, random_value: u64) {
        self.random_value = random_value;
    }

    /// Serialize back to the member value.
    ///
    /// Returns the empty string for the all-default state (invalid-or-never
    /// threshold, no random value, no extra sub-members), so the member is
    /// omitted entirely in the common fully-sampling configuration.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        if self.has_valid_threshold() && self.threshold < MAX_THRESHOLD {
            out.push_str("th:");
            out.push_str(&format_threshold(self.threshold));
            out.push(';');
        }
        if self.has_valid_random_value() {
            out.push_str(&format!("rv:{:014x};", self.random_value));
        }
        for entry in &self.rest {
            out.push_str(entry);
            out.push(';');
        }
        out.pop();
        out
    }

    /// Apply this sampling state to `trace_state`, inserting or removing the
    /// `ot` member as appropriate and leaving every other member untouched.
    pub fn apply_to(&self, trace_state: &TraceState) -> TraceState {
        let value = self.serialize();
        let updated = if value.is_empty() {
            trace_state.delete(TRACE_STATE_KEY)
        } else {
            trace_state.insert(TRACE_STATE_KEY, value)
        };
        // The key and the serialized value are valid by construction, but the
        // wire input is not trusted enough to panic over.
        updated.unwrap_or_else(|_| trace_state.clone())
    }
}

/// Parse a `th:` value: 1 to 14 hex digits interpreted as the
/// most-significant digits of a 56-bit threshold.
fn parse_threshold(hex: &str) -> u64 {
    if hex.is_empty() || hex.len() > HEX_DIGITS || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return INVALID_THRESHOLD;
    }
    match u64::from_str_radix(hex, 16) {
        Ok(0) => 0,
        Ok(value) => value << (4 * (HEX_DIGITS - hex.len())),
        Err(_) => INVALID_THRESHOLD,
    }
}

/// Parse an `rv:` value: exactly 14 hex digits. A random draw is a point, not
/// a boundary, so a trimmed representation is not accepted.
fn parse_random_value(hex: &str) -> u64 {
    if hex.len() != HEX_DIGITS || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return INVALID_RANDOM_VALUE;
    }
    u64::from_str_radix(hex, 16).unwrap_or(INVALID_RANDOM_VALUE)
}

fn format_threshold(threshold: u64) -> String {
    let hex = format!("{threshold:014x}");
    let trimmed = hex.trim_end_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn trace_state(value: &str) -> TraceState {
        TraceState::from_key_value(vec![(TRACE_STATE_KEY, value)]).unwrap()
    }

    fn parse(value: &str) -> OtelTraceState {
        OtelTraceState::parse(&trace_state(value))
    }

    #[test]
    fn absent_member_is_all_invalid() {
        let state = OtelTraceState::parse(&TraceState::default());
        assert!(!state.has_valid_threshold());
        assert!(!state.has_valid_random_value());
        assert!(state.rest().is_empty());
        assert_eq!(state.serialize(), "");
    }

    #[test]
    fn short_threshold_occupies_most_significant_digits() {
        let state = parse("th:c8");
        assert_eq!(state.threshold(), 0xc8 << 48);
        assert!(!state.has_valid_random_value());
    }

    #[rstest]
    #[case("th:0", 0)]
    #[case("th:00000000000000", 0)]
    #[case("th:8", 0x8 << 52)]
    #[case("th:08", 0x08 << 48)]
    #[case("th:ffffffffffffff", (1 << 56) - 1)]
    #[case("th:AB", 0xab << 48)]
    fn threshold_parsing(#[case] value: &str, #[case] expected: u64) {
        assert_eq!(parse(value).threshold(), expected);
    }

    #[rstest]
    #[case("th:")]
    #[case("th:fffffffffffffff")] // 15 digits
    #[case("th:xyz")]
    #[case("th:+1")]
    #[case("th:1 ")]
    fn malformed_threshold_is_invalid(#[case] value: &str) {
        assert!(!parse(value).has_valid_threshold());
    }

    #[rstest]
    #[case("rv:00000000000000", 0)]
    #[case("rv:ab0000000000cd", 0xab0000000000cd)]
    #[case("rv:FFFFFFFFFFFFFF", (1 << 56) - 1)]
    fn random_value_parsing(#[case] value: &str, #[case] expected: u64) {
        assert_eq!(parse(value).random_value(), expected);
    }

    #[rstest]
    #[case("rv:0000000000000")] // 13 digits: not trimmable
    #[case("rv:000000000000000")] // 15 digits
    #[case("rv:")]
    #[case("rv:0000000000000g")]
    fn malformed_random_value_is_invalid(#[case] value: &str) {
        assert!(!parse(value).has_valid_random_value());
    }

    #[test]
    fn oversized_member_is_ignored() {
        let mut value = String::from("th:8;");
        while value.len() <= 256 {
            value.push_str("a=b;");
        }
        let state = parse(&value);
        assert!(!state.has_valid_threshold());
        assert!(state.rest().is_empty());
    }

    #[test]
    fn unknown_members_round_trip_in_order() {
        let state = parse("vendor=a;th:c;other=b;rv:1234567890abcd");
        assert_eq!(state.rest(), ["vendor=a", "other=b"]);
        assert_eq!(state.serialize(), "th:c;rv:1234567890abcd;vendor=a;other=b");
    }

    #[test]
    fn one_bad_field_does_not_poison_the_rest() {
        let state = parse("th:notahexnumber;rv:ab0000000000cd");
        assert!(!state.has_valid_threshold());
        assert_eq!(state.random_value(), 0xab0000000000cd);
    }

    #[rstest]
    #[case(0, "th:0")]
    #[case(0x8 << 52, "th:8")]
    #[case(0xc8 << 48, "th:c8")]
    #[case(0x123400000 << 20, "th:1234")]
    #[case((1 << 56) - 1, "th:ffffffffffffff")]
    fn threshold_serialization_trims_trailing_zeros(#[case] threshold: u64, #[case] expected: &str) {
        let mut state = OtelTraceState::default();
        state.set_threshold(threshold);
        assert_eq!(state.serialize(), expected);
    }

    #[test]
    fn never_threshold_serializes_to_empty() {
        let mut state = OtelTraceState::default();
        state.set_threshold(MAX_THRESHOLD);
        assert_eq!(state.serialize(), "");
    }

    #[test]
    fn random_value_serializes_zero_padded() {
        let mut state = OtelTraceState::default();
        state.set_random_value(0xcd);
        assert_eq!(state.serialize(), "rv:000000000000cd");
    }

    #[rstest]
    #[case(0, 0)]
    #[case(0x80000000000000, 0x123456789abcde)]
    #[case((1 << 56) - 1, (1 << 56) - 1)]
    fn round_trip(#[case] threshold: u64, #[case] random_value: u64) {
        let mut state = OtelTraceState::default();
        state.set_threshold(threshold);
        state.set_random_value(random_value);
        let reparsed = parse(&state.serialize());
        assert_eq!(reparsed.threshold(), threshold);
        assert_eq!(reparsed.random_value(), random_value);
    }

    #[test]
    fn apply_to_preserves_other_vendors() {
        let original = TraceState::from_key_value(vec![("congo", "t61rcWkgMzE")]).unwrap();
        let mut state = OtelTraceState::default();
        state.set_random_value(0x1234567890abcd);
        let updated = state.apply_to(&original);
        assert_eq!(updated.get("congo"), Some("t61rcWkgMzE"));
        assert_eq!(updated.get("ot"), Some("rv:1234567890abcd"));
    }

    #[test]
    fn apply_to_removes_member_when_empty() {
        let original = trace_state("th:c8");
        let updated = OtelTraceState::default().apply_to(&original);
        assert_eq!(updated.get("ot"), None);
    }
}
