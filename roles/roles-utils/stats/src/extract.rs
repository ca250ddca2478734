//! Normalization of raw pool JSON fields.
//!
//! Every function here is total: malformed or missing input maps to a
//! fallback (`0`, `None` or an empty string) instead of an error, so a single
//! bad field never aborts a poll cycle.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

/// Hashrate suffix multipliers, expressed in TH/s per unit.
///
/// This is the only conversion table; every display string passes through
/// [`parse_hashrate_ths`].
pub const HASHRATE_SUFFIXES: &[(char, f64)] = &[
    ('K', 1e-9),
    ('M', 1e-6),
    ('G', 1e-3),
    ('T', 1.0),
    ('P', 1e3),
    ('E', 1e6),
];

/// Multiplier for a bare number (H/s) into TH/s.
const BARE_HASHES_TO_THS: f64 = 1e-12;

/// Format used by the pool for `last_share_time`, implicitly UTC.
const SHARE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a suffix-coded hashrate string such as `"12.3T"`, `"450G"` or
/// `"1.2 PH/s"` into TH/s.
pub fn parse_hashrate_ths(raw: &str) -> f64 {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_suffix("/s")
        .or_else(|| trimmed.strip_suffix("/S"))
        .unwrap_or(trimmed)
        .trim_end();
    let trimmed = trimmed
        .strip_suffix(|c: char| c == 'H' || c == 'h')
        .unwrap_or(trimmed)
        .trim_end();

    let (number, multiplier) = match trimmed.chars().last() {
        Some(unit) if unit.is_ascii_alphabetic() => {
            let upper = unit.to_ascii_uppercase();
            match HASHRATE_SUFFIXES.iter().find(|(suffix, _)| *suffix == upper) {
                Some(&(_, multiplier)) => (&trimmed[..trimmed.len() - unit.len_utf8()], multiplier),
                None => return 0.0,
            }
        }
        _ => (trimmed, BARE_HASHES_TO_THS),
    };

    match number.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value * multiplier,
        _ => 0.0,
    }
}

/// Strip the pool-assigned prefix (everything through the first `.`).
///
/// Remaining dots are folded to `_` so the result is a fixed point:
/// `clean_worker_name(clean_worker_name(x)) == clean_worker_name(x)`.
/// Folding is lossy: `addr.rack.2` and `addr.rack_2` share one identity.
/// Whitespace is kept as sent.
pub fn clean_worker_name(raw: &str) -> String {
    let suffix = match raw.split_once('.') {
        Some((_, rest)) => rest,
        None => raw,
    };
    suffix.replace('.', "_")
}

/// Parse a share timestamp. Accepts `YYYY-MM-DD HH:MM:SS` (UTC implied),
/// RFC 3339 and unix seconds.
pub fn parse_share_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, SHARE_TIME_FORMAT) {
        return Some(naive.and_utc());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .filter(|secs| *secs > 0)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Read a JSON number (or numeric string) as `f64`.
pub fn value_f64(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Read a JSON number (or numeric string) as a non-negative integer.
pub fn value_u64(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite() && *v >= 0.0)
                        .map(|v| v as u64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Read a JSON string, or the textual form of a number.
pub fn value_str(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Read a field whose name already declares TH/s (e.g. `hashrate_1min_ths`).
/// Suffixed strings are still honoured.
pub fn value_ths(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => v,
            Ok(_) => 0.0,
            Err(_) => parse_hashrate_ths(s),
        },
        other => value_f64(other).max(0.0),
    }
}

/// Read a worker display hashrate (`"1.2T"`); bare numbers are H/s.
pub fn value_display_hashrate(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::String(s)) => parse_hashrate_ths(s),
        other => (value_f64(other) * BARE_HASHES_TO_THS).max(0.0),
    }
}

/// Read a timestamp given either as a formatted string or unix seconds.
pub fn value_time(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value {
        Some(Value::String(s)) => parse_share_time(s),
        Some(Value::Number(n)) => n
            .as_i64()
            .filter(|secs| *secs > 0)
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

/// First present key wins; used where the pool has renamed fields over time.
pub fn first_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| value.get(*key).filter(|v| !v.is_null()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= expected.abs() * 1e-9 + 1e-18,
            "{} != {}",
            actual,
            expected
        );
    }

    #[test]
    fn test_parse_hashrate_suffixes() {
        assert_close(parse_hashrate_ths("12.5T"), 12.5);
        assert_close(parse_hashrate_ths("500G"), 0.5);
        assert_close(parse_hashrate_ths("2P"), 2000.0);
        assert_close(parse_hashrate_ths("3M"), 3e-6);
    }

    #[test]
    fn test_parse_hashrate_ratios_match_across_units() {
        // K:M:G:T stay 1e3 apart regardless of baseline
        assert_close(parse_hashrate_ths("1000K"), parse_hashrate_ths("1M"));
        assert_close(parse_hashrate_ths("1000G"), parse_hashrate_ths("1T"));
    }

    #[test]
    fn test_parse_hashrate_with_unit_text() {
        assert_close(parse_hashrate_ths("1.5 TH/s"), 1.5);
        assert_close(parse_hashrate_ths("250 gh/s"), 0.25);
        assert_close(parse_hashrate_ths(" 7t "), 7.0);
    }

    #[test]
    fn test_parse_hashrate_bare_number_is_hashes() {
        assert_eq!(parse_hashrate_ths("0"), 0.0);
        assert_close(parse_hashrate_ths("1000000000000"), 1.0);
    }

    #[test]
    fn test_parse_hashrate_garbage_falls_back_to_zero() {
        assert_eq!(parse_hashrate_ths(""), 0.0);
        assert_eq!(parse_hashrate_ths("fast"), 0.0);
        assert_eq!(parse_hashrate_ths("12Z"), 0.0);
        assert_eq!(parse_hashrate_ths("-4T"), 0.0);
        assert_eq!(parse_hashrate_ths("T"), 0.0);
        assert_eq!(parse_hashrate_ths("NaNT"), 0.0);
    }

    #[test]
    fn test_clean_worker_name() {
        assert_eq!(clean_worker_name("bc1qxyz.bitaxe1"), "bitaxe1");
        assert_eq!(clean_worker_name("rig"), "rig");
        assert_eq!(clean_worker_name("bc1qxyz.rack.2"), "rack_2");
        assert_eq!(clean_worker_name(".lonely"), "lonely");
        assert_eq!(clean_worker_name("addr."), "");
        assert_eq!(clean_worker_name("addr. rig "), " rig ");
    }

    #[test]
    fn test_clean_worker_name_folds_dots_onto_underscores() {
        assert_eq!(
            clean_worker_name("addr.rack.2"),
            clean_worker_name("addr.rack_2")
        );
        assert_eq!(clean_worker_name("rack_2"), "rack_2");
    }

    #[test]
    fn test_clean_worker_name_idempotent() {
        let inputs = [
            "", ".", "..", "a", "a.b", "a.b.c", " a . b ", "bc1q.w-1", "x..y", "é.ü.ß", "a. .b",
        ];
        for input in inputs {
            let once = clean_worker_name(input);
            assert_eq!(clean_worker_name(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn test_parse_share_time_formats() {
        let expected = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(parse_share_time("2023-11-14 22:13:20"), Some(expected));
        assert_eq!(parse_share_time("2023-11-14T22:13:20Z"), Some(expected));
        assert_eq!(parse_share_time("2023-11-14T23:13:20+01:00"), Some(expected));
        assert_eq!(parse_share_time("1700000000"), Some(expected));
    }

    #[test]
    fn test_parse_share_time_invalid() {
        assert_eq!(parse_share_time(""), None);
        assert_eq!(parse_share_time("yesterday"), None);
        assert_eq!(parse_share_time("0"), None);
    }

    #[test]
    fn test_value_readers_fallbacks() {
        let doc = json!({
            "n": 12,
            "f": 1.5,
            "s": "42",
            "bad": "x",
            "neg": -3,
            "obj": {},
        });
        assert_eq!(value_u64(doc.get("n")), 12);
        assert_eq!(value_u64(doc.get("f")), 1);
        assert_eq!(value_u64(doc.get("s")), 42);
        assert_eq!(value_u64(doc.get("bad")), 0);
        assert_eq!(value_u64(doc.get("neg")), 0);
        assert_eq!(value_u64(doc.get("missing")), 0);
        assert_eq!(value_f64(doc.get("obj")), 0.0);
        assert_eq!(value_f64(doc.get("s")), 42.0);
        assert_eq!(value_str(doc.get("n")), "12");
        assert_eq!(value_str(doc.get("obj")), "");
    }

    #[test]
    fn test_value_ths_accepts_numbers_and_suffixes() {
        let doc = json!({ "a": 40.5, "b": "12", "c": "3P", "d": -1.0 });
        assert_eq!(value_ths(doc.get("a")), 40.5);
        assert_eq!(value_ths(doc.get("b")), 12.0);
        assert_close(value_ths(doc.get("c")), 3000.0);
        assert_eq!(value_ths(doc.get("d")), 0.0);
    }

    #[test]
    fn test_first_field_skips_nulls() {
        let doc = json!({ "bestever": null, "bestshare": 77 });
        assert_eq!(
            value_f64(first_field(&doc, &["bestever", "bestshare"])),
            77.0
        );
        assert!(first_field(&doc, &["nope"]).is_none());
    }
}
