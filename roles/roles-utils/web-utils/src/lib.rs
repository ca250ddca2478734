/// Format elapsed time in human-readable format
pub fn format_elapsed_time(now: u64, timestamp: u64) -> String {
    let elapsed = now.saturating_sub(timestamp);
    if elapsed < 60 {
        format!("{}s ago", elapsed)
    } else if elapsed < 3600 {
        format!("{}m ago", elapsed / 60)
    } else if elapsed < 86400 {
        format!("{}h ago", elapsed / 3600)
    } else {
        format!("{}d ago", elapsed / 86400)
    }
}

/// Format a hashrate given in TH/s, picking the unit that keeps the mantissa >= 1
pub fn format_hashrate_ths(ths: f64) -> String {
    if !ths.is_finite() || ths <= 0.0 {
        return "0 H/s".to_string();
    }
    if ths >= 1_000_000.0 {
        format!("{:.2} EH/s", ths / 1_000_000.0)
    } else if ths >= 1_000.0 {
        format!("{:.2} PH/s", ths / 1_000.0)
    } else if ths >= 1.0 {
        format!("{:.2} TH/s", ths)
    } else if ths >= 0.001 {
        format!("{:.2} GH/s", ths * 1_000.0)
    } else if ths >= 0.000_001 {
        format!("{:.2} MH/s", ths * 1_000_000.0)
    } else {
        format!("{:.2} KH/s", ths * 1_000_000_000.0)
    }
}

/// Signed percentage for a ratio, e.g. `-0.5` -> `"-50.0%"`
pub fn format_percent_change(ratio: f64) -> String {
    let pct = ratio * 100.0;
    if pct > 0.0 {
        format!("+{:.1}%", pct)
    } else {
        format!("{:.1}%", pct)
    }
}

/// Thousands-separated integer, e.g. `25000` -> `"25,000"`
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Compact difficulty formatting for best-share values (K/M/G/T/P)
pub fn format_difficulty(value: f64) -> String {
    const UNITS: &[(f64, &str)] = &[(1e15, "P"), (1e12, "T"), (1e9, "G"), (1e6, "M"), (1e3, "K")];

    if !value.is_finite() || value <= 0.0 {
        return "0".to_string();
    }
    for &(threshold, suffix) in UNITS {
        if value >= threshold {
            return format!("{:.2}{}", value / threshold, suffix);
        }
    }
    format!("{:.0}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed_seconds() {
        assert_eq!(format_elapsed_time(100, 50), "50s ago");
    }

    #[test]
    fn test_format_elapsed_minutes() {
        assert_eq!(format_elapsed_time(3700, 0), "61m ago");
    }

    #[test]
    fn test_format_elapsed_future_timestamp() {
        assert_eq!(format_elapsed_time(10, 50), "0s ago");
    }

    #[test]
    fn test_format_hashrate_th() {
        assert_eq!(format_hashrate_ths(40.0), "40.00 TH/s");
    }

    #[test]
    fn test_format_hashrate_sub_th() {
        assert_eq!(format_hashrate_ths(0.5), "500.00 GH/s");
    }

    #[test]
    fn test_format_hashrate_ph() {
        assert_eq!(format_hashrate_ths(2_500.0), "2.50 PH/s");
    }

    #[test]
    fn test_format_hashrate_zero_and_nan() {
        assert_eq!(format_hashrate_ths(0.0), "0 H/s");
        assert_eq!(format_hashrate_ths(f64::NAN), "0 H/s");
    }

    #[test]
    fn test_format_percent_change() {
        assert_eq!(format_percent_change(-0.5), "-50.0%");
        assert_eq!(format_percent_change(0.125), "+12.5%");
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1_000_000), "1,000,000");
    }

    #[test]
    fn test_format_difficulty() {
        assert_eq!(format_difficulty(512.0), "512");
        assert_eq!(format_difficulty(1_500_000.0), "1.50M");
        assert_eq!(format_difficulty(2.0e12), "2.00T");
    }
}
