//! Human-facing number formatting.

/// Formats `n` with comma thousands separators (`1234567` → `"1,234,567"`).
pub fn format_with_commas(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Converts a byte rate to MiB/s.
pub fn mib_per_sec(bytes_per_sec: f64) -> f64 {
    bytes_per_sec / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commas() {
        assert_eq!(format_with_commas(0), "0");
        assert_eq!(format_with_commas(999), "999");
        assert_eq!(format_with_commas(1000), "1,000");
        assert_eq!(format_with_commas(123456), "123,456");
        assert_eq!(format_with_commas(10_737_418_240), "10,737,418,240");
    }

    #[test]
    fn rate_conversion() {
        assert_eq!(mib_per_sec(2.0 * 1024.0 * 1024.0), 2.0);
    }
}
