//! Human-readable rendering of byte totals.

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Format a byte count into IEC units with at most one decimal place.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut unit_index = 0;
    let mut scaled = bytes as f64;
    while scaled >= 1024.0 && unit_index < UNITS.len() - 1 {
        scaled /= 1024.0;
        unit_index += 1;
    }

    let rounded = (scaled * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{} {}", rounded as u64, UNITS[unit_index])
    } else {
        format!("{rounded:.1} {}", UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::format_bytes;

    #[test]
    fn small_counts_stay_in_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
    }

    #[test]
    fn scales_through_units() {
        assert_eq!(format_bytes(1024), "1 KiB");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(1024 * 1024), "1 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 / 2), "1.5 GiB");
    }

    #[test]
    fn whole_values_drop_the_decimal() {
        assert_eq!(format_bytes(10 * 1024), "10 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5 GiB");
    }
}
