//! Parses the cache's `maxBytes` configuration: an absolute size string
//! (`"100MB"`, `"1.5GB"`, `"512KB"`, case-insensitive) or a percentage of
//! host physical memory (`"25%"`, strictly in `(0, 100]`). See spec.md §4.5.

use crate::error::FrameworkError;

/// Resolves a `maxBytes` configuration string to a concrete byte count.
/// `total_memory_bytes` is injected so percentage resolution is testable
/// without depending on the actual host (see `sys_info::mem_info` at the
/// call site in `cache::engine`).
pub fn parse_max_bytes(spec: &str, total_memory_bytes: u64) -> Result<u64, FrameworkError> {
    let trimmed = spec.trim();
    if let Some(pct) = trimmed.strip_suffix('%') {
        let pct: f64 = pct
            .trim()
            .parse()
            .map_err(|_| FrameworkError::configuration(format!("invalid percentage: {spec:?}")))?;
        if !(pct > 0.0 && pct <= 100.0) {
            return Err(FrameworkError::configuration(format!(
                "percentage must be in (0, 100]: {spec:?}"
            )));
        }
        return Ok(((total_memory_bytes as f64) * (pct / 100.0)) as u64);
    }

    let lower = trimmed.to_ascii_lowercase();
    for (suffix, multiplier) in UNITS {
        if let Some(number) = lower.strip_suffix(suffix) {
            let number: f64 = number
                .trim()
                .parse()
                .map_err(|_| FrameworkError::configuration(format!("invalid size: {spec:?}")))?;
            if number < 0.0 {
                return Err(FrameworkError::configuration(format!(
                    "size must not be negative: {spec:?}"
                )));
            }
            return Ok((number * (*multiplier as f64)) as u64);
        }
    }

    Err(FrameworkError::configuration(format!(
        "unrecognized maxBytes value: {spec:?}"
    )))
}

/// Longest suffixes first so `"gb"` is not shadowed by a shorter match.
const UNITS: &[(&str, u64)] = &[
    ("gb", 1024 * 1024 * 1024),
    ("mb", 1024 * 1024),
    ("kb", 1024),
    ("b", 1),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_sizes_case_insensitively() {
        assert_eq!(parse_max_bytes("100MB", 0).unwrap(), 100 * 1024 * 1024);
        assert_eq!(parse_max_bytes("512kb", 0).unwrap(), 512 * 1024);
        assert_eq!(
            parse_max_bytes("1.5GB", 0).unwrap(),
            (1.5 * 1024.0 * 1024.0 * 1024.0) as u64
        );
    }

    #[test]
    fn parses_percentage_of_host_memory() {
        let total = 16u64 * 1024 * 1024 * 1024;
        assert_eq!(parse_max_bytes("25%", total).unwrap(), total / 4);
        assert_eq!(parse_max_bytes("100%", total).unwrap(), total);
    }

    #[test]
    fn rejects_out_of_range_percentage() {
        assert!(parse_max_bytes("0%", 1000).is_err());
        assert!(parse_max_bytes("101%", 1000).is_err());
    }

    #[test]
    fn rejects_unrecognized_units() {
        assert!(parse_max_bytes("100TB-ish", 1000).is_err());
        assert!(parse_max_bytes("nonsense", 1000).is_err());
    }
}
