use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use std::str::FromStr;
use tokio::time::Duration;

/// Parses a duration string such as "30s", "10m", "5h", "3d", "250ms" or a
/// compound form like "1m30s".
///
/// Supported units:
/// - `ms` for milliseconds
/// - `s` for seconds
/// - `m` for minutes
/// - `h` for hours
/// - `d` for days
pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration string cannot be empty".to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (value_str, after_value) = rest.split_at(digits_end);

        let value = match u64::from_str(value_str) {
            Ok(v) => v,
            Err(_) => return Err(format!("Invalid numeric value in duration: '{}'", s)),
        };

        let unit_end = after_value
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(after_value.len());
        let (unit, next) = after_value.split_at(unit_end);

        let seconds_per_unit = |per: u64| {
            value
                .checked_mul(per)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("Duration is too large: '{}'", s))
        };

        let component = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => seconds_per_unit(60)?,
            "h" => seconds_per_unit(60 * 60)?,
            "d" => seconds_per_unit(24 * 60 * 60)?,
            "" => {
                return Err(format!(
                    "Missing duration unit after '{}'. Use 'ms', 's', 'm', 'h', or 'd'.",
                    value_str
                ))
            }
            other => {
                return Err(format!(
                    "Unknown duration unit: '{}'. Use 'ms', 's', 'm', 'h', or 'd'.",
                    other
                ))
            }
        };

        total = total
            .checked_add(component)
            .ok_or_else(|| format!("Duration is too large: '{}'", s))?;
        rest = next;
    }

    Ok(total)
}

/// Parses a comma-separated header string with support for escaped commas.
///
/// Use `\,` to include a literal comma in a header value.
/// Example: "Authorization:Bearer abc,X-Trace:a\,b"
pub fn parse_headers_with_escapes(headers_str: &str) -> Vec<String> {
    let mut headers = Vec::new();
    let mut current_header = String::new();
    let mut chars = headers_str.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if chars.peek() == Some(&',') {
                    current_header.push(',');
                    chars.next();
                } else {
                    current_header.push('\\');
                }
            }
            ',' => {
                if !current_header.trim().is_empty() {
                    headers.push(current_header.clone());
                }
                current_header.clear();
            }
            _ => {
                current_header.push(ch);
            }
        }
    }

    if !current_header.trim().is_empty() {
        headers.push(current_header);
    }

    headers
}

/// Generates a random identifier in the version-4 UUID textual layout.
///
/// The bytes come from the thread-local non-cryptographic RNG; this is meant
/// for unique-enough synthetic test data, not for anything adversarial.
pub fn generate_uuid() -> String {
    let bytes: [u8; 16] = rand::random();
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .hyphenated()
        .to_string()
}

/// Formats an instant as an ISO-8601 UTC timestamp with millisecond precision,
/// e.g. `2024-05-01T12:00:00.000Z`.
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Returns the current instant as an ISO-8601 UTC timestamp.
pub fn current_time() -> String {
    format_timestamp(Utc::now())
}

/// Returns now advanced by `hours_offset` hours (fractional and negative
/// offsets allowed), formatted like [`current_time`].
pub fn future_time(hours_offset: f64) -> String {
    format_timestamp(Utc::now() + hours_delta(hours_offset))
}

/// Converts an hour offset to a millisecond-resolution delta.
pub fn hours_delta(hours_offset: f64) -> TimeDelta {
    TimeDelta::milliseconds((hours_offset * 3_600_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod duration {
        use super::*;

        #[test]
        fn parse_minutes() {
            assert_eq!(
                parse_duration_string("10m").unwrap(),
                Duration::from_secs(600)
            );
        }

        #[test]
        fn parse_hours() {
            assert_eq!(
                parse_duration_string("5h").unwrap(),
                Duration::from_secs(18000)
            );
        }

        #[test]
        fn parse_days() {
            assert_eq!(
                parse_duration_string("3d").unwrap(),
                Duration::from_secs(259200)
            );
        }

        #[test]
        fn parse_seconds() {
            assert_eq!(
                parse_duration_string("30s").unwrap(),
                Duration::from_secs(30)
            );
        }

        #[test]
        fn parse_millis() {
            assert_eq!(
                parse_duration_string("250ms").unwrap(),
                Duration::from_millis(250)
            );
        }

        #[test]
        fn parse_compound() {
            assert_eq!(
                parse_duration_string("1m30s").unwrap(),
                Duration::from_secs(90)
            );
            assert_eq!(
                parse_duration_string("1h1m1s500ms").unwrap(),
                Duration::from_millis(3_661_500)
            );
        }

        #[test]
        fn trims_whitespace() {
            assert_eq!(
                parse_duration_string("  1m  ").unwrap(),
                Duration::from_secs(60)
            );
        }

        #[test]
        fn empty_string_errors() {
            let err = parse_duration_string("   ").unwrap_err();
            assert!(err.contains("empty"), "error was: {}", err);
        }

        #[test]
        fn unknown_suffix_errors() {
            let err = parse_duration_string("10x").unwrap_err();
            assert!(err.contains("Unknown duration unit"), "error was: {}", err);
        }

        #[test]
        fn no_suffix_errors() {
            let err = parse_duration_string("10").unwrap_err();
            assert!(err.contains("Missing duration unit"), "error was: {}", err);
        }

        #[test]
        fn no_number_errors() {
            let err = parse_duration_string("m").unwrap_err();
            assert!(err.contains("Invalid numeric"), "error was: {}", err);
        }

        #[test]
        fn negative_number_errors() {
            let err = parse_duration_string("-5m").unwrap_err();
            assert!(err.contains("Invalid numeric"), "error was: {}", err);
        }

        #[test]
        fn fractional_number_errors() {
            assert!(parse_duration_string("1.5s").is_err());
        }

        #[test]
        fn oversized_unit_errors() {
            let err = parse_duration_string("300000000000000000d").unwrap_err();
            assert!(err.contains("too large"), "error was: {}", err);
            assert!(parse_duration_string("18446744073709551615h").is_err());
        }

        #[test]
        fn oversized_compound_errors() {
            let err = parse_duration_string("18446744073709551615s1s").unwrap_err();
            assert!(err.contains("too large"), "error was: {}", err);
        }
    }

    #[test]
    fn test_parse_headers_with_escaped_comma() {
        let result = parse_headers_with_escapes("Authorization:Bearer t,X-List:a\\,b");

        assert_eq!(result.len(), 2);
        assert_eq!(result[0], "Authorization:Bearer t");
        assert_eq!(result[1], "X-List:a,b");
    }

    #[test]
    fn test_parse_headers_trailing_comma_and_blanks() {
        let result = parse_headers_with_escapes("A:1, ,B:2,");
        assert_eq!(result, vec!["A:1".to_string(), "B:2".to_string()]);
    }

    #[test]
    fn test_generate_uuid_layout() {
        for _ in 0..1000 {
            let id = generate_uuid();
            let bytes = id.as_bytes();
            assert_eq!(id.len(), 36, "id was {}", id);
            for pos in [8, 13, 18, 23] {
                assert_eq!(bytes[pos], b'-', "id was {}", id);
            }
            assert_eq!(bytes[14], b'4', "id was {}", id);
            assert!(
                matches!(bytes[19], b'8' | b'9' | b'a' | b'b'),
                "id was {}",
                id
            );
            assert!(id
                .chars()
                .all(|c| c == '-' || c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
    }

    #[test]
    fn test_generate_uuid_distinct() {
        let a = generate_uuid();
        let b = generate_uuid();
        assert_ne!(a, b);
    }

    #[test]
    fn test_current_time_is_iso_utc() {
        let now = current_time();
        assert_eq!(now.len(), 24, "timestamp was {}", now);
        assert!(now.ends_with('Z'));
        assert_eq!(&now[10..11], "T");
        assert!(DateTime::parse_from_rfc3339(&now).is_ok());
    }

    #[test]
    fn test_future_time_after_current_time() {
        let future = future_time(1.0);
        let now = current_time();
        assert!(future > now, "{} should sort after {}", future, now);

        let future = DateTime::parse_from_rfc3339(&future).unwrap();
        let now = DateTime::parse_from_rfc3339(&now).unwrap();
        let diff = future - now;
        assert!(diff > TimeDelta::minutes(59) && diff <= TimeDelta::hours(1));
    }

    #[test]
    fn test_future_time_accepts_fractional_and_negative() {
        let half = DateTime::parse_from_rfc3339(&future_time(0.5)).unwrap();
        let past = DateTime::parse_from_rfc3339(&future_time(-2.0)).unwrap();
        assert!(past < half);
        assert_eq!(hours_delta(0.5), TimeDelta::minutes(30));
        assert_eq!(hours_delta(-2.0), TimeDelta::hours(-2));
    }
}
