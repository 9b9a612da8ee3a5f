use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Timestamp layout of the first column of a converted counter log,
/// e.g. `12/05/2013 19:40:44.951`.
pub const COUNTER_LOG_TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S%.f";

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

/// Resolve a configured timezone name, expanding `"auto"` to the system zone.
pub fn resolve_timezone_name(name: &str) -> String {
    if name.eq_ignore_ascii_case("auto") {
        get_system_timezone()
    } else {
        name.to_string()
    }
}

// ── TimestampParser ───────────────────────────────────────────────────────────

/// Parses wall-clock timestamps from counter logs into UTC.
///
/// Counter logs record local time without an offset, so every timestamp is
/// interpreted in the parser's zone before conversion.
#[derive(Debug, Clone)]
pub struct TimestampParser {
    tz: Tz,
}

impl Default for TimestampParser {
    fn default() -> Self {
        Self { tz: Tz::UTC }
    }
}

impl TimestampParser {
    /// Create a parser for the given IANA timezone name (`"auto"` allowed).
    ///
    /// An unrecognised name falls back to UTC and logs a warning.
    pub fn new(tz_name: &str) -> Self {
        let resolved = resolve_timezone_name(tz_name);
        let tz = resolved.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                "TimestampParser: unrecognised timezone \"{}\", falling back to UTC",
                resolved
            );
            Tz::UTC
        });
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Parse a counter-log timestamp cell. Surrounding quotes and whitespace
    /// are ignored. Returns `None` when the text does not match
    /// [`COUNTER_LOG_TIME_FORMAT`] or names a nonexistent local time.
    pub fn parse_counter_time(&self, raw: &str) -> Option<DateTime<Utc>> {
        let cleaned = strip_quotes(raw);
        let naive = NaiveDateTime::parse_from_str(cleaned, COUNTER_LOG_TIME_FORMAT).ok()?;
        // Ambiguous times (DST fall-back) resolve to the earlier instant.
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Validate that `tz_name` is a recognised IANA timezone identifier.
    pub fn validate_timezone(tz_name: &str) -> bool {
        tz_name.eq_ignore_ascii_case("auto") || tz_name.parse::<Tz>().is_ok()
    }
}

/// Convert integer epoch seconds from a live sampler into a UTC instant.
pub fn from_epoch_seconds(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Trim whitespace and every `"` character from both ends of a cell.
pub fn strip_quotes(raw: &str) -> &str {
    raw.trim().trim_matches('"').trim()
}
