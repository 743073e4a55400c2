//! Timestamp parsing and timezone conversion.

use crate::error::{EngineError, Result};
use crate::rule::TimestampSpec;
use chrono::format::{
    parse_and_remainder, Fixed, Item, Numeric, ParseResult, Parsed, StrftimeItems,
};
use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset, SecondsFormat,
    TimeZone,
};
use chrono_tz::Tz;
use std::fmt;

/// Sentinel selecting the permissive ISO-8601 parser.
pub const ISO8601: &str = "ISO8601";

/// One entry of a rule's `source_formats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampFormat {
    Iso8601,
    /// strftime-style format, e.g. `%d.%m.%Y %H:%M:%S`.
    Strftime(String),
}

impl TimestampFormat {
    /// Parse a format entry, rejecting malformed strftime strings.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw == ISO8601 {
            return Ok(TimestampFormat::Iso8601);
        }
        if raw.is_empty() || StrftimeItems::new(raw).any(|item| matches!(item, Item::Error)) {
            return Err(EngineError::FieldExtraction(format!(
                "invalid timestamp format '{raw}'"
            )));
        }
        Ok(TimestampFormat::Strftime(raw.to_string()))
    }

    fn try_parse(&self, raw: &str, current_year: i32) -> Option<ParsedTimestamp> {
        match self {
            TimestampFormat::Iso8601 => parse_iso8601(raw),
            TimestampFormat::Strftime(format) => parse_strftime(raw, format, current_year),
        }
    }
}

impl fmt::Display for TimestampFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampFormat::Iso8601 => f.write_str(ISO8601),
            TimestampFormat::Strftime(format) => f.write_str(format),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParsedTimestamp {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

/// Parse `raw` with the first matching format of `spec`, convert it to the
/// destination timezone and render it as ISO-8601 with UTC written as `Z`.
///
/// Returns `None` when no format parses the value.
pub fn convert_timestamp(raw: &str, spec: &TimestampSpec, current_year: i32) -> Option<String> {
    let parsed = spec
        .source_formats
        .iter()
        .find_map(|format| format.try_parse(raw, current_year))?;

    let aware = match parsed {
        ParsedTimestamp::Aware(timestamp) => timestamp,
        ParsedTimestamp::Naive(naive) => localize(&spec.source_timezone, naive)?,
    };
    let converted = aware.with_timezone(&spec.destination_timezone);
    Some(render(&converted))
}

/// Attach `tz` to a naive timestamp. Ambiguous local times resolve to the
/// later instant; times inside a gap use the offset in effect before the gap.
fn localize(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(timestamp) => Some(fix(&timestamp)),
        LocalResult::Ambiguous(_, later) => Some(fix(&later)),
        LocalResult::None => {
            let before = naive.checked_sub_signed(Duration::days(1))?;
            let offset = tz.offset_from_utc_datetime(&before).fix();
            offset.from_local_datetime(&naive).single()
        }
    }
}

fn fix(timestamp: &DateTime<Tz>) -> DateTime<FixedOffset> {
    timestamp.with_timezone(&timestamp.offset().fix())
}

fn render(timestamp: &DateTime<Tz>) -> String {
    let fixed = fix(timestamp);
    let precision = if fixed.timestamp_subsec_micros() == 0 {
        SecondsFormat::Secs
    } else {
        SecondsFormat::Micros
    };
    fixed
        .to_rfc3339_opts(precision, false)
        .replace("+00:00", "Z")
}

/// Permissive ISO-8601: `YYYY`, `YYYY-MM`, `YYYY-MM-DD` or `YYYYMMDD`, then
/// optionally any one separator character, `hh[:mm[:ss[.fff]]]` (or the basic
/// `hhmmss` form, `,` also accepted before the fraction) and an offset `Z`,
/// `±hh`, `±hhmm` or `±hh:mm`.
fn parse_iso8601(raw: &str) -> Option<ParsedTimestamp> {
    let raw = raw.trim();
    let (date, rest) = iso_date(raw)?;
    let mut chars = rest.chars();
    if chars.next().is_none() {
        return date.and_hms_opt(0, 0, 0).map(ParsedTimestamp::Naive);
    }

    let time = chars.as_str();
    let (clock, zone) = match time.find(|c| matches!(c, 'Z' | 'z' | '+' | '-')) {
        Some(at) => (&time[..at], Some(&time[at..])),
        None => (time, None),
    };
    let (hour, minute, second, nanos) = iso_clock(clock)?;
    // 24:00 is midnight of the next day.
    let naive = if (hour, minute, second, nanos) == (24, 0, 0, 0) {
        date.succ_opt()?.and_hms_opt(0, 0, 0)?
    } else {
        date.and_hms_nano_opt(hour, minute, second, nanos)?
    };

    match zone {
        Some(zone) => iso_offset(zone)?
            .from_local_datetime(&naive)
            .single()
            .map(ParsedTimestamp::Aware),
        None => Some(ParsedTimestamp::Naive(naive)),
    }
}

fn iso_date(s: &str) -> Option<(NaiveDate, &str)> {
    let (year, rest) = digits(s, 4)?;
    let year = i32::try_from(year).ok()?;
    if rest.is_empty() {
        return Some((NaiveDate::from_ymd_opt(year, 1, 1)?, rest));
    }

    if let Some(extended) = rest.strip_prefix('-') {
        let (month, rest) = digits(extended, 2)?;
        if rest.is_empty() {
            return Some((NaiveDate::from_ymd_opt(year, month, 1)?, rest));
        }
        let (day, rest) = digits(rest.strip_prefix('-')?, 2)?;
        return Some((NaiveDate::from_ymd_opt(year, month, day)?, rest));
    }

    // YYYYMM is not ISO-8601, the basic form needs the day.
    let (month, rest) = digits(rest, 2)?;
    let (day, rest) = digits(rest, 2)?;
    Some((NaiveDate::from_ymd_opt(year, month, day)?, rest))
}

fn iso_clock(s: &str) -> Option<(u32, u32, u32, u32)> {
    let (hour, rest) = digits(s, 2)?;
    if rest.is_empty() {
        return Some((hour, 0, 0, 0));
    }

    let extended = rest.starts_with(':');
    let rest = if extended { &rest[1..] } else { rest };
    let (minute, rest) = digits(rest, 2)?;
    if rest.is_empty() {
        return Some((hour, minute, 0, 0));
    }

    let rest = if extended { rest.strip_prefix(':')? } else { rest };
    let (second, rest) = digits(rest, 2)?;
    if rest.is_empty() {
        return Some((hour, minute, second, 0));
    }

    let fraction = rest.strip_prefix('.').or_else(|| rest.strip_prefix(','))?;
    Some((hour, minute, second, fraction_nanos(fraction)?))
}

fn iso_offset(zone: &str) -> Option<FixedOffset> {
    if zone.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }
    let sign = match zone.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };

    let (hours, rest) = digits(&zone[1..], 2)?;
    let rest = rest.strip_prefix(':').unwrap_or(rest);
    let minutes = match digits(rest, 2) {
        Some((minutes, "")) => minutes,
        _ if rest.is_empty() => 0,
        _ => return None,
    };
    let seconds = i32::try_from(hours * 3600 + minutes * 60).ok()?;
    FixedOffset::east_opt(sign * seconds)
}

/// Exactly `count` ASCII digits at the start of `s`.
fn digits(s: &str, count: usize) -> Option<(u32, &str)> {
    let head = s.get(..count)?;
    if !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((head.parse().ok()?, &s[count..]))
}

/// Fraction digits as nanoseconds; digits past the ninth are dropped.
fn fraction_nanos(fraction: &str) -> Option<u32> {
    if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let significant = &fraction[..fraction.len().min(9)];
    format!("{significant:0<9}").parse().ok()
}

fn parse_strftime(raw: &str, format: &str, current_year: i32) -> Option<ParsedTimestamp> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    let mut parsed = Parsed::new();
    let mut rest = raw;

    // `%f` reads one to six digits as a fraction of a second, not as a
    // nanosecond count.
    let segments = items.split(|item| matches!(item, Item::Numeric(Numeric::Nanosecond, _)));
    for (n, segment) in segments.enumerate() {
        if n > 0 {
            let width = rest.bytes().take(6).take_while(u8::is_ascii_digit).count();
            parsed
                .set_nanosecond(i64::from(fraction_nanos(&rest[..width])?))
                .ok()?;
            rest = &rest[width..];
        }
        rest = parse_and_remainder(&mut parsed, rest, segment.iter()).ok()?;
    }
    if !rest.is_empty() {
        return None;
    }

    if !format_has_year(format) {
        parsed.set_year(i64::from(current_year)).ok()?;
    }

    if let Some(timestamp) = resolve(&parsed) {
        return Some(timestamp);
    }
    fill_missing_fields(&mut parsed).ok()?;
    resolve(&parsed)
}

/// Fields absent from the format default to the start of their range.
fn fill_missing_fields(parsed: &mut Parsed) -> ParseResult<()> {
    let day_of_year = parsed.ordinal().is_some()
        || parsed.isoweek().is_some()
        || parsed.week_from_sun().is_some()
        || parsed.week_from_mon().is_some();
    if !day_of_year {
        if parsed.month().is_none() {
            parsed.set_month(1)?;
        }
        if parsed.day().is_none() {
            parsed.set_day(1)?;
        }
    }

    if parsed.hour_mod_12().is_none() {
        match parsed.hour_div_12() {
            // `%p` without an hour: midnight or noon.
            Some(_) => parsed.set_hour12(12)?,
            None => parsed.set_hour(0)?,
        }
    }
    if parsed.minute().is_none() {
        parsed.set_minute(0)?;
    }
    if parsed.second().is_none() {
        parsed.set_second(0)?;
    }
    Ok(())
}

fn resolve(parsed: &Parsed) -> Option<ParsedTimestamp> {
    if let Ok(timestamp) = parsed.to_datetime() {
        return Some(ParsedTimestamp::Aware(timestamp));
    }
    parsed
        .to_naive_datetime_with_offset(0)
        .ok()
        .map(ParsedTimestamp::Naive)
}

fn format_has_year(format: &str) -> bool {
    StrftimeItems::new(format).any(|item| match item {
        Item::Numeric(numeric, _) => matches!(
            numeric,
            Numeric::Year
                | Numeric::YearDiv100
                | Numeric::YearMod100
                | Numeric::IsoYear
                | Numeric::IsoYearDiv100
                | Numeric::IsoYearMod100
                | Numeric::Timestamp
        ),
        Item::Fixed(fixed) => matches!(fixed, Fixed::RFC2822 | Fixed::RFC3339),
        _ => false,
    })
}

/// Error raised when every source format failed.
pub(crate) fn exhausted(processor: &str, raw: &str, spec: &TimestampSpec) -> EngineError {
    EngineError::TimestampParse {
        processor: processor.to_string(),
        value: raw.to_string(),
        formats: spec
            .source_formats
            .iter()
            .map(ToString::to_string)
            .collect(),
        conflicts: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldPath;
    use chrono::{Datelike, Utc};

    fn spec(formats: &[&str], source: &str, destination: &str) -> TimestampSpec {
        TimestampSpec {
            destination: FieldPath::parse("@timestamp").unwrap(),
            source_formats: formats
                .iter()
                .map(|f| TimestampFormat::parse(f).unwrap())
                .collect(),
            source_timezone: source.parse().unwrap(),
            destination_timezone: destination.parse().unwrap(),
            allow_override: true,
        }
    }

    #[test]
    fn test_iso8601_round_trip_in_utc() {
        let spec = spec(&["ISO8601"], "UTC", "UTC");
        assert_eq!(
            convert_timestamp("2021-06-01T10:00:00", &spec, 2024).as_deref(),
            Some("2021-06-01T10:00:00Z")
        );
    }

    #[test]
    fn test_iso8601_variants() {
        let spec = spec(&["ISO8601"], "UTC", "UTC");
        let cases = [
            ("2021-06-01T10:00:00Z", "2021-06-01T10:00:00Z"),
            ("2021-06-01T12:00:00+02:00", "2021-06-01T10:00:00Z"),
            ("2021-06-01 10:00:00", "2021-06-01T10:00:00Z"),
            ("2021-06-01T10:00:00.250", "2021-06-01T10:00:00.250000Z"),
            ("2021-06-01", "2021-06-01T00:00:00Z"),
            ("20210601T100000", "2021-06-01T10:00:00Z"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                convert_timestamp(input, &spec, 2024).as_deref(),
                Some(expected),
                "input {input}"
            );
        }
    }

    #[test]
    fn test_iso8601_reduced_and_alternative_forms() {
        let spec = spec(&["ISO8601"], "UTC", "UTC");
        let cases = [
            ("2021-06-01 10:00", "2021-06-01T10:00:00Z"),
            ("2021-06-01T10:00:00+02", "2021-06-01T08:00:00Z"),
            ("2021-06-01T10:00:00-0130", "2021-06-01T11:30:00Z"),
            ("2021-06-01T10:00:00,5", "2021-06-01T10:00:00.500000Z"),
            ("2021-06-01T10:00:00.123456789Z", "2021-06-01T10:00:00.123456Z"),
            ("2021-06", "2021-06-01T00:00:00Z"),
            ("2021", "2021-01-01T00:00:00Z"),
            ("2021-06-01T10", "2021-06-01T10:00:00Z"),
            ("2021-06-01T24:00:00", "2021-06-02T00:00:00Z"),
            ("20210601T1000z", "2021-06-01T10:00:00Z"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                convert_timestamp(input, &spec, 2024).as_deref(),
                Some(expected),
                "input {input}"
            );
        }

        let rejected = [
            "202106",
            "2021-06T10:00",
            "2021-13-01",
            "2021-06-01T10:00:00+2",
            "2021-06-01T10:00:00.",
        ];
        for input in rejected {
            assert_eq!(convert_timestamp(input, &spec, 2024), None, "input {input}");
        }
    }

    #[test]
    fn test_fractional_seconds_format() {
        let spec = spec(&["%Y-%m-%d %H:%M:%S.%f"], "UTC", "UTC");
        let cases = [
            ("2021-06-01 10:00:00.123456", "2021-06-01T10:00:00.123456Z"),
            ("2021-06-01 10:00:00.5", "2021-06-01T10:00:00.500000Z"),
            ("2021-06-01 10:00:00.000123", "2021-06-01T10:00:00.000123Z"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                convert_timestamp(input, &spec, 2024).as_deref(),
                Some(expected),
                "input {input}"
            );
        }
        // At most six digits, at least one.
        assert_eq!(convert_timestamp("2021-06-01 10:00:00.1234567", &spec, 2024), None);
        assert_eq!(convert_timestamp("2021-06-01 10:00:00.", &spec, 2024), None);

        let comma = self::spec(&["%d/%m/%Y %H:%M:%S,%f"], "UTC", "UTC");
        assert_eq!(
            convert_timestamp("01/06/2021 10:00:00,25", &comma, 2024).as_deref(),
            Some("2021-06-01T10:00:00.250000Z")
        );
    }

    #[test]
    fn test_only_missing_fields_get_defaults() {
        let ordinal = spec(&["%j %H"], "UTC", "UTC");
        assert_eq!(
            convert_timestamp("152 10", &ordinal, 2021).as_deref(),
            Some("2021-06-01T10:00:00Z")
        );

        let month = spec(&["%Y-%m"], "UTC", "UTC");
        assert_eq!(
            convert_timestamp("2021-06", &month, 2024).as_deref(),
            Some("2021-06-01T00:00:00Z")
        );

        let clock = spec(&["%H:%M"], "UTC", "UTC");
        assert_eq!(
            convert_timestamp("08:15", &clock, 2024).as_deref(),
            Some("2024-01-01T08:15:00Z")
        );
    }

    #[test]
    fn test_source_timezone_is_attached_to_naive_values() {
        let spec = spec(&["%Y-%m-%d %H:%M:%S"], "Europe/Berlin", "UTC");
        assert_eq!(
            convert_timestamp("2021-01-15 12:00:00", &spec, 2024).as_deref(),
            Some("2021-01-15T11:00:00Z")
        );
        assert_eq!(
            convert_timestamp("2021-07-15 12:00:00", &spec, 2024).as_deref(),
            Some("2021-07-15T10:00:00Z")
        );
    }

    #[test]
    fn test_destination_timezone_offset_is_rendered() {
        let spec = spec(&["ISO8601"], "UTC", "Europe/Berlin");
        assert_eq!(
            convert_timestamp("2021-01-15T11:00:00", &spec, 2024).as_deref(),
            Some("2021-01-15T12:00:00+01:00")
        );
    }

    #[test]
    fn test_aware_values_ignore_source_timezone() {
        let spec = spec(&["ISO8601"], "America/New_York", "UTC");
        assert_eq!(
            convert_timestamp("2021-06-01T10:00:00+00:00", &spec, 2024).as_deref(),
            Some("2021-06-01T10:00:00Z")
        );
    }

    #[test]
    fn test_missing_year_uses_current_year() {
        let spec = spec(&["%b %d %H:%M:%S"], "UTC", "UTC");
        let year = Utc::now().year();
        assert_eq!(
            convert_timestamp("Mar 05 08:30:00", &spec, year),
            Some(format!("{year}-03-05T08:30:00Z"))
        );
    }

    #[test]
    fn test_missing_time_fields_default_to_midnight() {
        let spec = spec(&["%d.%m.%Y"], "UTC", "UTC");
        assert_eq!(
            convert_timestamp("24.12.2020", &spec, 2024).as_deref(),
            Some("2020-12-24T00:00:00Z")
        );
    }

    #[test]
    fn test_first_matching_format_wins() {
        let spec = spec(&["%d/%m/%Y %H:%M", "ISO8601"], "UTC", "UTC");
        assert_eq!(
            convert_timestamp("02/03/2021 04:05", &spec, 2024).as_deref(),
            Some("2021-03-02T04:05:00Z")
        );
        assert_eq!(
            convert_timestamp("2021-03-02T04:05:00", &spec, 2024).as_deref(),
            Some("2021-03-02T04:05:00Z")
        );
    }

    #[test]
    fn test_unparseable_value() {
        let spec = spec(&["ISO8601", "%d.%m.%Y"], "UTC", "UTC");
        assert_eq!(convert_timestamp("yesterday", &spec, 2024), None);

        let error = exhausted("Normalizer (test)", "yesterday", &spec);
        assert_eq!(
            error,
            EngineError::TimestampParse {
                processor: "Normalizer (test)".to_string(),
                value: "yesterday".to_string(),
                formats: vec!["ISO8601".to_string(), "%d.%m.%Y".to_string()],
                conflicts: Vec::new(),
            }
        );
    }

    #[test]
    fn test_ambiguous_and_missing_local_times() {
        let spec = spec(&["%Y-%m-%d %H:%M:%S"], "America/New_York", "UTC");
        // 01:30 happens twice on 2021-11-07; the later (EST) instant is used.
        assert_eq!(
            convert_timestamp("2021-11-07 01:30:00", &spec, 2024).as_deref(),
            Some("2021-11-07T06:30:00Z")
        );
        // 02:30 does not exist on 2021-03-14; the pre-gap EST offset applies.
        assert_eq!(
            convert_timestamp("2021-03-14 02:30:00", &spec, 2024).as_deref(),
            Some("2021-03-14T07:30:00Z")
        );
    }

    #[test]
    fn test_format_validation() {
        assert_eq!(TimestampFormat::parse("ISO8601").unwrap(), TimestampFormat::Iso8601);
        assert!(TimestampFormat::parse("%Y-%m-%d").is_ok());
        assert!(TimestampFormat::parse("%Q").is_err());
        assert!(TimestampFormat::parse("").is_err());
        assert_eq!(
            TimestampFormat::parse("%d.%m.%Y").unwrap().to_string(),
            "%d.%m.%Y"
        );
    }
}
