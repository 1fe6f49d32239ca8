//! A small, self-contained cron-expression parser and "next fire" calculator.
//!
//! Supports the 5/6/7-field grammars described in the scheduler's module docs: a bare 5-field
//! expression defaults `second` to 0 and leaves `year` unconstrained; a 6-field expression adds
//! `second`; a 7-field expression adds `year`.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
  #[error("expected 5, 6, or 7 whitespace-separated fields, got {0}")]
  WrongFieldCount(usize),
  #[error("invalid term '{0}' in field '{1}'")]
  InvalidTerm(String, &'static str),
  #[error("range '{0}' is reversed in field '{1}'")]
  RangeReversed(String, &'static str),
  #[error("value {0} out of range {1}-{2} in field '{3}'")]
  OutOfRange(i64, u32, u32, &'static str),
  #[error("unknown alias '{0}' in field '{1}'")]
  UnknownAlias(String, &'static str),
  #[error("step must be greater than zero in '{0}'")]
  ZeroStep(String),
  #[error("'?' is only valid in day-of-month or day-of-week")]
  QuestionMarkNotAllowed,
}

/// One field of a parsed expression: the set of matching numeric values plus whether the field
/// was *explicitly* constrained in the source text (anything other than a bare `*` or `?`).
///
/// The `explicit` flag — not the cardinality of `values` — is what drives the day-of-month /
/// day-of-week OR-vs-AND coupling in `CronExpression::day_matches`. See the module's handling of
/// the historical "emptiness as constrainedness" ambiguity in DESIGN.md.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
  values: BTreeSet<u32>,
  explicit: bool,
}

impl Field {
  fn contains(&self, v: u32) -> bool {
    return self.values.contains(&v);
  }

  fn next_after(&self, v: u32) -> Option<u32> {
    return self.values.range(v + 1..).next().copied();
  }

  fn min(&self) -> Option<u32> {
    return self.values.iter().next().copied();
  }

  fn full(min: u32, max: u32) -> Self {
    return Self {
      values: (min..=max).collect(),
      explicit: false,
    };
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
  second: Field,
  minute: Field,
  hour: Field,
  day_of_month: Field,
  month: Field,
  day_of_week: Field,
  year: Option<Field>,
}

const SECOND: (&str, u32, u32) = ("second", 0, 59);
const MINUTE: (&str, u32, u32) = ("minute", 0, 59);
const HOUR: (&str, u32, u32) = ("hour", 0, 23);
const DAY_OF_MONTH: (&str, u32, u32) = ("day-of-month", 1, 31);
const MONTH: (&str, u32, u32) = ("month", 1, 12);
const DAY_OF_WEEK: (&str, u32, u32) = ("day-of-week", 0, 6);
const YEAR: (&str, u32, u32) = ("year", 1970, 3000);

fn month_alias(s: &str) -> Option<u32> {
  const NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
  ];
  let lower = s.to_ascii_lowercase();
  return NAMES.iter().position(|n| *n == lower).map(|i| (i + 1) as u32);
}

fn dow_alias(s: &str) -> Option<u32> {
  const NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];
  let lower = s.to_ascii_lowercase();
  return NAMES.iter().position(|n| *n == lower).map(|i| i as u32);
}

fn parse_literal(
  s: &str,
  field_name: &'static str,
  min: u32,
  max: u32,
  alias: Option<fn(&str) -> Option<u32>>,
) -> Result<u32, ParseError> {
  if let Ok(v) = s.parse::<i64>() {
    if v < min as i64 || v > max as i64 {
      return Err(ParseError::OutOfRange(v, min, max, field_name));
    }
    return Ok(v as u32);
  }

  if let Some(f) = alias {
    if let Some(v) = f(s) {
      return Ok(v);
    }
    return Err(ParseError::UnknownAlias(s.to_string(), field_name));
  }

  return Err(ParseError::InvalidTerm(s.to_string(), field_name));
}

fn parse_range_or_single(
  s: &str,
  field_name: &'static str,
  min: u32,
  max: u32,
  alias: Option<fn(&str) -> Option<u32>>,
) -> Result<(u32, u32), ParseError> {
  if let Some((a, b)) = s.split_once('-') {
    let lo = parse_literal(a, field_name, min, max, alias)?;
    let hi = parse_literal(b, field_name, min, max, alias)?;
    if lo > hi {
      return Err(ParseError::RangeReversed(s.to_string(), field_name));
    }
    return Ok((lo, hi));
  }

  let v = parse_literal(s, field_name, min, max, alias)?;
  return Ok((v, v));
}

fn parse_field(
  raw: &str,
  field_name: &'static str,
  min: u32,
  max: u32,
  allow_question_mark: bool,
  alias: Option<fn(&str) -> Option<u32>>,
) -> Result<Field, ParseError> {
  let mut values = BTreeSet::new();
  let mut explicit = false;

  for term in raw.split(',') {
    let term = term.trim();

    if term == "*" {
      values.extend(min..=max);
      continue;
    }

    if term == "?" {
      if !allow_question_mark {
        return Err(ParseError::QuestionMarkNotAllowed);
      }
      values.extend(min..=max);
      continue;
    }

    explicit = true;

    if let Some((base, step)) = term.split_once('/') {
      let step: u32 = step
        .parse()
        .map_err(|_| ParseError::InvalidTerm(term.to_string(), field_name))?;
      if step == 0 {
        return Err(ParseError::ZeroStep(term.to_string()));
      }

      let (start, end) = if base == "*" {
        (min, max)
      } else {
        parse_range_or_single(base, field_name, min, max, alias)?
      };

      let mut v = start;
      while v <= end {
        values.insert(v);
        v += step;
      }
      continue;
    }

    let (lo, hi) = parse_range_or_single(term, field_name, min, max, alias)?;
    values.extend(lo..=hi);
  }

  if values.is_empty() {
    return Err(ParseError::InvalidTerm(raw.to_string(), field_name));
  }

  return Ok(Field { values, explicit });
}

impl CronExpression {
  pub fn parse(expr: &str) -> Result<Self, ParseError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();

    let (second_s, minute_s, hour_s, dom_s, month_s, dow_s, year_s): (
      &str,
      &str,
      &str,
      &str,
      &str,
      &str,
      Option<&str>,
    ) = match fields.len() {
      5 => ("0", fields[0], fields[1], fields[2], fields[3], fields[4], None),
      6 => (
        fields[0], fields[1], fields[2], fields[3], fields[4], fields[5], None,
      ),
      7 => (
        fields[0],
        fields[1],
        fields[2],
        fields[3],
        fields[4],
        fields[5],
        Some(fields[6]),
      ),
      n => return Err(ParseError::WrongFieldCount(n)),
    };

    let second = parse_field(second_s, SECOND.0, SECOND.1, SECOND.2, false, None)?;
    let minute = parse_field(minute_s, MINUTE.0, MINUTE.1, MINUTE.2, false, None)?;
    let hour = parse_field(hour_s, HOUR.0, HOUR.1, HOUR.2, false, None)?;
    let day_of_month = parse_field(
      dom_s,
      DAY_OF_MONTH.0,
      DAY_OF_MONTH.1,
      DAY_OF_MONTH.2,
      true,
      None,
    )?;
    let month = parse_field(
      month_s,
      MONTH.0,
      MONTH.1,
      MONTH.2,
      false,
      Some(month_alias),
    )?;
    let day_of_week = parse_field(
      dow_s,
      DAY_OF_WEEK.0,
      DAY_OF_WEEK.1,
      DAY_OF_WEEK.2,
      true,
      Some(dow_alias),
    )?;
    let year = match year_s {
      Some(s) if s != "*" => Some(parse_field(s, YEAR.0, YEAR.1, YEAR.2, false, None)?),
      _ => None,
    };

    return Ok(Self {
      second,
      minute,
      hour,
      day_of_month,
      month,
      day_of_week,
      year,
    });
  }

  fn day_matches(&self, date: DateTime<Utc>) -> bool {
    let dom_explicit = self.day_of_month.explicit;
    let dow_explicit = self.day_of_week.explicit;

    let dom_match = self.day_of_month.contains(date.day());
    let dow_match = self.day_of_week.contains(date.weekday().num_days_from_sunday());

    return match (dom_explicit, dow_explicit) {
      (true, true) => dom_match || dow_match,
      (true, false) => dom_match,
      (false, true) => dow_match,
      (false, false) => true,
    };
  }

  pub fn matches(&self, t: DateTime<Utc>) -> bool {
    if let Some(year) = &self.year {
      if !year.contains(t.year() as u32) {
        return false;
      }
    }

    return self.month.contains(t.month())
      && self.day_matches(t)
      && self.hour.contains(t.hour())
      && self.minute.contains(t.minute())
      && self.second.contains(t.second());
  }

  /// The smallest instant strictly greater than `after` that matches every field, searched by
  /// carrying into the next candidate value of whichever field first fails to match (rather than
  /// a literal second-by-second scan), bounded to four years out.
  pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let bound = after + Duration::days(366 * 4);
    let mut t = truncate_to_second(after) + Duration::seconds(1);

    loop {
      if t > bound {
        return None;
      }

      if let Some(year) = &self.year {
        if !year.contains(t.year() as u32) {
          let Some(next_year) = year.next_after(t.year() as u32) else {
            return None;
          };
          t = start_of_year(next_year as i32);
          continue;
        }
      }

      if !self.month.contains(t.month()) {
        t = match self.month.next_after(t.month()) {
          Some(m) => start_of_month(t.year(), m),
          None => start_of_year(t.year() + 1),
        };
        continue;
      }

      if !self.day_matches(t) {
        t = start_of_day(t) + Duration::days(1);
        continue;
      }

      if !self.hour.contains(t.hour()) {
        t = match self.hour.next_after(t.hour()) {
          Some(h) => start_of_day(t).with_hour(h).unwrap(),
          None => start_of_day(t) + Duration::days(1),
        };
        continue;
      }

      if !self.minute.contains(t.minute()) {
        t = match self.minute.next_after(t.minute()) {
          Some(m) => t
            .with_minute(m)
            .unwrap()
            .with_second(0)
            .unwrap()
            .with_nanosecond(0)
            .unwrap(),
          None => start_of_hour(t) + Duration::hours(1),
        };
        continue;
      }

      if !self.second.contains(t.second()) {
        t = match self.second.next_after(t.second()) {
          Some(s) => t.with_second(s).unwrap().with_nanosecond(0).unwrap(),
          None => start_of_minute(t) + Duration::minutes(1),
        };
        continue;
      }

      return Some(t);
    }
  }

  /// Like `next_fire`, but interprets the cron fields as wall-clock time in `tz` instead of UTC
  /// (e.g. an hourly expression's "hour" field means local wall-clock hour in `tz`, not UTC hour).
  /// Reinterprets `after`'s wall-clock reading in `tz` as a plain instant, runs the ordinary
  /// UTC search against it, then reinterprets the result's wall-clock reading back in `tz` —
  /// keeping the field-matching algorithm itself timezone-agnostic.
  pub fn next_fire_in_tz<Tz: TimeZone>(&self, after: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    let local_naive = after.with_timezone(&tz).naive_local();
    let pretend_utc = Utc.from_utc_datetime(&local_naive);

    let fired_pretend_utc = self.next_fire(pretend_utc)?;

    let result_naive = fired_pretend_utc.naive_utc();
    let result_local = tz
      .from_local_datetime(&result_naive)
      .earliest()
      .unwrap_or_else(|| tz.from_utc_datetime(&result_naive));
    return Some(result_local.with_timezone(&Utc));
  }
}

impl std::fmt::Display for CronExpression {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    fn render(field: &Field, full_min: u32, full_max: u32) -> String {
      if !field.explicit && field.values.len() as u32 == full_max - full_min + 1 {
        return "*".to_string();
      }
      return field
        .values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",");
    }

    let year = match &self.year {
      Some(y) => render(y, YEAR.1, YEAR.2),
      None => "*".to_string(),
    };

    return write!(
      f,
      "{} {} {} {} {} {} {}",
      render(&self.second, SECOND.1, SECOND.2),
      render(&self.minute, MINUTE.1, MINUTE.2),
      render(&self.hour, HOUR.1, HOUR.2),
      render(&self.day_of_month, DAY_OF_MONTH.1, DAY_OF_MONTH.2),
      render(&self.month, MONTH.1, MONTH.2),
      render(&self.day_of_week, DAY_OF_WEEK.1, DAY_OF_WEEK.2),
      year,
    );
  }
}

fn truncate_to_second(t: DateTime<Utc>) -> DateTime<Utc> {
  return t.with_nanosecond(0).unwrap();
}

fn start_of_minute(t: DateTime<Utc>) -> DateTime<Utc> {
  return t.with_second(0).unwrap().with_nanosecond(0).unwrap();
}

fn start_of_hour(t: DateTime<Utc>) -> DateTime<Utc> {
  return start_of_minute(t).with_minute(0).unwrap();
}

fn start_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
  return start_of_hour(t).with_hour(0).unwrap();
}

fn start_of_month(year: i32, month: u32) -> DateTime<Utc> {
  return Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap();
}

fn start_of_year(year: i32) -> DateTime<Utc> {
  return start_of_month(year, 1);
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dt(s: &str) -> DateTime<Utc> {
    return DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc);
  }

  #[test]
  fn every_thirty_seconds() {
    let c = CronExpression::parse("*/30 * * * * *").unwrap();
    let next = c.next_fire(dt("2024-01-01T00:00:05Z")).unwrap();
    assert_eq!(next, dt("2024-01-01T00:00:30Z"));

    let next2 = c.next_fire(next).unwrap();
    assert_eq!(next2, dt("2024-01-01T00:01:00Z"));
  }

  #[test]
  fn feb_31_never_fires() {
    let c = CronExpression::parse("0 0 0 31 2 *").unwrap();
    assert_eq!(c.next_fire(dt("2024-01-01T00:00:00Z")), None);
  }

  #[test]
  fn determinism_and_strictly_after() {
    let c = CronExpression::parse("0 */15 * * * *").unwrap();
    let t = dt("2024-03-05T10:07:33Z");
    let a = c.next_fire(t).unwrap();
    let b = c.next_fire(t).unwrap();
    assert_eq!(a, b);
    assert!(a > t);
    assert!(c.matches(a));
  }

  #[test]
  fn second_call_is_strictly_after_first() {
    let c = CronExpression::parse("0 0 * * * *").unwrap();
    let t = dt("2024-03-05T10:07:33Z");
    let first = c.next_fire(t).unwrap();
    let second = c.next_fire(first).unwrap();
    assert!(second > first);
    assert!(c.matches(second));
  }

  #[test]
  fn dom_dow_or_when_both_explicit() {
    // Fires on the 1st of the month OR on Mondays.
    let c = CronExpression::parse("0 0 0 1 * 1").unwrap();
    assert!(c.matches(dt("2024-03-01T00:00:00Z"))); // 1st, a Friday
    assert!(c.matches(dt("2024-03-04T00:00:00Z"))); // a Monday
    assert!(!c.matches(dt("2024-03-05T00:00:00Z"))); // neither
  }

  #[test]
  fn dom_only_when_dow_unconstrained() {
    let c = CronExpression::parse("0 0 0 1 * *").unwrap();
    assert!(c.matches(dt("2024-03-01T00:00:00Z")));
    assert!(!c.matches(dt("2024-03-04T00:00:00Z")));
  }

  #[test]
  fn month_alias_and_dow_alias() {
    let c = CronExpression::parse("0 0 12 * JAN MON").unwrap();
    assert!(c.matches(dt("2024-01-01T12:00:00Z"))); // Jan 1 2024 is a Monday
  }

  #[test]
  fn invalid_out_of_range() {
    assert!(CronExpression::parse("0 0 99 * * *").is_err());
  }

  #[test]
  fn invalid_reversed_range() {
    assert!(CronExpression::parse("0 0 20-10 * * *").is_err());
  }

  #[test]
  fn invalid_unknown_alias() {
    assert!(CronExpression::parse("0 0 0 * FOO *").is_err());
  }

  #[test]
  fn invalid_field_count() {
    assert!(CronExpression::parse("0 0 0 *").is_err());
  }

  #[test]
  fn print_parse_round_trip() {
    for expr in [
      "*/30 * * * * *",
      "0 0 0 1 * 1",
      "0 0 12 * JAN MON",
      "0 0 0 31 2 *",
    ] {
      let parsed = CronExpression::parse(expr).unwrap();
      let printed = parsed.to_string();
      let reparsed = CronExpression::parse(&printed).unwrap();
      assert_eq!(parsed, reparsed, "round trip mismatch for {expr}");
    }
  }

  #[test]
  fn five_field_defaults_second_to_zero() {
    let c = CronExpression::parse("30 4 * * *").unwrap();
    assert!(c.matches(dt("2024-01-01T04:30:00Z")));
    assert!(!c.matches(dt("2024-01-01T04:30:01Z")));
  }

  #[test]
  fn seven_field_year_constraint() {
    let c = CronExpression::parse("0 0 0 1 1 * 2030").unwrap();
    assert!(!c.matches(dt("2024-01-01T00:00:00Z")));
    assert!(c.matches(dt("2030-01-01T00:00:00Z")));
  }

  #[test]
  fn next_fire_in_tz_uses_local_wall_clock_hour() {
    // "at 09:00 daily" in US/Eastern (UTC-5 in January) should fire at 14:00 UTC, not 09:00 UTC.
    let c = CronExpression::parse("0 0 9 * * *").unwrap();
    let after = dt("2024-01-01T00:00:00Z");
    let next = c.next_fire_in_tz(after, chrono_tz::US::Eastern).unwrap();
    assert_eq!(next, dt("2024-01-01T14:00:00Z"));
  }
}
