//! Periodic keys for the point projection: seasons, `MM-DD` weeks, and MMWR
//! epiweeks.
//!
//! The source table has one column per season (e.g. `2012-13`) and one row
//! per `MM-DD` date. A season runs from August 1st of its first year through
//! July 31st of the next, which pins every row date to a calendar year.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;

use crate::{Error, Result};

/// First `(month, day)` of a season.
const SEASON_START: (u32, u32) = (8, 1);

/// An MMWR week: Sunday-to-Saturday, with week 1 being the first week that
/// has at least four days in the calendar year.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
pub struct Epiweek {
  year: i32,
  week: u32,
}

impl Epiweek {
  pub fn new(year: i32, week: u32) -> Result<Self> {
    let weeks = weeks_in_year(year)?;
    if week == 0 || week > weeks {
      return Err(Error::InvalidPeriod(format!(
        "{year} has no epiweek {week}"
      )));
    }
    Ok(Self { year, week })
  }

  /// The epiweek containing `date`.
  pub fn of(date: NaiveDate) -> Result<Self> {
    let mut year = date.year();
    if date >= week_one_start(year + 1)? {
      year += 1;
    } else if date < week_one_start(year)? {
      year -= 1;
    }
    let start = week_one_start(year)?;
    let week = (date - start).num_days() / 7 + 1;
    Ok(Self { year, week: week as u32 })
  }

  /// Decode the compact `YYYYWW` form.
  pub fn from_yyyyww(value: i64) -> Result<Self> {
    let year = i32::try_from(value / 100)
      .map_err(|_| Error::InvalidPeriod(format!("epiweek {value} out of range")))?;
    Self::new(year, (value % 100) as u32)
  }

  /// The compact `YYYYWW` form, e.g. `201231`.
  pub fn to_yyyyww(self) -> i64 { i64::from(self.year) * 100 + i64::from(self.week) }

  pub fn year(self) -> i32 { self.year }

  pub fn week(self) -> u32 { self.week }
}

impl fmt::Display for Epiweek {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{:02}", self.year, self.week)
  }
}

fn week_one_start(year: i32) -> Result<NaiveDate> {
  let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)
    .ok_or_else(|| Error::InvalidPeriod(format!("year {year} out of range")))?;
  let offset = i64::from(jan1.weekday().num_days_from_sunday());
  // Sunday..Wednesday: the week holding Jan 1st has four days in `year`.
  if offset <= i64::from(Weekday::Wed.num_days_from_sunday()) {
    Ok(jan1 - Duration::days(offset))
  } else {
    Ok(jan1 + Duration::days(7 - offset))
  }
}

fn weeks_in_year(year: i32) -> Result<u32> {
  let days = (week_one_start(year + 1)? - week_one_start(year)?).num_days();
  Ok((days / 7) as u32)
}

// ─── Seasons ─────────────────────────────────────────────────────────────────

/// The first year of a season column, which looks like `<digits>-<digits>`.
fn season_first_year(season: &str) -> Option<i32> {
  let (first, second) = season.split_once('-')?;
  let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
  if !digits(first) || !digits(second) {
    return None;
  }
  first.parse().ok()
}

/// Parse a row-axis entry of the form `MM-DD`.
fn parse_month_day(week: &str) -> Option<(u32, u32)> {
  let (month, day) = week.split_once('-')?;
  let field = |s: &str| {
    (1..=2).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
  };
  if !field(month) || !field(day) {
    return None;
  }
  Some((month.parse().ok()?, day.parse().ok()?))
}

/// Map a `(season, MM-DD)` pair onto its epiweek.
///
/// Returns `Ok(None)` when either string does not follow the periodic
/// pattern, and [`Error::InvalidPeriod`] when it does but names no real date
/// (e.g. `02-30`).
pub fn season_week_to_epiweek(season: &str, week: &str) -> Result<Option<Epiweek>> {
  let Some(first_year) = season_first_year(season) else {
    return Ok(None);
  };
  let Some((month, day)) = parse_month_day(week) else {
    return Ok(None);
  };

  let year = if (month, day) >= SEASON_START { first_year } else { first_year + 1 };
  let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
    Error::InvalidPeriod(format!("{week:?} is not a date in season {season:?}"))
  })?;
  Epiweek::of(date).map(Some)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

  #[test]
  fn epiweek_mid_year() {
    assert_eq!(Epiweek::of(date(2012, 8, 1)).unwrap().to_yyyyww(), 201231);
  }

  #[test]
  fn early_january_can_belong_to_previous_year() {
    assert_eq!(Epiweek::of(date(2015, 1, 1)).unwrap().to_yyyyww(), 201453);
  }

  #[test]
  fn late_december_can_belong_to_next_year() {
    assert_eq!(Epiweek::of(date(2019, 12, 31)).unwrap().to_yyyyww(), 202001);
  }

  #[test]
  fn yyyyww_round_trip_validates_week() {
    assert_eq!(Epiweek::from_yyyyww(201453).unwrap(), Epiweek::new(2014, 53).unwrap());
    assert!(Epiweek::from_yyyyww(201553).is_err());
    assert!(Epiweek::from_yyyyww(201500).is_err());
  }

  #[test]
  fn season_detection() {
    assert_eq!(season_first_year("2012-13"), Some(2012));
    assert_eq!(season_first_year("2012-2013"), Some(2012));
    assert_eq!(season_first_year("Week"), None);
    assert_eq!(season_first_year("2012-"), None);
    assert_eq!(season_first_year("2012-13 (partial)"), None);
  }

  #[test]
  fn season_dates_roll_into_second_year_before_august() {
    assert_eq!(
      season_week_to_epiweek("2012-13", "08-01").unwrap(),
      Some(Epiweek::new(2012, 31).unwrap())
    );
    assert_eq!(
      season_week_to_epiweek("2012-13", "01-15").unwrap(),
      Some(Epiweek::new(2013, 3).unwrap())
    );
  }

  #[test]
  fn non_periodic_strings_are_skipped() {
    assert_eq!(season_week_to_epiweek("Total", "08-01").unwrap(), None);
    assert_eq!(season_week_to_epiweek("2012-13", "").unwrap(), None);
    assert_eq!(season_week_to_epiweek("2012-13", "Aug 1").unwrap(), None);
  }

  #[test]
  fn impossible_dates_are_errors() {
    assert!(matches!(
      season_week_to_epiweek("2012-13", "02-30"),
      Err(Error::InvalidPeriod(_))
    ));
  }
}
