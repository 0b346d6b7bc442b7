//! Version identity: the `(release_date, parse_time)` pair.
//!
//! `release_date` is the date the publisher stamped on the table; `parse_time`
//! is when the table was parsed out of a downloaded copy. The publisher's date
//! can go stale, so `parse_time` keeps otherwise identical releases apart.
//! Lexicographic order on the pair is the canonical timeline, regardless of
//! the order in which versions were recorded.

use std::{fmt, ops::RangeInclusive};

use chrono::{Datelike as _, NaiveDate, NaiveDateTime, SubsecRound as _};
use serde::Serialize;

/// Years a stored version may carry. Stores encode versions as text with
/// four-digit years, so text order matches version order only inside this
/// range.
pub const STORABLE_YEARS: RangeInclusive<i32> = 0..=9999;

/// Identity of one recorded snapshot.
///
/// `parse_time` is truncated to microseconds on construction, the resolution
/// the ledger persists. Two parses inside the same microsecond therefore
/// collide, which the ledger reports as
/// [`Error::DuplicateVersion`](crate::Error::DuplicateVersion).
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
pub struct Version {
  release_date: NaiveDate,
  parse_time:   NaiveDateTime,
}

impl Version {
  pub fn new(release_date: NaiveDate, parse_time: NaiveDateTime) -> Self {
    Self {
      release_date,
      parse_time: parse_time.trunc_subsecs(6),
    }
  }

  pub fn release_date(&self) -> NaiveDate { self.release_date }

  pub fn parse_time(&self) -> NaiveDateTime { self.parse_time }

  /// Whether both halves fall within [`STORABLE_YEARS`].
  pub fn is_storable(&self) -> bool {
    STORABLE_YEARS.contains(&self.release_date.year())
      && STORABLE_YEARS.contains(&self.parse_time.year())
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} @ {}",
      self.release_date,
      self.parse_time.format("%Y-%m-%dT%H:%M:%S%.6f")
    )
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn at(day: u32, hour: u32, micro: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day)
      .unwrap()
      .and_hms_micro_opt(hour, 0, 0, micro)
      .unwrap()
  }

  #[test]
  fn orders_by_release_date_before_parse_time() {
    let early_release = Version::new(
      NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
      at(20, 0, 0),
    );
    let late_release = Version::new(
      NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
      at(3, 0, 0),
    );
    assert!(early_release < late_release);
  }

  #[test]
  fn parse_time_breaks_ties_within_a_release() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    assert!(Version::new(date, at(2, 1, 5)) < Version::new(date, at(2, 1, 6)));
  }

  #[test]
  fn sub_microsecond_precision_is_dropped() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let base = at(2, 1, 5);
    let nanos = base + chrono::Duration::nanoseconds(400);
    assert_eq!(Version::new(date, base), Version::new(date, nanos));
  }

  #[test]
  fn five_digit_and_negative_years_are_not_storable() {
    let ok = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap();
    let far = NaiveDate::from_ymd_opt(10000, 1, 1).unwrap();
    let bce = NaiveDate::from_ymd_opt(-1, 6, 1).unwrap();
    assert!(Version::new(ok, ok.and_hms_opt(0, 0, 0).unwrap()).is_storable());
    assert!(!Version::new(far, far.and_hms_opt(0, 0, 0).unwrap()).is_storable());
    assert!(!Version::new(ok, far.and_hms_opt(0, 0, 0).unwrap()).is_storable());
    assert!(!Version::new(bce, bce.and_hms_opt(0, 0, 0).unwrap()).is_storable());
  }

  #[test]
  fn display_is_human_legible() {
    let v = Version::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), at(2, 13, 7));
    assert_eq!(v.to_string(), "2024-01-01 @ 2024-01-02T13:00:00.000007");
  }
}
