//! Jalali (Solar Hijri) calendar support.
//!
//! All user-facing dates in roozbot are Jalali. Chronological comparison is
//! done by converting to the Gregorian calendar and taking a day count, so
//! two dates compare equal exactly when they name the same civil day.
//!
//! The conversion is the classic breaks-table algorithm (Birashk's 2820-year
//! cycle corrected against the observed vernal equinox), valid for Jalali
//! years -61..3178.

use chrono::{Datelike, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoozError};

/// The one time zone the bot operates in.
pub const BOT_TZ: Tz = chrono_tz::Asia::Tehran;

/// A calendar date in the Jalali system. Immutable value type.
///
/// Construction via [`JalaliDate::parse`] or [`JalaliDate::from_gregorian`]
/// performs no range validation; out-of-range month/day combinations are
/// rejected by [`JalaliDate::to_gregorian`] (and everything built on it) as
/// `RoozError::Validation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JalaliDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl JalaliDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// Parse a `"Y/M/D"` string: exactly three slash-separated integer
    /// fields. No range checks here — `1404/99/99` parses and fails later at
    /// conversion time, matching how lookups treat such records.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        if parts.len() != 3 {
            return Err(RoozError::Validation(format!(
                "bad date '{s}', expected Y/M/D"
            )));
        }
        let field = |p: &str| {
            p.parse::<i64>()
                .map_err(|_| RoozError::Validation(format!("bad date '{s}', expected Y/M/D")))
        };
        let (y, m, d) = (field(parts[0])?, field(parts[1])?, field(parts[2])?);
        if y < i32::MIN as i64
            || y > i32::MAX as i64
            || !(0..=u32::MAX as i64).contains(&m)
            || !(0..=u32::MAX as i64).contains(&d)
        {
            return Err(RoozError::Validation(format!(
                "bad date '{s}', expected Y/M/D"
            )));
        }
        Ok(Self::new(y as i32, m as u32, d as u32))
    }

    /// Convert to the Gregorian calendar. Rejects dates the Jalali calendar
    /// does not contain.
    pub fn to_gregorian(&self) -> Result<NaiveDate> {
        let cal = jal_cal(self.year)
            .ok_or_else(|| RoozError::Validation(format!("date {self} out of supported range")))?;
        if !(1..=12).contains(&self.month)
            || self.day < 1
            || self.day > month_length(self.year, self.month)
        {
            return Err(RoozError::Validation(format!("no such Jalali date: {self}")));
        }
        let jm = self.month as i64;
        let jdn = g2d(cal.gy as i64, 3, cal.march as i64) + (jm - 1) * 31 - jm / 7 * (jm - 7)
            + self.day as i64
            - 1;
        NaiveDate::from_num_days_from_ce_opt((jdn - JDN_CE_OFFSET) as i32)
            .ok_or_else(|| RoozError::Validation(format!("date {self} out of supported range")))
    }

    /// Day count of the Gregorian equivalent: strictly increasing with
    /// chronological order, equal for equal civil days. The comparison key
    /// for leave-range containment.
    pub fn ordinal(&self) -> Result<i64> {
        Ok(self.to_gregorian()?.num_days_from_ce() as i64)
    }

    /// Convert a Gregorian date into the Jalali calendar.
    pub fn from_gregorian(date: NaiveDate) -> Self {
        let jdn = date.num_days_from_ce() as i64 + JDN_CE_OFFSET;
        let mut jy = date.year() - 621;
        // March of `date.year()` in the target Jalali year; dates before
        // Farvardin 1 belong to the previous Jalali year.
        let Some(cal) = jal_cal(jy) else {
            // Out of table range; clamp rather than panic.
            return Self::new(jy, 1, 1);
        };
        let mut k = jdn - g2d(date.year() as i64, 3, cal.march as i64);
        if k >= 0 {
            if k <= 185 {
                return Self::new(jy, 1 + (k / 31) as u32, (k % 31 + 1) as u32);
            }
            k -= 186;
        } else {
            jy -= 1;
            k += 179;
            if cal.leap == 1 {
                k += 1;
            }
        }
        Self::new(jy, 7 + (k / 30) as u32, (k % 30 + 1) as u32)
    }

    /// Today's Jalali date on the bot's wall clock (Asia/Tehran).
    pub fn today() -> Self {
        Self::from_gregorian(Utc::now().with_timezone(&BOT_TZ).date_naive())
    }
}

impl std::fmt::Display for JalaliDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}/{:02}/{:02}", self.year, self.month, self.day)
    }
}

/// Current wall-clock time in Tehran as `"HH:MM"` — the format stored in the
/// acknowledgment ledger.
pub fn current_time_hhmm() -> String {
    let now = Utc::now().with_timezone(&BOT_TZ);
    format!("{:02}:{:02}", now.hour(), now.minute())
}

/// Days in the given Jalali month.
pub fn month_length(year: i32, month: u32) -> u32 {
    match month {
        1..=6 => 31,
        7..=11 => 30,
        12 => {
            if is_leap_year(year) {
                30
            } else {
                29
            }
        }
        _ => 0,
    }
}

/// Jalali leap year test.
pub fn is_leap_year(year: i32) -> bool {
    jal_cal(year).is_some_and(|c| c.leap == 0)
}

// JDN of 0001-01-01 proleptic Gregorian minus its num_days_from_ce (1).
const JDN_CE_OFFSET: i64 = 1_721_425;

/// Years in which the length of the 33-year leap cycle changes.
const BREAKS: [i32; 20] = [
    -61, 9, 38, 199, 426, 686, 756, 818, 1111, 1181, 1210, 1635, 2060, 2097, 2192, 2262, 2324,
    2394, 2456, 3178,
];

struct JalCal {
    /// 0 when `jy` is a leap year, otherwise the number of years since the
    /// last leap year.
    leap: i32,
    /// Gregorian year of the Jalali new year.
    gy: i32,
    /// Gregorian March day of Farvardin 1.
    march: i32,
}

fn jal_cal(jy: i32) -> Option<JalCal> {
    if jy < BREAKS[0] || jy >= BREAKS[BREAKS.len() - 1] {
        return None;
    }
    let gy = jy + 621;
    let mut leap_j = -14;
    let mut jp = BREAKS[0];
    let mut jump = 0;
    for &jm in &BREAKS[1..] {
        jump = jm - jp;
        if jy < jm {
            break;
        }
        leap_j += jump / 33 * 8 + jump % 33 / 4;
        jp = jm;
    }
    let mut n = jy - jp;

    leap_j += n / 33 * 8 + (n % 33 + 3) / 4;
    if jump % 33 == 4 && jump - n == 4 {
        leap_j += 1;
    }

    let leap_g = gy / 4 - (gy / 100 + 1) * 3 / 4 - 150;
    let march = 20 + leap_j - leap_g;

    if jump - n < 6 {
        n = n - jump + (jump + 4) / 33 * 33;
    }
    let mut leap = ((n + 1) % 33 - 1) % 4;
    if leap == -1 {
        leap = 4;
    }

    Some(JalCal { leap, gy, march })
}

/// Gregorian y/m/d to Julian day number.
fn g2d(gy: i64, gm: i64, gd: i64) -> i64 {
    let d = (gy + (gm - 8) / 6 + 100_100) * 1461 / 4 + (153 * ((gm + 9) % 12) + 2) / 5 + gd
        - 34_840_408;
    d - (gy + 100_100 + (gm - 8) / 6) / 100 * 3 / 4 + 752
}
