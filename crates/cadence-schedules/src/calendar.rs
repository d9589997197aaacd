//! Time-zone-aware calendar arithmetic.
//!
//! Day designators are resolved by deliberately stepping outside the valid
//! range of a month and letting the date roll over: day 31 of a 30-day month
//! is the 1st of the next month, day -1 is one day before the 1st of the next
//! month. Nothing here clamps.
//!
//! Weekdays are always numbered ISO-style (Monday = 1 .. Sunday = 7).

use std::fmt;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, Months, NaiveDate, NaiveDateTime, NaiveTime,
    Offset, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;

use crate::error::{Result, ScheduleError};

/// ISO day number (index + 1) to weekday.
const ISO_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Weekday for an ISO day number (Monday = 1 .. Sunday = 7).
pub fn weekday_from_iso(day: u32) -> Result<Weekday> {
    day.checked_sub(1)
        .and_then(|index| ISO_WEEKDAYS.get(index as usize))
        .copied()
        .ok_or(ScheduleError::OutOfRange {
            field: "day of week",
            value: i64::from(day),
        })
}

/// ISO day number of `weekday` (Monday = 1 .. Sunday = 7).
pub fn iso_day_of_week(weekday: Weekday) -> u32 {
    weekday.number_from_monday()
}

/// Map a local wall-clock time onto an instant in `time_zone`.
///
/// Ambiguous times (clocks going back) resolve to the earlier instant. Times
/// inside a gap (clocks going forward) are read with the offset in force
/// before the gap, which moves them forward by the gap length.
pub fn resolve_local(time_zone: &Tz, local: NaiveDateTime) -> DateTime<Tz> {
    match time_zone.from_local_datetime(&local) {
        LocalResult::Single(date) => date,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let before = time_zone
                .offset_from_utc_datetime(&(local - Duration::days(1)))
                .fix();
            let utc = local - Duration::seconds(i64::from(before.local_minus_utc()));
            time_zone.from_utc_datetime(&utc)
        }
    }
}

fn out_of_range(field: &'static str, value: i64) -> ScheduleError {
    ScheduleError::OutOfRange { field, value }
}

/// The 1st of `month` in `year`, where `month` may lie outside 1..=12 and
/// rolls into neighbouring years.
fn first_of_month(year: i32, month: i64) -> Result<NaiveDate> {
    let absolute = i64::from(year) * 12 + (month - 1);
    let year = i32::try_from(absolute.div_euclid(12)).map_err(|_| out_of_range("year", absolute))?;
    let month = absolute.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(out_of_range("year", i64::from(year)))
}

fn offset_days(date: NaiveDate, days: i64) -> Result<NaiveDate> {
    date.checked_add_signed(Duration::days(days))
        .ok_or(out_of_range("days", days))
}

pub(crate) fn check_month(month: u32) -> Result<()> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(out_of_range("month", i64::from(month)))
    }
}

pub(crate) fn check_day_of_month(day: i32) -> Result<()> {
    if day != 0 && (-31..=31).contains(&day) {
        Ok(())
    } else {
        Err(out_of_range("day of month", i64::from(day)))
    }
}

pub(crate) fn check_week_of_month(week: i32) -> Result<()> {
    if week != 0 && (-4..=4).contains(&week) {
        Ok(())
    } else {
        Err(out_of_range("week of month", i64::from(week)))
    }
}

/// Resolve a signed day-of-month designator.
///
/// Positive days count from the 1st of `month`; negative days count back
/// from the 1st of the following month, so `-1` is the last day of `month`.
pub fn resolve_day_of_month(year: i32, month: u32, day: i32) -> Result<NaiveDate> {
    check_day_of_month(day)?;
    if day > 0 {
        offset_days(first_of_month(year, i64::from(month))?, i64::from(day) - 1)
    } else {
        offset_days(first_of_month(year, i64::from(month) + 1)?, i64::from(day))
    }
}

/// First day of a week-of-month block.
///
/// Week `n` (1..=4) covers days `7n-6..=7n`. Week `-n` is the `n`-th block of
/// seven days counted back from the end of the month, so week `-1` is always
/// the month's last seven days.
pub fn resolve_week_of_month(year: i32, month: u32, week: i32) -> Result<NaiveDate> {
    check_week_of_month(week)?;
    if week > 0 {
        offset_days(first_of_month(year, i64::from(month))?, 7 * (i64::from(week) - 1))
    } else {
        offset_days(first_of_month(year, i64::from(month) + 1)?, 7 * i64::from(week))
    }
}

/// The `week`-th occurrence of `weekday` in `month`; negative weeks count
/// from the end, so `-1` is the last occurrence.
pub fn resolve_day_of_week_in_month(
    year: i32,
    month: u32,
    weekday: Weekday,
    week: i32,
) -> Result<NaiveDate> {
    let block = resolve_week_of_month(year, month, week)?;
    let offset = (i64::from(weekday.num_days_from_monday())
        - i64::from(block.weekday().num_days_from_monday()))
    .rem_euclid(7);
    offset_days(block, offset)
}

/// Field a [`CalendarUnit`] steps along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarField {
    Day,
    Week,
    Month,
    Year,
}

impl CalendarField {
    fn name(self) -> &'static str {
        match self {
            CalendarField::Day => "day",
            CalendarField::Week => "week",
            CalendarField::Month => "month",
            CalendarField::Year => "year",
        }
    }
}

/// One cycle of a calendar schedule, e.g. "1 week".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CalendarUnit {
    field: CalendarField,
    value: i32,
}

impl CalendarUnit {
    pub const fn new(field: CalendarField, value: i32) -> Self {
        Self { field, value }
    }

    pub const fn days(value: i32) -> Self {
        Self::new(CalendarField::Day, value)
    }

    pub const fn weeks(value: i32) -> Self {
        Self::new(CalendarField::Week, value)
    }

    pub const fn months(value: i32) -> Self {
        Self::new(CalendarField::Month, value)
    }

    pub const fn years(value: i32) -> Self {
        Self::new(CalendarField::Year, value)
    }

    pub fn field(&self) -> CalendarField {
        self.field
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    /// Move `calendar` by `times` units on the local wall clock.
    ///
    /// Month and year steps keep the day of month where it exists and fall
    /// back to the month's last day otherwise, so callers must re-derive
    /// their boundary from the shifted date rather than trust it.
    pub fn shift(&self, calendar: &DateTime<Tz>, times: i32) -> Result<DateTime<Tz>> {
        let amount = i64::from(self.value) * i64::from(times);
        let local = calendar.naive_local();
        let shifted = match self.field {
            CalendarField::Day => local.checked_add_signed(Duration::days(amount)),
            CalendarField::Week => local.checked_add_signed(Duration::weeks(amount)),
            CalendarField::Month => add_months(local, amount),
            CalendarField::Year => add_months(local, amount * 12),
        }
        .ok_or(out_of_range(self.field.name(), amount))?;
        Ok(resolve_local(&calendar.timezone(), shifted))
    }
}

fn add_months(local: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        local.checked_add_months(magnitude)
    } else {
        local.checked_sub_months(magnitude)
    }
}

impl fmt::Display for CalendarUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.field.name())
    }
}

/// Calendar boundaries around one reference instant in one time zone.
#[derive(Debug, Clone, Copy)]
pub struct CalendarUtils {
    reference: DateTime<Tz>,
}

impl CalendarUtils {
    pub fn new(reference: DateTime<Utc>, time_zone: Tz) -> Self {
        Self {
            reference: reference.with_timezone(&time_zone),
        }
    }

    pub fn of(reference: &DateTime<Tz>) -> Self {
        Self {
            reference: *reference,
        }
    }

    fn time_zone(&self) -> Tz {
        self.reference.timezone()
    }

    fn today(&self) -> NaiveDate {
        self.reference.date_naive()
    }

    /// Local midnight at the start of `date`.
    pub fn midnight(&self, date: NaiveDate) -> DateTime<Tz> {
        resolve_local(&self.time_zone(), date.and_time(NaiveTime::MIN))
    }

    /// `time` on the reference day.
    pub fn time_of_day(&self, time: NaiveTime) -> DateTime<Tz> {
        resolve_local(&self.time_zone(), self.today().and_time(time))
    }

    pub fn start_of_day(&self) -> DateTime<Tz> {
        self.midnight(self.today())
    }

    /// Start of the following day.
    pub fn end_of_day(&self) -> Result<DateTime<Tz>> {
        Ok(self.midnight(offset_days(self.today(), 1)?))
    }

    /// Monday of the reference week.
    pub fn start_of_week(&self) -> Result<DateTime<Tz>> {
        Ok(self.midnight(self.monday()?))
    }

    /// Monday of the following week.
    pub fn end_of_week(&self) -> Result<DateTime<Tz>> {
        Ok(self.midnight(offset_days(self.monday()?, 7)?))
    }

    fn monday(&self) -> Result<NaiveDate> {
        let today = self.today();
        offset_days(today, -i64::from(today.weekday().num_days_from_monday()))
    }

    pub fn start_of_month(&self) -> Result<DateTime<Tz>> {
        let today = self.today();
        Ok(self.midnight(first_of_month(today.year(), i64::from(today.month()))?))
    }

    /// The 1st of the following month.
    pub fn end_of_month(&self) -> Result<DateTime<Tz>> {
        let today = self.today();
        Ok(self.midnight(first_of_month(
            today.year(),
            i64::from(today.month()) + 1,
        )?))
    }

    /// Jan 1st of the year containing `reference` in `time_zone`.
    pub fn start_of_year(reference: DateTime<Utc>, time_zone: Tz) -> Result<DateTime<Tz>> {
        let utils = Self::new(reference, time_zone);
        Ok(utils.midnight(first_of_month(utils.today().year(), 1)?))
    }

    /// Jan 1st of the following year.
    pub fn end_of_year(reference: DateTime<Utc>, time_zone: Tz) -> Result<DateTime<Tz>> {
        let utils = Self::new(reference, time_zone);
        Ok(utils.midnight(first_of_month(utils.today().year(), 13)?))
    }

    /// Start of a signed day of the reference month (see [`resolve_day_of_month`]).
    pub fn day_of_month(&self, day: i32) -> Result<DateTime<Tz>> {
        let today = self.today();
        Ok(self.midnight(resolve_day_of_month(today.year(), today.month(), day)?))
    }

    /// Start of a signed day of `month` in the reference year.
    pub fn day_of_month_in_year(&self, month: u32, day: i32) -> Result<DateTime<Tz>> {
        check_month(month)?;
        Ok(self.midnight(resolve_day_of_month(self.today().year(), month, day)?))
    }

    /// Start of the ISO weekday `day_of_week` within the reference week.
    pub fn day_of_week(&self, day_of_week: u32) -> Result<DateTime<Tz>> {
        let weekday = weekday_from_iso(day_of_week)?;
        let date = offset_days(self.monday()?, i64::from(weekday.num_days_from_monday()))?;
        Ok(self.midnight(date))
    }

    /// Start of a week-of-month block of the reference month.
    pub fn start_of_week_of_month(&self, week: i32) -> Result<DateTime<Tz>> {
        let today = self.today();
        Ok(self.midnight(resolve_week_of_month(today.year(), today.month(), week)?))
    }

    /// Start of the `week`-th ISO weekday `day_of_week` of the reference month.
    pub fn day_of_week_in_month(&self, day_of_week: u32, week: i32) -> Result<DateTime<Tz>> {
        let today = self.today();
        let weekday = weekday_from_iso(day_of_week)?;
        Ok(self.midnight(resolve_day_of_week_in_month(
            today.year(),
            today.month(),
            weekday,
            week,
        )?))
    }
}
