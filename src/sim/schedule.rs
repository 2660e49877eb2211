//! Month-by-hour period matrices used for manual dispatch profiles and
//! time-of-use price lookups.

use thiserror::Error;

use super::clock::{HOURS_PER_DAY, HOURS_PER_YEAR, hour_of_day, is_weekday, month_of_hour};

/// Errors raised while building a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The matrix does not have one row per month.
    #[error("schedule must have 12 monthly rows, got {0}")]
    RowCount(usize),
    /// A monthly row does not have one entry per hour.
    #[error("schedule row for month {month} must have 24 hourly entries, got {len}")]
    RowLength {
        /// 1-based month of the offending row.
        month: usize,
        /// Number of entries found.
        len: usize,
    },
    /// A period id points outside the supplied profiles or values.
    #[error("period {period} at month {month}, hour {hour} is outside 1..={max}")]
    PeriodOutOfRange {
        /// Offending period id.
        period: usize,
        /// 1-based month.
        month: usize,
        /// Hour of day (0-23).
        hour: usize,
        /// Largest valid period id.
        max: usize,
    },
}

/// A 12 x 24 matrix mapping (month, hour of day) to a 1-based period id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthHourSchedule {
    periods: [[usize; HOURS_PER_DAY]; 12],
}

impl MonthHourSchedule {
    /// A schedule using the same period for every hour of the year.
    pub fn uniform(period: usize) -> Self {
        Self {
            periods: [[period; HOURS_PER_DAY]; 12],
        }
    }

    /// Builds a schedule from 12 rows of 24 period ids.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::RowCount`] or [`ScheduleError::RowLength`] when
    /// the matrix has the wrong shape.
    pub fn from_rows(rows: &[Vec<usize>]) -> Result<Self, ScheduleError> {
        if rows.len() != 12 {
            return Err(ScheduleError::RowCount(rows.len()));
        }
        let mut periods = [[0; HOURS_PER_DAY]; 12];
        for (m, row) in rows.iter().enumerate() {
            if row.len() != HOURS_PER_DAY {
                return Err(ScheduleError::RowLength {
                    month: m + 1,
                    len: row.len(),
                });
            }
            periods[m].copy_from_slice(row);
        }
        Ok(Self { periods })
    }

    /// Returns a copy with hours `start..end` of every month set to `period`.
    ///
    /// # Panics
    ///
    /// Panics if `start > end` or `end > 24`.
    pub fn with_window(mut self, period: usize, start: usize, end: usize) -> Self {
        assert!(start <= end && end <= HOURS_PER_DAY);
        for row in &mut self.periods {
            row[start..end].fill(period);
        }
        self
    }

    /// Period id for a 1-based month and an hour of day (0-23).
    pub fn period(&self, month: u32, hour_of_day: usize) -> usize {
        let m = (month.clamp(1, 12) - 1) as usize;
        self.periods[m][hour_of_day % HOURS_PER_DAY]
    }

    /// Verifies every entry lies in `1..=count`.
    ///
    /// # Errors
    ///
    /// Returns the first out-of-range entry as [`ScheduleError::PeriodOutOfRange`].
    pub fn check_periods(&self, count: usize) -> Result<(), ScheduleError> {
        for (m, row) in self.periods.iter().enumerate() {
            for (h, &period) in row.iter().enumerate() {
                if period == 0 || period > count {
                    return Err(ScheduleError::PeriodOutOfRange {
                        period,
                        month: m + 1,
                        hour: h,
                        max: count,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Weekday and weekend matrices selected by the day of the week.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekSchedule {
    /// Matrix used Monday through Friday.
    pub weekday: MonthHourSchedule,
    /// Matrix used on Saturday and Sunday.
    pub weekend: MonthHourSchedule,
}

impl WeekSchedule {
    /// Uses the same matrix every day of the week.
    pub fn same_every_day(schedule: MonthHourSchedule) -> Self {
        Self {
            weekday: schedule.clone(),
            weekend: schedule,
        }
    }

    /// Period id in effect at an hour of the year.
    pub fn period_at(&self, hour_of_year: usize) -> usize {
        let month = month_of_hour(hour_of_year);
        let hour = hour_of_day(hour_of_year);
        if is_weekday(hour_of_year) {
            self.weekday.period(month, hour)
        } else {
            self.weekend.period(month, hour)
        }
    }

    /// Verifies both matrices reference periods in `1..=count`.
    ///
    /// # Errors
    ///
    /// Returns the first out-of-range entry.
    pub fn check_periods(&self, count: usize) -> Result<(), ScheduleError> {
        self.weekday.check_periods(count)?;
        self.weekend.check_periods(count)
    }
}

/// Time-of-use values (prices or price factors) looked up by period.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSchedule {
    schedule: WeekSchedule,
    values: Vec<f64>,
}

impl PriceSchedule {
    /// Builds a price schedule.
    ///
    /// # Arguments
    ///
    /// * `schedule` - Period matrices
    /// * `values` - Value for each period; period `n` uses `values[n - 1]`
    ///
    /// # Errors
    ///
    /// Returns a [`ScheduleError`] if a period has no value.
    pub fn new(schedule: WeekSchedule, values: Vec<f64>) -> Result<Self, ScheduleError> {
        schedule.check_periods(values.len())?;
        Ok(Self { schedule, values })
    }

    /// A single price for every hour.
    pub fn flat(value: f64) -> Self {
        Self {
            schedule: WeekSchedule::same_every_day(MonthHourSchedule::uniform(1)),
            values: vec![value],
        }
    }

    /// Value in effect at an hour of the year.
    pub fn value_at(&self, hour_of_year: usize) -> f64 {
        let period = self.schedule.period_at(hour_of_year % HOURS_PER_YEAR);
        self.values[period - 1]
    }

    /// Expands the schedule to one value per substep for a full year
    /// followed by `extra_hours` of the next year.
    ///
    /// The tail lets look-ahead windows near the end of December read
    /// January prices without bounds checks.
    pub fn per_step(&self, steps_per_hour: usize, extra_hours: usize) -> Vec<f64> {
        let hours = HOURS_PER_YEAR + extra_hours;
        let mut out = Vec::with_capacity(hours * steps_per_hour);
        for hour in 0..hours {
            let value = self.value_at(hour);
            out.extend(std::iter::repeat_n(value, steps_per_hour));
        }
        out
    }
}
