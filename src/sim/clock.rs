//! Simulation clock and the calendar arithmetic used by dispatch lookups.
//!
//! Years are 8760 hours long (no leap days) and start on a Monday.

/// Hours in a simulated (non-leap) year.
pub const HOURS_PER_YEAR: usize = 8760;

/// Hours in a day.
pub const HOURS_PER_DAY: usize = 24;

/// Hour-of-year at which each month starts, with the end of December last.
const MONTH_START_HOURS: [usize; 13] = [
    0, 744, 1416, 2160, 2880, 3624, 4344, 5088, 5832, 6552, 7296, 8016, 8760,
];

/// Returns the 1-based calendar month containing `hour_of_year`.
///
/// Hours past the end of a year wrap into the next year.
pub fn month_of_hour(hour_of_year: usize) -> u32 {
    let h = hour_of_year % HOURS_PER_YEAR;
    let idx = MONTH_START_HOURS[1..]
        .iter()
        .position(|&end| h < end)
        .unwrap_or(11);
    idx as u32 + 1
}

/// Number of hours in a 1-based month, or 0 for an out-of-range month.
pub fn hours_in_month(month: u32) -> usize {
    match month {
        1..=12 => MONTH_START_HOURS[month as usize] - MONTH_START_HOURS[month as usize - 1],
        _ => 0,
    }
}

/// Hour of the day (0-23) for an hour of the year.
pub fn hour_of_day(hour_of_year: usize) -> usize {
    hour_of_year % HOURS_PER_DAY
}

/// Whether the day containing `hour_of_year` is Monday through Friday.
pub fn is_weekday(hour_of_year: usize) -> bool {
    (hour_of_year / HOURS_PER_DAY) % 7 < 5
}

/// Absolute substep index across a multi-year analysis.
///
/// # Arguments
///
/// * `year` - Zero-based analysis year
/// * `hour_of_year` - Hour within the year (0-8759)
/// * `step` - Substep within the hour
/// * `steps_per_hour` - Substeps per hour
pub fn step_index(year: usize, hour_of_year: usize, step: usize, steps_per_hour: usize) -> usize {
    year * HOURS_PER_YEAR * steps_per_hour + hour_of_year * steps_per_hour + step
}

/// Position of one timestep in (year, hour, substep) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeIndex {
    /// Absolute timestep index from the start of the run.
    pub timestep: usize,
    /// Zero-based analysis year.
    pub year: usize,
    /// Hour within the year (0-8759).
    pub hour_of_year: usize,
    /// Substep within the hour.
    pub step: usize,
}

impl TimeIndex {
    /// Decomposes an absolute timestep into calendar coordinates.
    ///
    /// # Panics
    ///
    /// Panics if `steps_per_hour` is zero.
    pub fn from_timestep(timestep: usize, steps_per_hour: usize) -> Self {
        assert!(steps_per_hour > 0, "steps_per_hour must be > 0");
        let steps_per_year = HOURS_PER_YEAR * steps_per_hour;
        let year = timestep / steps_per_year;
        let within = timestep % steps_per_year;
        Self {
            timestep,
            year,
            hour_of_year: within / steps_per_hour,
            step: within % steps_per_hour,
        }
    }

    /// Hour of the day (0-23).
    pub fn hour_of_day(&self) -> usize {
        hour_of_day(self.hour_of_year)
    }
}

/// A simulation clock that tracks steps over a fixed duration.
///
/// Each tick yields the calendar position of the step so callers never
/// have to repeat the year/hour/substep arithmetic.
///
/// # Examples
///
/// ```
/// use battery_dispatch::sim::clock::Clock;
///
/// let mut clock = Clock::new(3, 2);
/// let mut hours = Vec::new();
///
/// clock.run(|t| hours.push((t.hour_of_year, t.step)));
/// assert_eq!(hours, vec![(0, 0), (0, 1), (1, 0)]);
/// ```
pub struct Clock {
    /// Current step of the simulation
    current: usize,
    /// Total steps to run in the simulation
    total: usize,
    /// Substeps per hour
    steps_per_hour: usize,
}

impl Clock {
    /// Creates a new clock.
    ///
    /// # Arguments
    ///
    /// * `total` - The total number of steps the clock will run
    /// * `steps_per_hour` - Substeps per simulated hour
    ///
    /// # Panics
    ///
    /// Panics if `steps_per_hour` is zero.
    pub fn new(total: usize, steps_per_hour: usize) -> Self {
        assert!(steps_per_hour > 0, "steps_per_hour must be > 0");
        Self {
            current: 0,
            total,
            steps_per_hour,
        }
    }

    /// Advances the clock by one step.
    ///
    /// # Returns
    ///
    /// * `Some(index)` - Calendar position of the step before advancing
    /// * `None` - If the clock has reached its total steps
    pub fn tick(&mut self) -> Option<TimeIndex> {
        if self.current < self.total {
            let index = TimeIndex::from_timestep(self.current, self.steps_per_hour);
            self.current += 1;
            Some(index)
        } else {
            None
        }
    }

    /// Runs a function for each remaining step in the clock.
    pub fn run(&mut self, mut f: impl FnMut(TimeIndex)) {
        while let Some(index) = self.tick() {
            f(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_boundaries() {
        assert_eq!(month_of_hour(0), 1);
        assert_eq!(month_of_hour(743), 1);
        assert_eq!(month_of_hour(744), 2);
        assert_eq!(month_of_hour(8759), 12);
        assert_eq!(month_of_hour(8760), 1);
    }

    #[test]
    fn month_lengths_sum_to_year() {
        let total: usize = (1..=12).map(hours_in_month).sum();
        assert_eq!(total, HOURS_PER_YEAR);
        assert_eq!(hours_in_month(2), 672);
        assert_eq!(hours_in_month(13), 0);
    }

    #[test]
    fn first_day_is_a_weekday() {
        assert!(is_weekday(0));
        assert!(is_weekday(4 * 24 + 23));
        assert!(!is_weekday(5 * 24));
        assert!(!is_weekday(6 * 24 + 12));
        assert!(is_weekday(7 * 24));
    }

    #[test]
    fn step_index_spans_years() {
        assert_eq!(step_index(0, 0, 0, 4), 0);
        assert_eq!(step_index(0, 1, 2, 4), 6);
        assert_eq!(step_index(1, 0, 0, 4), 8760 * 4);
    }

    #[test]
    fn time_index_round_trips_step_index() {
        let t = TimeIndex::from_timestep(8760 * 2 + 9, 2);
        assert_eq!(t.year, 1);
        assert_eq!(t.hour_of_year, 4);
        assert_eq!(t.step, 1);
        assert_eq!(step_index(t.year, t.hour_of_year, t.step, 2), t.timestep);
    }

    #[test]
    fn tick_stops_at_total() {
        let mut clock = Clock::new(2, 1);
        assert_eq!(clock.tick().map(|t| t.hour_of_year), Some(0));
        assert_eq!(clock.tick().map(|t| t.hour_of_year), Some(1));
        assert!(clock.tick().is_none());
    }

    #[test]
    fn empty_clock_never_calls() {
        let mut clock = Clock::new(0, 1);
        let mut was_called = false;
        clock.run(|_| was_called = true);
        assert!(!was_called);
    }
}
