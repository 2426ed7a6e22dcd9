//! WDM time units and the calendar grids used to size each data group.
//!
//! A dataset's pointer chain holds one entry per *group* (TGROUP units, e.g.
//! a month) and each group holds values spaced by TSSTEP x TCODE units. The
//! number of values a group holds is the number of fine ticks falling in it.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, Timelike};

use crate::core::error::{HspfError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
    Century,
}

impl TimeUnit {
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            1 => Ok(TimeUnit::Second),
            2 => Ok(TimeUnit::Minute),
            3 => Ok(TimeUnit::Hour),
            4 => Ok(TimeUnit::Day),
            5 => Ok(TimeUnit::Month),
            6 => Ok(TimeUnit::Year),
            7 => Ok(TimeUnit::Century),
            other => Err(HspfError::UnsupportedTimeCode(other)),
        }
    }

    fn months(self) -> Option<u32> {
        match self {
            TimeUnit::Month => Some(1),
            TimeUnit::Year => Some(12),
            TimeUnit::Century => Some(1200),
            _ => None,
        }
    }

    fn seconds(self) -> i64 {
        match self {
            TimeUnit::Second => 1,
            TimeUnit::Minute => 60,
            TimeUnit::Hour => 3600,
            _ => 86_400,
        }
    }

    /// `start` advanced by `n` units.
    pub fn advance(self, start: NaiveDateTime, n: u64) -> Result<NaiveDateTime> {
        let advanced = match self.months() {
            Some(m) => u32::try_from(n)
                .ok()
                .and_then(|n| n.checked_mul(m))
                .and_then(|total| start.checked_add_months(Months::new(total))),
            None => i64::try_from(n)
                .ok()
                .and_then(|n| n.checked_mul(self.seconds()))
                .and_then(TimeDelta::try_seconds)
                .and_then(|delta| start.checked_add_signed(delta)),
        };
        advanced.ok_or_else(|| {
            HspfError::InvalidTimestamp(format!("{} + {} x {:?} overflows", start, n, self))
        })
    }

    /// True when `ts` sits on a calendar boundary of this unit.
    fn is_aligned(self, ts: NaiveDateTime) -> bool {
        let midnight = ts.time().num_seconds_from_midnight() == 0;
        match self {
            TimeUnit::Month => midnight && ts.day() == 1,
            TimeUnit::Year | TimeUnit::Century => midnight && ts.day() == 1 && ts.month() == 1,
            _ => true,
        }
    }

    /// First boundary strictly after `start`.
    fn next_boundary(self, start: NaiveDateTime) -> Result<NaiveDateTime> {
        if self.is_aligned(start) {
            return self.advance(start, 1);
        }
        let date = match self {
            TimeUnit::Month => NaiveDate::from_ymd_opt(start.year(), start.month(), 1)
                .and_then(|d| d.checked_add_months(Months::new(1))),
            _ => NaiveDate::from_ymd_opt(start.year() + 1, 1, 1),
        };
        date.and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| HspfError::InvalidTimestamp(format!("no boundary after {}", start)))
    }
}

/// Group boundaries: `start` followed by `groups` calendar boundaries.
///
/// Month, year and century groups are anchored to calendar starts, so a
/// series that begins mid-month has a short first group.
pub fn coarse_grid(start: NaiveDateTime, unit: TimeUnit, groups: usize) -> Result<Vec<NaiveDateTime>> {
    let mut grid = Vec::with_capacity(groups + 1);
    grid.push(start);
    if groups == 0 {
        return Ok(grid);
    }
    let first = unit.next_boundary(start)?;
    for k in 0..groups {
        grid.push(unit.advance(first, k as u64)?);
    }
    Ok(grid)
}

fn check_step(step: i32) -> Result<u64> {
    if step <= 0 {
        return Err(HspfError::CorruptedData(format!("time step {} must be positive", step)));
    }
    Ok(step as u64)
}

/// Timestamp of value `j`: `start + j * step` units.
pub fn tick(start: NaiveDateTime, unit: TimeUnit, step: i32, j: u64) -> Result<NaiveDateTime> {
    advance_steps(start, unit, check_step(step)?, j)
}

/// The first `n` value timestamps.
pub fn ticks(
    start: NaiveDateTime,
    unit: TimeUnit,
    step: i32,
    n: usize,
) -> Result<Vec<NaiveDateTime>> {
    (0..n as u64).map(|j| tick(start, unit, step, j)).collect()
}

/// Number of value timestamps inside each coarse interval `[c_k, c_k+1)`.
///
/// Counts come from the tick arithmetic alone, so a group spanning billions
/// of values costs nothing until those values are decoded. `coarse` must be
/// sorted and start at `start`.
pub fn group_counts(
    coarse: &[NaiveDateTime],
    start: NaiveDateTime,
    unit: TimeUnit,
    step: i32,
) -> Result<Vec<usize>> {
    let step = check_step(step)?;
    let mut before = Vec::with_capacity(coarse.len());

    match unit.months() {
        None => {
            let width = unit.seconds() * step as i64;
            for &c in coarse {
                let elapsed = (c - start).num_seconds().max(0);
                // Ticks strictly before `c`: ceil(elapsed / width)
                let n = (elapsed + width - 1) / width;
                before.push(n as usize);
            }
        }
        Some(_) => {
            // Calendar steps have no fixed width; walk them once across the grid.
            let mut j = 0u64;
            for &c in coarse {
                while advance_steps(start, unit, step, j)? < c {
                    j += 1;
                }
                before.push(j as usize);
            }
        }
    }

    Ok(before.windows(2).map(|w| w[1] - w[0]).collect())
}

fn advance_steps(
    start: NaiveDateTime,
    unit: TimeUnit,
    step: u64,
    j: u64,
) -> Result<NaiveDateTime> {
    let n = j.checked_mul(step).ok_or_else(|| {
        HspfError::InvalidTimestamp(format!("value {} of step {} overflows", j, step))
    })?;
    unit.advance(start, n)
}
