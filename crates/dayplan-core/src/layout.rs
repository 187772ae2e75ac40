//! Calendar layout math: hour-slot placement for the day and week grids, and
//! the date ranges behind the daily, weekly and monthly views.
//!
//! Offsets are percentages of one hour slot's height. A task is placed only in
//! the slot of its start hour; a task longer than the rest of that hour gets a
//! height above 100% and overflows into the following slots.

use std::str::FromStr;

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate, Weekday};

use crate::datetime::{
    add_days, each_day, end_of_week, first_day_of_month, last_day_of_month, shift_months,
    start_of_week,
};
use crate::task::{ClockTime, Task};

pub const HOURS_PER_DAY: u32 = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct SlotPlacement {
    pub task: Task,
    pub top_percent: f64,
    pub height_percent: f64,
}

impl SlotPlacement {
    pub fn for_task(task: &Task) -> Self {
        let top_percent = f64::from(task.start_time.minute()) / 60.0 * 100.0;
        let height_percent = f64::from(task.duration_minutes()) / 60.0 * 100.0;
        Self {
            task: task.clone(),
            top_percent,
            height_percent,
        }
    }

    pub fn overflows_slot(&self) -> bool {
        self.top_percent + self.height_percent > 100.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HourSlot {
    pub hour: u32,
    pub placements: Vec<SlotPlacement>,
}

/// Tasks on `date` that start during `hour`, with their in-slot offsets.
pub fn slot_tasks(tasks: &[Task], hour: u32, date: NaiveDate) -> Vec<SlotPlacement> {
    tasks
        .iter()
        .filter(|task| task.date == date && task.start_time.hour() == hour)
        .map(SlotPlacement::for_task)
        .collect()
}

pub fn day_grid(tasks: &[Task], date: NaiveDate) -> Vec<HourSlot> {
    (0..HOURS_PER_DAY)
        .map(|hour| HourSlot {
            hour,
            placements: slot_tasks(tasks, hour, date),
        })
        .collect()
}

/// Vertical pixel offset of the "now" line from the top of the grid.
pub fn current_time_offset(now: ClockTime, slot_height_px: f64) -> f64 {
    f64::from(now.minutes_since_midnight()) * slot_height_px / 60.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarView {
    Daily,
    Weekly,
    Monthly,
}

impl FromStr for CalendarView {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(CalendarView::Daily),
            "weekly" | "week" => Ok(CalendarView::Weekly),
            "monthly" | "month" => Ok(CalendarView::Monthly),
            other => Err(anyhow!("unknown calendar view: {other}")),
        }
    }
}

/// The dates a view shows (and therefore has to load) around `focus`.
pub fn view_dates(view: CalendarView, focus: NaiveDate, week_start: Weekday) -> Vec<NaiveDate> {
    match view {
        CalendarView::Daily => vec![focus],
        CalendarView::Weekly => each_day(
            start_of_week(focus, week_start),
            end_of_week(focus, week_start),
        ),
        CalendarView::Monthly => each_day(
            first_day_of_month(focus.year(), focus.month()),
            last_day_of_month(focus.year(), focus.month()),
        ),
    }
}

/// Week rows for the month view. Cells outside the focus month are `None`.
pub fn month_grid(focus: NaiveDate, week_start: Weekday) -> Vec<[Option<NaiveDate>; 7]> {
    let first = first_day_of_month(focus.year(), focus.month());
    let last = last_day_of_month(focus.year(), focus.month());

    let mut rows = Vec::new();
    let mut cursor = start_of_week(first, week_start);
    while cursor <= last {
        let mut row = [None; 7];
        for (offset, cell) in row.iter_mut().enumerate() {
            let day = add_days(cursor, offset as i64);
            if day.month() == focus.month() && day.year() == focus.year() {
                *cell = Some(day);
            }
        }
        rows.push(row);
        cursor = add_days(cursor, 7);
    }
    rows
}

/// Moves the focus date by `step` views (days, weeks or months).
pub fn shift_focus(view: CalendarView, focus: NaiveDate, step: i32) -> NaiveDate {
    match view {
        CalendarView::Daily => add_days(focus, i64::from(step)),
        CalendarView::Weekly => add_days(focus, i64::from(step) * 7),
        CalendarView::Monthly => shift_months(focus, step),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Importance;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn task(id: u64, start: &str, end: &str, on: NaiveDate) -> Task {
        Task::new(
            id,
            format!("task {id}"),
            start.parse().expect("start"),
            end.parse().expect("end"),
            on,
            Importance::Important,
        )
        .expect("valid task")
    }

    #[test]
    fn half_hour_task_at_top_of_slot() {
        let d = date(2026, 10, 14);
        let tasks = vec![task(1, "09:00", "10:00", d), task(2, "08:00", "08:30", d)];

        let placements = slot_tasks(&tasks, 8, d);
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].task.id, 2);
        assert_eq!(placements[0].top_percent, 0.0);
        assert_eq!(placements[0].height_percent, 50.0);
        assert!(!placements[0].overflows_slot());
    }

    #[test]
    fn task_crossing_hour_stays_in_start_slot() {
        let d = date(2026, 10, 14);
        let tasks = vec![task(1, "09:45", "11:15", d)];

        assert!(slot_tasks(&tasks, 10, d).is_empty());
        let placements = slot_tasks(&tasks, 9, d);
        assert_eq!(placements[0].top_percent, 75.0);
        assert_eq!(placements[0].height_percent, 150.0);
        assert!(placements[0].overflows_slot());
    }

    #[test]
    fn slot_ignores_other_dates() {
        let d = date(2026, 10, 14);
        let tasks = vec![task(1, "09:00", "10:00", date(2026, 10, 15))];
        assert!(slot_tasks(&tasks, 9, d).is_empty());
    }

    #[test]
    fn day_grid_has_every_hour() {
        let d = date(2026, 10, 14);
        let tasks = vec![task(1, "00:15", "00:45", d), task(2, "23:00", "23:59", d)];
        let grid = day_grid(&tasks, d);
        assert_eq!(grid.len(), 24);
        assert_eq!(grid[0].placements.len(), 1);
        assert_eq!(grid[23].placements.len(), 1);
        assert!(grid[12].placements.is_empty());
    }

    #[test]
    fn now_line_offset_scales_with_slot_height() {
        let now: ClockTime = "01:30".parse().expect("clock");
        assert_eq!(current_time_offset(now, 80.0), 120.0);
    }

    #[test]
    fn weekly_view_covers_seven_days() {
        let dates = view_dates(CalendarView::Weekly, date(2026, 10, 14), Weekday::Sun);
        assert_eq!(dates.len(), 7);
        assert_eq!(dates[0], date(2026, 10, 11));
        assert_eq!(dates[6], date(2026, 10, 17));
    }

    #[test]
    fn monthly_view_and_grid() {
        let focus = date(2026, 2, 10);
        assert_eq!(view_dates(CalendarView::Monthly, focus, Weekday::Mon).len(), 28);

        // Feb 2026 starts on a Sunday.
        let rows = month_grid(focus, Weekday::Mon);
        assert_eq!(rows[0][5], None);
        assert_eq!(rows[0][6], Some(date(2026, 2, 1)));
        let last_row = rows.last().expect("rows");
        assert_eq!(last_row[5], Some(date(2026, 2, 28)));
        assert_eq!(last_row[6], None);
        assert_eq!(rows.iter().flatten().flatten().count(), 28);
    }

    #[test]
    fn shift_focus_moves_by_view() {
        let focus = date(2026, 10, 31);
        assert_eq!(shift_focus(CalendarView::Daily, focus, 1), date(2026, 11, 1));
        assert_eq!(shift_focus(CalendarView::Weekly, focus, -1), date(2026, 10, 24));
        assert_eq!(shift_focus(CalendarView::Monthly, focus, 1), date(2026, 11, 30));
        assert!("yearly".parse::<CalendarView>().is_err());
    }
}
