use std::io::{self, IsTerminal, Write};

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::debug;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{add_days, format_date_key, start_of_week};
use crate::layout::HourSlot;
use crate::metrics::MetricsSnapshot;
use crate::store::TasksByDate;
use crate::task::{Importance, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color").unwrap_or(true);
        debug!(color, "renderer configured");
        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_task_table(&mut self, tasks: &[Task]) -> anyhow::Result<()> {
        let out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Time".to_string(),
            "Importance".to_string(),
            "Done".to_string(),
            "Task".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let time = format!("{}-{}", task.start_time, task.end_time);
            let importance = self.paint(task.importance.label(), importance_color(task.importance));
            let done = if task.completed { "x" } else { "" }.to_string();
            rows.push(vec![
                self.paint(&task.id.to_string(), "33"),
                time,
                importance,
                done,
                task.text.clone(),
            ]);
        }

        write_table(out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, slots))]
    pub fn print_day_grid(&mut self, date: NaiveDate, slots: &[HourSlot]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", format_date_key(date))?;
        for slot in slots {
            let entries = slot
                .placements
                .iter()
                .map(|p| {
                    let text = format!(
                        "{} {} (+{:.0}% / {:.0}%)",
                        p.task.start_time, p.task.text, p.top_percent, p.height_percent
                    );
                    self.paint(&text, importance_color(p.task.importance))
                })
                .collect::<Vec<_>>()
                .join("  ");
            writeln!(out, "{:02}:00 | {}", slot.hour, entries)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, days))]
    pub fn print_week(&mut self, days: &[(NaiveDate, Vec<HourSlot>)]) -> anyhow::Result<()> {
        let out = io::stdout().lock();

        let mut headers = vec!["Hour".to_string()];
        headers.extend(days.iter().map(|(date, _)| date.format("%a %d").to_string()));

        let mut rows = Vec::new();
        for hour in 0..24_usize {
            let mut row = vec![format!("{hour:02}:00")];
            let mut any = false;
            for (_, slots) in days {
                let cell = slots
                    .get(hour)
                    .map(|slot| {
                        slot.placements
                            .iter()
                            .map(|p| p.task.text.clone())
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default();
                any |= !cell.is_empty();
                row.push(cell);
            }
            if any {
                rows.push(row);
            }
        }

        write_table(out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, grid, tasks_by_date))]
    pub fn print_month(
        &mut self,
        focus: NaiveDate,
        week_start: Weekday,
        grid: &[[Option<NaiveDate>; 7]],
        tasks_by_date: &TasksByDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", focus.format("%B %Y"))?;

        let first = start_of_week(focus, week_start);
        let weekday_labels = (0..7)
            .map(|offset| format!("{:<5}", add_days(first, offset).format("%a")))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "{}", weekday_labels.trim_end())?;

        let mut lines = Vec::with_capacity(grid.len());
        for row in grid {
            let cells = row
                .iter()
                .map(|cell| match cell {
                    Some(day) => {
                        let count = tasks_by_date.get(day).map(Vec::len).unwrap_or(0);
                        if count > 0 {
                            format!("{:>2}({})", day.day(), count)
                        } else {
                            format!("{:>2}   ", day.day())
                        }
                    }
                    None => "     ".to_string(),
                })
                .collect::<Vec<_>>()
                .join(" ");
            lines.push(cells);
        }
        for line in lines {
            writeln!(out, "{}", line.trim_end())?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, snapshot))]
    pub fn print_metrics(&mut self, snapshot: &MetricsSnapshot) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "window           {:?}", snapshot.window)?;
        writeln!(out, "tasks            {}", snapshot.total_tasks)?;
        writeln!(out, "completed        {}", snapshot.completed_tasks)?;
        writeln!(out, "completion rate  {:.1}%", snapshot.completion_rate)?;
        writeln!(
            out,
            "average per day  {:.1}%",
            snapshot.average_completion_rate
        )?;
        writeln!(out)?;

        let headers = vec!["Importance".to_string(), "Tasks".to_string(), "Share".to_string()];
        let rows = snapshot
            .importance_distribution
            .iter()
            .map(|(level, count)| {
                vec![
                    self.paint(level.label(), importance_color(*level)),
                    count.to_string(),
                    format!("{:.0}%", snapshot.importance_share(*level)),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        writeln!(out)?;

        let headers = vec!["Day".to_string(), "Done".to_string(), "Total".to_string()];
        let rows = snapshot
            .daily_completion
            .iter()
            .map(|day| vec![day.label.clone(), day.completed.to_string(), day.total.to_string()])
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn importance_color(level: Importance) -> &'static str {
    match level {
        Importance::LessImportant => "32",
        Importance::MildlyImportant => "33",
        Importance::Important => "35",
        Importance::VeryImportant => "31",
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
