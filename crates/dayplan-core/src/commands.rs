use anyhow::Context;
use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::app::Planner;
use crate::cli::Command;
use crate::config::Config;
use crate::layout::{CalendarView, HourSlot, day_grid, month_grid, view_dates};
use crate::metrics::TimeWindow;
use crate::remote::RemoteStore;
use crate::render::Renderer;
use crate::sort::{SortDirection, sorted_tasks};
use crate::task::{ClockTime, Importance, TaskDraft};

/// Everything a command needs besides the planner itself.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext {
    pub date: NaiveDate,
    pub today: NaiveDate,
}

#[instrument(skip(planner, cfg, renderer, command))]
pub fn dispatch<R: RemoteStore>(
    planner: &mut Planner<R>,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
    ctx: CommandContext,
) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::Add {
            text,
            start,
            end,
            importance,
        } => cmd_add(planner, ctx, text, &start, &end, &importance),
        Command::Done { id } => cmd_done(planner, ctx, id),
        Command::Delete { id } => cmd_delete(planner, ctx, id),
        Command::List { sort, desc } => cmd_list(planner, cfg, renderer, ctx, sort, desc),
        Command::Day => cmd_day(planner, renderer, ctx),
        Command::Week => cmd_week(planner, cfg, renderer, ctx),
        Command::Month => cmd_month(planner, cfg, renderer, ctx),
        Command::Stats { window, json } => cmd_stats(planner, renderer, ctx, &window, json),
    }
}

#[instrument(skip(planner, text))]
fn cmd_add<R: RemoteStore>(
    planner: &mut Planner<R>,
    ctx: CommandContext,
    text: String,
    start: &str,
    end: &str,
    importance: &str,
) -> anyhow::Result<()> {
    info!("command add");

    let draft = TaskDraft {
        text,
        start_time: start.parse::<ClockTime>()?,
        end_time: end.parse::<ClockTime>()?,
        importance: importance.parse::<Importance>()?,
    };

    let (store, session) = planner.parts();
    match store.add_task(draft, ctx.date, session)? {
        Some(task) => println!("Created task {} on {}.", task.id, task.date),
        None => println!("Not signed in; nothing saved."),
    }
    Ok(())
}

#[instrument(skip(planner))]
fn cmd_done<R: RemoteStore>(
    planner: &mut Planner<R>,
    ctx: CommandContext,
    id: u64,
) -> anyhow::Result<()> {
    info!("command done");

    let (store, session) = planner.parts();
    if let Some(task) = store.toggle_task(id, ctx.date, session)? {
        let state = if task.completed { "completed" } else { "reopened" };
        println!("Task {} {state}.", task.id);
    }
    Ok(())
}

#[instrument(skip(planner))]
fn cmd_delete<R: RemoteStore>(
    planner: &mut Planner<R>,
    ctx: CommandContext,
    id: u64,
) -> anyhow::Result<()> {
    info!("command delete");

    let (store, session) = planner.parts();
    if let Some(task) = store.delete_task(id, ctx.date, session)? {
        println!("Deleted task {} '{}'.", task.id, task.text);
    }
    Ok(())
}

#[instrument(skip(planner, cfg, renderer))]
fn cmd_list<R: RemoteStore>(
    planner: &mut Planner<R>,
    cfg: &Config,
    renderer: &mut Renderer,
    ctx: CommandContext,
    sort: Option<String>,
    desc: bool,
) -> anyhow::Result<()> {
    info!("command list");

    let key = match sort {
        Some(raw) => raw.parse()?,
        None => cfg.sort_key()?,
    };
    let direction = if desc {
        SortDirection::Desc
    } else {
        cfg.sort_direction()?
    };

    let (store, session) = planner.parts();
    let tasks = store.load(ctx.date, session)?;
    let sorted = sorted_tasks(&tasks, ctx.date, key, direction);

    if sorted.is_empty() {
        println!("No tasks for {}.", ctx.date);
        return Ok(());
    }
    renderer.print_task_table(&sorted)
}

#[instrument(skip(planner, renderer))]
fn cmd_day<R: RemoteStore>(
    planner: &mut Planner<R>,
    renderer: &mut Renderer,
    ctx: CommandContext,
) -> anyhow::Result<()> {
    info!("command day");

    let (store, session) = planner.parts();
    let tasks = store.load(ctx.date, session)?;
    renderer.print_day_grid(ctx.date, &day_grid(&tasks, ctx.date))
}

#[instrument(skip(planner, cfg, renderer))]
fn cmd_week<R: RemoteStore>(
    planner: &mut Planner<R>,
    cfg: &Config,
    renderer: &mut Renderer,
    ctx: CommandContext,
) -> anyhow::Result<()> {
    info!("command week");

    let dates = view_dates(CalendarView::Weekly, ctx.date, cfg.week_start()?);
    let (store, session) = planner.parts();
    let tasks = store.load_range(&dates, session)?;

    let days: Vec<(NaiveDate, Vec<HourSlot>)> = dates
        .iter()
        .map(|date| (*date, day_grid(&tasks, *date)))
        .collect();
    renderer.print_week(&days)
}

#[instrument(skip(planner, cfg, renderer))]
fn cmd_month<R: RemoteStore>(
    planner: &mut Planner<R>,
    cfg: &Config,
    renderer: &mut Renderer,
    ctx: CommandContext,
) -> anyhow::Result<()> {
    info!("command month");

    let week_start = cfg.week_start()?;
    let dates = view_dates(CalendarView::Monthly, ctx.date, week_start);
    let (store, session) = planner.parts();
    store.load_range(&dates, session)?;

    renderer.print_month(
        ctx.date,
        week_start,
        &month_grid(ctx.date, week_start),
        planner.store().tasks_by_date(),
    )
}

#[instrument(skip(planner, renderer))]
fn cmd_stats<R: RemoteStore>(
    planner: &mut Planner<R>,
    renderer: &mut Renderer,
    ctx: CommandContext,
    window: &str,
    json: bool,
) -> anyhow::Result<()> {
    info!("command stats");

    let window: TimeWindow = window.parse()?;
    let snapshot = planner.metrics(window, ctx.today)?;

    if json {
        let text =
            serde_json::to_string_pretty(&snapshot).context("failed to encode metrics")?;
        println!("{text}");
        return Ok(());
    }
    renderer.print_metrics(&snapshot)
}
