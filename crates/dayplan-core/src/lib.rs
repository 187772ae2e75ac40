pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod error;
pub mod layout;
pub mod metrics;
pub mod remote;
pub mod render;
pub mod session;
pub mod sort;
pub mod store;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting dayplan CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.dayplanrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let remote =
    remote::FileRemote::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open task store at \
           {}",
          data_dir.display()
        )
      })?;

  let mut planner =
    app::Planner::new(remote);
  planner
    .initialize(session::User::new(
      cfg.user()
    ))
    .context(
      "failed to start planner session"
    )?;

  let timezone =
    datetime::resolve_timezone(
      cfg.get("timezone").as_deref(),
      &data_dir
    );
  let today =
    datetime::today_in(timezone);
  let date = match cli.date.as_deref() {
    | Some(raw) => {
      datetime::normalize_date(raw)?
    }
    | None => today
  };
  debug!(%timezone, %today, %date, "resolved dates");

  let mut renderer =
    render::Renderer::new(&cfg)?;
  let command =
    cli.command.unwrap_or(
      cli::Command::List {
        sort: None,
        desc: false
      }
    );

  commands::dispatch(
    &mut planner,
    &cfg,
    &mut renderer,
    command,
    commands::CommandContext {
      date,
      today
    }
  )?;

  info!("done");
  Ok(())
}
