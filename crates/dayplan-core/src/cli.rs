use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dayplan",
    version,
    about = "Dayplan: time-boxed daily task planner",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "dayplanrc", global = true)]
    pub dayplanrc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    /// Date to operate on (yyyy-MM-dd); defaults to today.
    #[arg(long = "date", global = true)]
    pub date: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add a task to the selected date.
    Add {
        text: String,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        /// 0-3 or a level name such as `very-important`.
        #[arg(long, default_value = "important")]
        importance: String,
    },
    /// Toggle a task's completion flag.
    Done { id: u64 },
    /// Remove a task from the selected date.
    Delete { id: u64 },
    /// List the selected date's tasks.
    List {
        #[arg(long)]
        sort: Option<String>,

        #[arg(long)]
        desc: bool,
    },
    /// Hour-by-hour layout of one day.
    Day,
    /// Hour-by-hour layout of the week containing the selected date.
    Week,
    /// Month calendar with per-day task counts.
    Month,
    /// Completion statistics for a trailing window.
    Stats {
        #[arg(long, default_value = "today")]
        window: String,

        /// Print the snapshot as JSON.
        #[arg(long)]
        json: bool,
    },
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls bare `rc.key=value` / `rc.key:value` tokens out of the argument list.
///
/// Only tokens before the subcommand (or a `--`) are considered, so
/// positional text such as a task description passes through untouched.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();
    let subcommands = subcommand_names();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    let mut scanning = true;
    for arg in iter {
        if !scanning {
            cleaned.push(arg);
            continue;
        }

        let s = arg.to_string_lossy();
        if s == "--" || subcommands.iter().any(|name| *name == s) {
            scanning = false;
        } else if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

fn subcommand_names() -> Vec<String> {
    GlobalCli::command()
        .get_subcommands()
        .flat_map(|sub| {
            std::iter::once(sub.get_name().to_string())
                .chain(sub.get_all_aliases().map(str::to_string))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&os(&["dayplan", "rc.user=ana", "-v", "rc.color:off", "list"]))
            .expect("preprocess");
        assert_eq!(pre.cleaned_args, os(&["dayplan", "-v", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.user".to_string(), "ana".to_string()),
                ("rc.color".to_string(), "off".to_string())
            ]
        );
    }

    #[test]
    fn task_text_after_subcommand_is_kept() {
        let args = os(&[
            "dayplan",
            "rc.color=off",
            "add",
            "rc.notes: call bob",
            "--start",
            "09:00",
            "--end",
            "09:30",
        ]);
        let pre = preprocess_args(&args).expect("preprocess");
        assert_eq!(pre.rc_overrides, vec![("rc.color".to_string(), "off".to_string())]);
        assert_eq!(pre.cleaned_args[1], OsString::from("add"));
        assert_eq!(pre.cleaned_args[2], OsString::from("rc.notes: call bob"));

        let pre = preprocess_args(&os(&["dayplan", "--", "rc.user=ana"])).expect("preprocess");
        assert!(pre.rc_overrides.is_empty());
        assert_eq!(pre.cleaned_args, os(&["dayplan", "--", "rc.user=ana"]));
    }

    #[test]
    fn parses_add_with_global_date() {
        let cli = GlobalCli::try_parse_from(os(&[
            "dayplan",
            "add",
            "write report",
            "--start",
            "09:00",
            "--end",
            "10:30",
            "--date",
            "2026-10-14",
        ]))
        .expect("parse");
        assert_eq!(cli.date.as_deref(), Some("2026-10-14"));
        match cli.command {
            Some(Command::Add {
                text, importance, ..
            }) => {
                assert_eq!(text, "write report");
                assert_eq!(importance, "important");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn key_val_requires_equals() {
        assert!("user".parse::<KeyVal>().is_err());
        let kv: KeyVal = " user = ana ".parse().expect("kv");
        assert_eq!(kv.key, "user");
        assert_eq!(kv.value, "ana");
    }
}
