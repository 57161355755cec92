//! Command-line surface.
//!
//! Flags are accepted with one or two leading dashes (`-config` and
//! `--config` are equivalent), and `-flag=value` works as well as
//! `-flag value`.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{CommandFactory, Parser};
use uci_core::{Config, Mode};

#[derive(Parser, Debug)]
#[command(name = "ucid")]
#[command(about = "unified-ci pull request check orchestrator", long_about = None)]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Working mode: local, server or worker
    #[arg(long, default_value = "local")]
    pub mode: String,

    /// Force both log levels to debug
    #[arg(long)]
    pub verbose: bool,

    /// Show this help
    #[arg(long)]
    pub help: bool,

    /// Show the version
    #[arg(long)]
    pub version: bool,
}

const FLAGS: [&str; 5] = ["config", "mode", "verbose", "help", "version"];

/// What the process should do after argument parsing.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Help,
    Version,
    Run {
        config: PathBuf,
        mode: Mode,
        verbose: bool,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("Please specify a config file")]
    MissingConfig,

    #[error("Unknown working mode: {0}")]
    UnknownMode(String),
}

impl Cli {
    pub fn resolve(self) -> Result<Action, UsageError> {
        if self.help {
            return Ok(Action::Help);
        }
        if self.version {
            return Ok(Action::Version);
        }
        let config = match self.config {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => return Err(UsageError::MissingConfig),
        };
        let mode = Mode::from_str(&self.mode).map_err(|_| UsageError::UnknownMode(self.mode))?;
        Ok(Action::Run {
            config,
            mode,
            verbose: self.verbose,
        })
    }
}

/// Rewrite single-dash long flags (`-config`) into clap's `--config`.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            if i == 0 {
                return arg;
            }
            match arg.to_str() {
                Some(s) if is_single_dash_flag(s) => OsString::from(format!("-{s}")),
                _ => arg,
            }
        })
        .collect()
}

fn is_single_dash_flag(arg: &str) -> bool {
    let Some(rest) = arg.strip_prefix('-') else {
        return false;
    };
    if rest.starts_with('-') {
        return false;
    }
    let name = rest.split_once('=').map_or(rest, |(name, _)| name);
    FLAGS.contains(&name)
}

/// Process exit code for usage errors.
pub const USAGE_EXIT: u8 = 1;

/// Outcome of the command line: exit right away, or start the daemon.
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch {
    Exit(u8),
    Run {
        config: PathBuf,
        mode: Mode,
        verbose: bool,
    },
}

/// Parse `args`, print help, version or usage errors, and say what to do
/// next.
pub fn dispatch<I>(args: I, out: &mut dyn Write, err: &mut dyn Write) -> Dispatch
where
    I: IntoIterator<Item = OsString>,
{
    let action = Cli::try_parse_from(normalize_args(args))
        .map_err(|e| e.to_string())
        .and_then(|cli| cli.resolve().map_err(|e| e.to_string()));

    match action {
        Ok(Action::Help) => {
            let _ = writeln!(out, "{}", help_text());
            Dispatch::Exit(0)
        }
        Ok(Action::Version) => {
            let _ = writeln!(out, "{}", uci_core::user_agent());
            Dispatch::Exit(0)
        }
        Ok(Action::Run {
            config,
            mode,
            verbose,
        }) => Dispatch::Run {
            config,
            mode,
            verbose,
        },
        Err(message) => {
            let _ = writeln!(err, "{}", message.trim_end());
            let _ = writeln!(err, "{}", usage());
            Dispatch::Exit(USAGE_EXIT)
        }
    }
}

/// Load the config at `path`; `-verbose` is applied here, before any log
/// sink is built from it.
pub fn load_config(path: &Path, verbose: bool) -> uci_core::Result<Config> {
    let mut config = Config::load(path)?;
    if verbose {
        config.apply_verbose();
    }
    Ok(config)
}

/// Rendered flag usage.
pub fn usage() -> String {
    Cli::command().render_help().to_string()
}

/// `<user agent>`, a blank line, then usage.
pub fn help_text() -> String {
    format!("{}\n\n{}", uci_core::user_agent(), usage())
}
