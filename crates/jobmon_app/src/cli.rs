//! Command line surface of the `jobmon` binary.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use jobmon_engine::{ClientSettings, PollSettings, RetryPolicy, DEFAULT_BASE_URL};

use crate::platform::logging::LogDestination;

#[derive(Debug, Parser)]
#[command(name = "jobmon", version, about = "Run and monitor playbook jobs on a job server")]
pub struct Cli {
    /// Base URL of the job server API.
    #[arg(long, global = true, env = "JOBMON_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Directory for the log file and the running-jobs state file.
    #[arg(long, global = true, default_value = ".jobmon")]
    pub state_dir: PathBuf,

    /// Where log output goes.
    #[arg(long, global = true, value_enum, default_value_t = LogTarget::Terminal)]
    pub log: LogTarget,

    /// Retries for a failed status query before the job is reported failed.
    #[arg(long, global = true, default_value_t = 0)]
    pub retries: u32,

    /// Upper bound for the interval between status queries.
    #[arg(long, global = true, default_value_t = 5000)]
    pub max_interval_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a playbook run and monitor it until it finishes.
    Run {
        playbook: String,
        /// Target host; repeat for several hosts.
        #[arg(long = "host", required = true)]
        hosts: Vec<String>,
        /// Extra variable as KEY=VALUE; repeatable.
        #[arg(long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },
    /// Monitor jobs that were started elsewhere.
    Watch {
        #[arg(required = true)]
        job_ids: Vec<String>,
    },
    /// Ask the server to cancel a job.
    Cancel { job_id: String },
    /// Monitor the jobs a previous invocation left running.
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}

impl From<LogTarget> for LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::File => LogDestination::File,
            LogTarget::Both => LogDestination::Both,
        }
    }
}

impl Cli {
    pub fn client_settings(&self) -> anyhow::Result<ClientSettings> {
        ClientSettings::with_base_url(&self.base_url)
            .with_context(|| format!("invalid --base-url {:?}", self.base_url))
    }

    pub fn poll_settings(&self) -> anyhow::Result<PollSettings> {
        let defaults = PollSettings::default();
        let max_interval = Duration::from_millis(self.max_interval_ms);
        if max_interval.is_zero() {
            bail!("--max-interval-ms must be greater than zero");
        }
        Ok(PollSettings {
            initial_interval: defaults.initial_interval.min(max_interval),
            max_interval,
            retry: RetryPolicy::bounded(self.retries),
            ..defaults
        })
    }
}

/// Collects `--var` pairs, the last value for a repeated key wins.
pub fn extra_vars(vars: &[(String, String)]) -> BTreeMap<String, String> {
    vars.iter().cloned().collect()
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in {raw:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_collects_hosts_and_vars() {
        let cli = Cli::try_parse_from([
            "jobmon", "run", "site.yml", "--host", "web1", "--host", "db1", "--var", "env=prod",
            "--var", "tag=a=b",
        ])
        .expect("parse");

        match cli.command {
            Command::Run {
                playbook,
                hosts,
                vars,
            } => {
                assert_eq!(playbook, "site.yml");
                assert_eq!(hosts, vec!["web1", "db1"]);
                let vars = extra_vars(&vars);
                assert_eq!(vars.get("env").map(String::as_str), Some("prod"));
                assert_eq!(vars.get("tag").map(String::as_str), Some("a=b"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn run_requires_a_host() {
        assert!(Cli::try_parse_from(["jobmon", "run", "site.yml"]).is_err());
    }

    #[test]
    fn malformed_var_is_refused() {
        let result =
            Cli::try_parse_from(["jobmon", "run", "site.yml", "--host", "web1", "--var", "oops"]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "jobmon",
            "watch",
            "42",
            "43",
            "--retries",
            "3",
            "--max-interval-ms",
            "2000",
            "--log",
            "both",
        ])
        .expect("parse");

        assert_eq!(cli.log, LogTarget::Both);
        let poll = cli.poll_settings().expect("poll settings");
        assert_eq!(poll.max_interval, Duration::from_millis(2000));
        assert_eq!(poll.retry.max_retries, 3);
        match cli.command {
            Command::Watch { job_ids } => assert_eq!(job_ids, vec!["42", "43"]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn small_max_interval_clamps_the_first_sleep() {
        let cli =
            Cli::try_parse_from(["jobmon", "resume", "--max-interval-ms", "250"]).expect("parse");
        let poll = cli.poll_settings().expect("poll settings");
        assert_eq!(poll.initial_interval, Duration::from_millis(250));

        let zero =
            Cli::try_parse_from(["jobmon", "resume", "--max-interval-ms", "0"]).expect("parse");
        assert!(zero.poll_settings().is_err());
    }

    #[test]
    fn base_url_gets_a_trailing_slash() {
        let cli = Cli::try_parse_from(["jobmon", "--base-url", "http://jobs.local/api", "resume"])
            .expect("parse");
        let settings = cli.client_settings().expect("client settings");
        assert_eq!(settings.base_url.as_str(), "http://jobs.local/api/");
    }
}
