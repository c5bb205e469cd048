use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::Context;
use clap::{ArgAction, Parser};
use tracing::Level;
use vatspy_converter::{
    config::{RunConfig, VersionSource, DEFAULT_INPUT, DEFAULT_OUTPUT},
    convert::run,
    fetch::{
        FetchConfig, Release, UpdatePolicy, DEFAULT_ASSET, DEFAULT_FEED_URL, DEFAULT_TIMEOUT,
        DEFAULT_VERSION_FILE,
    },
};

/// Converts VATSpy.dat into JSON
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the input file
    #[arg(short = 'f', long = "filename", default_value = DEFAULT_INPUT)]
    input: PathBuf,
    /// Path to the output file
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,
    /// AIRAC cycle of the VATSpy data
    #[arg(short, long, required_unless_present = "fetch")]
    airac: Option<String>,
    /// Download the latest release to the input path first and use its tag as version
    #[arg(long, conflicts_with = "airac")]
    fetch: bool,
    /// Download a new release without asking
    #[arg(long, conflicts_with_all = ["airac", "no"])]
    yes: bool,
    /// Never download a new release, convert the local one
    #[arg(long, conflicts_with = "airac")]
    no: bool,
    /// File holding the tag of the last downloaded release
    #[arg(long, default_value = DEFAULT_VERSION_FILE)]
    version_file: PathBuf,
    /// URL of the latest release in the GitHub API
    #[arg(long, default_value = DEFAULT_FEED_URL)]
    feed_url: String,
    /// File name of VATSpy.dat among the release assets
    #[arg(long, default_value = DEFAULT_ASSET)]
    asset: String,
    /// Timeout for requests to the release feed in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout: u64,
    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
    /// More log output, can be repeated
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Less log output, can be repeated
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "verbose")]
    quiet: u8,
}

impl Args {
    fn run_config(&self) -> RunConfig {
        let source = match &self.airac {
            Some(cycle) if !self.fetch => VersionSource::Airac(cycle.clone()),
            _ => VersionSource::Fetch(FetchConfig {
                feed_url: self.feed_url.clone(),
                asset: self.asset.clone(),
                version_file: self.version_file.clone(),
                timeout: Duration::from_secs(self.timeout),
            }),
        };

        RunConfig {
            input: self.input.clone(),
            output: self.output.clone(),
            pretty: self.pretty,
            source,
        }
    }

    fn update_policy(&self) -> UpdatePolicy {
        if self.yes {
            UpdatePolicy::Accept
        } else if self.no {
            UpdatePolicy::Reject
        } else {
            UpdatePolicy::Ask(Box::new(confirm))
        }
    }

    fn log_level(&self) -> Level {
        match i16::from(self.verbose) - i16::from(self.quiet) {
            i16::MIN..=-2 => Level::ERROR,
            -1 => Level::WARN,
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

fn confirm(release: &Release, local: Option<&str>) -> bool {
    print!(
        "VATSpy release {} is available (local: {}). Download it? [y/N] ",
        release.tag_name,
        local.unwrap_or("none")
    );
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_writer(io::stderr)
        .init();

    let config = args.run_config();
    let summary = run(&config, &args.update_policy())
        .with_context(|| format!("could not convert {}", config.input.display()))?;

    if let Some(summary) = summary {
        println!(
            "{}: successfully converted {}, it has been saved as {}",
            summary.version,
            summary.input.display(),
            summary.output.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use clap::Parser;
    use tracing::Level;
    use vatspy_converter::{config::VersionSource, fetch::UpdatePolicy};

    use super::Args;

    #[test]
    fn test_airac_defaults() {
        let args = Args::try_parse_from(["vatspy2json", "-a", "2401"]).unwrap();
        let config = args.run_config();

        assert_eq!(config.input.to_str(), Some("VATSpy.dat"));
        assert_eq!(config.output.to_str(), Some("VATSpy.json"));
        assert!(matches!(config.source, VersionSource::Airac(cycle) if cycle == "2401"));
        assert_eq!(args.log_level(), Level::INFO);
    }

    #[test]
    fn test_fetch() {
        let args = Args::try_parse_from([
            "vatspy2json",
            "--fetch",
            "--yes",
            "-f",
            "data/VATSpy.dat",
            "--timeout",
            "5",
            "-vv",
        ])
        .unwrap();

        let VersionSource::Fetch(fetch) = args.run_config().source else {
            panic!("expected fetch mode");
        };
        assert_eq!(fetch.timeout.as_secs(), 5);
        assert_eq!(fetch.asset, "VATSpy.dat");
        assert_eq!(args.log_level(), Level::TRACE);
    }

    #[test]
    fn test_fetch_declining() {
        let args = Args::try_parse_from(["vatspy2json", "--fetch", "--no", "-q"]).unwrap();

        assert!(matches!(args.run_config().source, VersionSource::Fetch(_)));
        assert!(matches!(args.update_policy(), UpdatePolicy::Reject));
        assert_eq!(args.log_level(), Level::WARN);
    }

    #[test]
    fn test_invalid_combinations() {
        assert!(Args::try_parse_from(["vatspy2json"]).is_err());
        assert!(Args::try_parse_from(["vatspy2json", "-a", "2401", "--fetch"]).is_err());
        assert!(Args::try_parse_from(["vatspy2json", "-a", "2401", "--yes"]).is_err());
        assert!(Args::try_parse_from(["vatspy2json", "-a", "2401", "--no"]).is_err());
        assert!(Args::try_parse_from(["vatspy2json", "--yes"]).is_err());
        assert!(Args::try_parse_from(["vatspy2json", "--fetch", "--yes", "--no"]).is_err());
    }
}
