use std::{
    io,
    path::{Path, PathBuf},
};

use fs_err as fs;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    config::{airac_tag, RunConfig, VersionSource},
    fetch::{
        fetch_latest, FetchConfig, FetchError, FetchOutcome, GithubReleases, ReleaseFeed,
        UpdatePolicy,
    },
    output::{write_json, OutputError},
    vatspy::{VatSpy, VatSpyError},
};

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("failed to open input file {}: {source}", path.display())]
    MissingInput { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Parse(#[from] VatSpyError),
    #[error("failed to write {}: {source}", path.display())]
    Output { path: PathBuf, source: OutputError },
    #[error("no update performed: {0}")]
    Fetch(#[from] FetchError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    pub version: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub countries: usize,
    pub airports: usize,
    pub firs: usize,
    pub uirs: usize,
    pub idl: usize,
}

/// Parses `input` tagged with `version` and writes the JSON document to `output`.
pub fn convert_file(
    input: &Path,
    output: &Path,
    version: &str,
    pretty: bool,
) -> Result<Summary, ConvertError> {
    let content = fs::read(input).map_err(|source| ConvertError::MissingInput {
        path: input.to_path_buf(),
        source,
    })?;
    let vatspy = VatSpy::parse(&content, version)?;
    write_json(&vatspy, output, pretty).map_err(|source| ConvertError::Output {
        path: output.to_path_buf(),
        source,
    })?;

    let summary = Summary {
        version: version.to_string(),
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        countries: vatspy.countries.len(),
        airports: vatspy.airports.len(),
        firs: vatspy.firs.len(),
        uirs: vatspy.uirs.len(),
        idl: vatspy.idl.len(),
    };
    info!(
        "{version}: converted {} to {} ({} countries, {} airports, {} FIRs, {} UIRs, {} IDL points)",
        input.display(),
        output.display(),
        summary.countries,
        summary.airports,
        summary.firs,
        summary.uirs,
        summary.idl,
    );
    Ok(summary)
}

/// Fetches the latest release to `config.input` and converts whatever
/// release is then present locally. Returns `None` if no release is
/// known locally after the fetch.
pub fn fetch_and_convert(
    feed: &dyn ReleaseFeed,
    fetch_config: &FetchConfig,
    config: &RunConfig,
    policy: &UpdatePolicy,
) -> Result<Option<Summary>, ConvertError> {
    let version = match fetch_latest(feed, fetch_config, &config.input, policy)? {
        FetchOutcome::Updated(fetched) => fetched.tag,
        FetchOutcome::UpToDate { tag } => {
            info!("{} is up to date", config.input.display());
            tag
        }
        FetchOutcome::Declined {
            latest,
            local: Some(local),
        } if config.input.exists() => {
            info!("keeping {local}, not updating to {latest}");
            local
        }
        FetchOutcome::Declined { latest, .. } => {
            warn!("declined {latest} and no local release is known, nothing to convert");
            return Ok(None);
        }
    };

    convert_file(&config.input, &config.output, &version, config.pretty).map(Some)
}

pub fn run(config: &RunConfig, policy: &UpdatePolicy) -> Result<Option<Summary>, ConvertError> {
    match &config.source {
        VersionSource::Airac(cycle) => {
            convert_file(&config.input, &config.output, &airac_tag(cycle), config.pretty).map(Some)
        }
        VersionSource::Fetch(fetch_config) => {
            let feed = GithubReleases::new(&fetch_config.feed_url, fetch_config.timeout);
            fetch_and_convert(&feed, fetch_config, config, policy)
        }
    }
}
