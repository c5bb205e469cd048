use std::path::PathBuf;

use crate::fetch::FetchConfig;

pub const DEFAULT_INPUT: &str = "VATSpy.dat";
pub const DEFAULT_OUTPUT: &str = "VATSpy.json";

/// Where the version tag of the converted file comes from
#[derive(Clone, Debug)]
pub enum VersionSource {
    /// An AIRAC cycle given by the user, tagged as `airac<cycle>`
    Airac(String),
    /// The tag of the latest release, downloaded to the input path first
    Fetch(FetchConfig),
}

#[derive(Clone, Debug)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub pretty: bool,
    pub source: VersionSource,
}

impl RunConfig {
    #[must_use]
    pub fn airac(cycle: &str) -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            output: PathBuf::from(DEFAULT_OUTPUT),
            pretty: false,
            source: VersionSource::Airac(cycle.to_string()),
        }
    }
}

#[must_use]
pub fn airac_tag(cycle: &str) -> String {
    format!("airac{cycle}")
}
