use std::{
    fmt::Debug,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::output::{persist, OutputError};

pub const DEFAULT_FEED_URL: &str =
    "https://api.github.com/repos/vatsimnetwork/vatspy-data-project/releases/latest";
pub const DEFAULT_ASSET: &str = "VATSpy.dat";
pub const DEFAULT_VERSION_FILE: &str = "VATSpy.version";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to release feed failed: {0}")]
    Request(#[from] ureq::Error),
    #[error("malformed release feed response: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("release {tag} has no asset named {asset}")]
    MissingAsset { tag: String, asset: String },
    #[error("failed to read from release feed or version file: {0}")]
    FileRead(#[from] io::Error),
    #[error("failed to store release: {0}")]
    Store(#[from] OutputError),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
}

/// The subset of a GitHub release we rely on
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Release {
    pub tag_name: String,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Release {
    #[must_use]
    pub fn asset(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

pub trait ReleaseFeed {
    fn latest_release(&self) -> Result<Release, FetchError>;
    fn download(&self, asset: &Asset) -> Result<Vec<u8>, FetchError>;
}

pub struct GithubReleases {
    agent: ureq::Agent,
    url: String,
}

impl GithubReleases {
    #[must_use]
    pub fn new(url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build();
        Self {
            agent,
            url: url.to_string(),
        }
    }
}

impl ReleaseFeed for GithubReleases {
    fn latest_release(&self) -> Result<Release, FetchError> {
        debug!("querying {}", self.url);
        let body = self
            .agent
            .get(&self.url)
            .set("Accept", "application/vnd.github+json")
            .call()?
            .into_string()?;
        Ok(serde_json::from_str(&body)?)
    }

    fn download(&self, asset: &Asset) -> Result<Vec<u8>, FetchError> {
        debug!("downloading {}", asset.browser_download_url);
        let mut content = Vec::new();
        self.agent
            .get(&asset.browser_download_url)
            .call()?
            .into_reader()
            .read_to_end(&mut content)?;
        Ok(content)
    }
}

#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub feed_url: String,
    /// File name of the flat file among the release assets
    pub asset: String,
    /// Holds the tag of the last downloaded release
    pub version_file: PathBuf,
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            asset: DEFAULT_ASSET.to_string(),
            version_file: PathBuf::from(DEFAULT_VERSION_FILE),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Decides whether a release differing from the local one gets downloaded.
pub enum UpdatePolicy {
    Accept,
    Reject,
    /// Called with the latest release and the locally known tag
    Ask(Box<dyn Fn(&Release, Option<&str>) -> bool>),
}

impl Debug for UpdatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Accept => "Accept",
            Self::Reject => "Reject",
            Self::Ask(_) => "Ask",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fetched {
    pub tag: String,
    pub published_at: Option<DateTime<Utc>>,
    pub path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    Updated(Fetched),
    UpToDate {
        tag: String,
    },
    Declined {
        latest: String,
        local: Option<String>,
    },
}

pub fn read_version(path: &Path) -> Result<Option<String>, FetchError> {
    match fs::read_to_string(path) {
        Ok(tag) => Ok(Some(tag.trim().to_string()).filter(|tag| !tag.is_empty())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn write_version(path: &Path, tag: &str) -> Result<(), FetchError> {
    persist(path, |writer| {
        writeln!(writer, "{tag}")?;
        Ok(())
    })?;
    Ok(())
}

/// Downloads the latest release of the flat file to `target` unless the
/// version file already names it or `policy` declines. The version file is
/// only updated after `target` was written completely.
pub fn fetch_latest(
    feed: &dyn ReleaseFeed,
    config: &FetchConfig,
    target: &Path,
    policy: &UpdatePolicy,
) -> Result<FetchOutcome, FetchError> {
    let release = feed.latest_release()?;
    let local = read_version(&config.version_file)?;
    info!(
        "latest release is {} (published {}), local version is {}",
        release.tag_name,
        release
            .published_at
            .map_or_else(|| "at an unknown time".to_string(), |at| at.to_rfc3339()),
        local.as_deref().unwrap_or("unknown"),
    );

    if local.as_deref() == Some(release.tag_name.as_str()) && target.exists() {
        return Ok(FetchOutcome::UpToDate {
            tag: release.tag_name,
        });
    }

    let asset = release
        .asset(&config.asset)
        .ok_or_else(|| FetchError::MissingAsset {
            tag: release.tag_name.clone(),
            asset: config.asset.clone(),
        })?;

    let accepted = match policy {
        UpdatePolicy::Accept => true,
        UpdatePolicy::Reject => false,
        UpdatePolicy::Ask(confirm) => confirm(&release, local.as_deref()),
    };
    if !accepted {
        return Ok(FetchOutcome::Declined {
            latest: release.tag_name,
            local,
        });
    }

    let content = feed.download(asset)?;
    persist(target, |writer| {
        writer.write_all(&content)?;
        Ok(())
    })?;
    write_version(&config.version_file, &release.tag_name)?;
    info!(
        "stored release {} ({} bytes) at {}",
        release.tag_name,
        content.len(),
        target.display()
    );

    Ok(FetchOutcome::Updated(Fetched {
        tag: release.tag_name,
        published_at: release.published_at,
        path: target.to_path_buf(),
    }))
}

#[cfg(test)]
mod test {
    use std::{cell::Cell, path::Path};

    use chrono::{TimeZone, Utc};
    use fs_err as fs;
    use pretty_assertions_sorted::assert_eq_sorted;

    use crate::scratch_dir;

    use super::{
        fetch_latest, read_version, Asset, FetchConfig, FetchError, FetchOutcome, Fetched,
        Release, ReleaseFeed, UpdatePolicy,
    };

    struct StaticFeed {
        release: Release,
        content: &'static [u8],
        downloads: Cell<usize>,
    }

    impl StaticFeed {
        fn new(tag: &str, asset: &str) -> Self {
            Self {
                release: Release {
                    tag_name: tag.to_string(),
                    published_at: Some(Utc.with_ymd_and_hms(2024, 1, 25, 12, 0, 0).unwrap()),
                    assets: vec![Asset {
                        name: asset.to_string(),
                        browser_download_url: format!("https://example.invalid/{asset}"),
                    }],
                },
                content: b"[Countries]\nGermany|ED|Center\n",
                downloads: Cell::new(0),
            }
        }
    }

    impl ReleaseFeed for StaticFeed {
        fn latest_release(&self) -> Result<Release, FetchError> {
            Ok(self.release.clone())
        }

        fn download(&self, asset: &Asset) -> Result<Vec<u8>, FetchError> {
            assert_eq!(asset.name, "VATSpy.dat");
            self.downloads.set(self.downloads.get() + 1);
            Ok(self.content.to_vec())
        }
    }

    fn config(dir: &Path) -> FetchConfig {
        FetchConfig {
            version_file: dir.join("VATSpy.version"),
            ..FetchConfig::default()
        }
    }

    #[test]
    fn test_release_json() {
        let release: Release = serde_json::from_str(
            r#"{
                "url": "https://api.github.com/repos/vatsimnetwork/vatspy-data-project/releases/1",
                "tag_name": "v2401.1",
                "name": "AIRAC 2401",
                "published_at": "2024-01-25T12:00:00Z",
                "assets": [
                    { "name": "Boundaries.geojson", "browser_download_url": "https://example.invalid/Boundaries.geojson", "size": 1 },
                    { "name": "VATSpy.dat", "browser_download_url": "https://example.invalid/VATSpy.dat", "size": 2 }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(release.tag_name, "v2401.1");
        assert_eq!(
            release.published_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 25, 12, 0, 0).unwrap())
        );
        assert_eq!(
            release.asset("VATSpy.dat").map(|asset| asset.browser_download_url.as_str()),
            Some("https://example.invalid/VATSpy.dat")
        );
        assert!(release.asset("vatspy.dat").is_none());
    }

    #[test]
    fn test_update_accepted() {
        let dir = scratch_dir("update_accepted");
        let target = dir.join("VATSpy.dat");
        let config = config(&dir);
        fs::write(&config.version_file, "v2313.1\n").unwrap();
        let feed = StaticFeed::new("v2401.1", "VATSpy.dat");
        let policy = UpdatePolicy::Ask(Box::new(|release: &Release, local: Option<&str>| {
            release.tag_name == "v2401.1" && local == Some("v2313.1")
        }));

        let outcome = fetch_latest(&feed, &config, &target, &policy).unwrap();

        assert_eq_sorted!(
            outcome,
            FetchOutcome::Updated(Fetched {
                tag: "v2401.1".to_string(),
                published_at: Some(Utc.with_ymd_and_hms(2024, 1, 25, 12, 0, 0).unwrap()),
                path: target.clone(),
            })
        );
        assert_eq!(fs::read(&target).unwrap(), feed.content);
        assert_eq!(
            read_version(&config.version_file).unwrap().as_deref(),
            Some("v2401.1")
        );
    }

    #[test]
    fn test_up_to_date() {
        let dir = scratch_dir("up_to_date");
        let target = dir.join("VATSpy.dat");
        let config = config(&dir);
        fs::write(&config.version_file, "v2401.1\n").unwrap();
        fs::write(&target, "local").unwrap();
        let feed = StaticFeed::new("v2401.1", "VATSpy.dat");

        let outcome = fetch_latest(&feed, &config, &target, &UpdatePolicy::Accept).unwrap();

        assert_eq!(
            outcome,
            FetchOutcome::UpToDate {
                tag: "v2401.1".to_string()
            }
        );
        assert_eq!(feed.downloads.get(), 0);
        assert_eq!(fs::read_to_string(&target).unwrap(), "local");
    }

    #[test]
    fn test_declined() {
        let dir = scratch_dir("declined");
        let target = dir.join("VATSpy.dat");
        let config = config(&dir);
        let feed = StaticFeed::new("v2401.1", "VATSpy.dat");

        let outcome = fetch_latest(&feed, &config, &target, &UpdatePolicy::Reject).unwrap();

        assert_eq!(
            outcome,
            FetchOutcome::Declined {
                latest: "v2401.1".to_string(),
                local: None,
            }
        );
        assert_eq!(feed.downloads.get(), 0);
        assert!(!target.exists());
        assert_eq!(read_version(&config.version_file).unwrap(), None);
    }

    #[test]
    fn test_missing_asset() {
        let dir = scratch_dir("missing_asset");
        let target = dir.join("VATSpy.dat");
        let feed = StaticFeed::new("v2401.1", "Boundaries.geojson");

        let err = fetch_latest(&feed, &config(&dir), &target, &UpdatePolicy::Accept).unwrap_err();

        assert!(
            matches!(&err, FetchError::MissingAsset { tag, asset } if tag == "v2401.1" && asset == "VATSpy.dat"),
            "{err:?}"
        );
        assert!(!target.exists());
    }
}
