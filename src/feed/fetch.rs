//! Transport boundary: turn "where a supplier's file lives" into bytes.
//!
//! HTTP downloads and locally staged files are handled in-process. FTP and
//! SFTP drops are mirrored to disk by the external transfer agent, so their
//! connection parameters are carried as data (for configuration listings and
//! completeness) but a fetch against them reports that the staged-file path
//! is missing. Every outcome that means "no file this run" is an error value,
//! never a panic; the caller ends that supplier's run with zero stats.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::suppliers::SupplierKey;
use crate::util::env::{env_flag, env_opt};

/// Transport class a supplier delivers over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Ftp,
    Sftp,
    Http,
}

/// Resolved location of one supplier's current feed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    Http {
        url: String,
        timeout_secs: u64,
    },
    Ftp {
        host: String,
        user: String,
        password: String,
        dir: String,
        /// Glob-ish filename pattern; the newest match is the feed.
        pattern: Option<String>,
    },
    Sftp {
        host: String,
        port: u16,
        user: String,
        password: String,
        path: String,
    },
    LocalFile {
        path: PathBuf,
    },
}

impl FeedSource {
    /// Builds the source for a supplier from env vars with the supplier's
    /// uppercase prefix. A staged local file (`<PREFIX>_FEED_FILE`) always
    /// wins, which is also how FTP/SFTP drops enter the pipeline.
    pub fn from_env(key: SupplierKey, transport: Transport) -> Result<FeedSource, FetchError> {
        Self::from_vars(key, transport, |k| env_opt(k))
    }

    /// Same as [`FeedSource::from_env`] but with an injectable variable
    /// lookup.
    pub fn from_vars(
        key: SupplierKey,
        transport: Transport,
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<FeedSource, FetchError> {
        let prefix = key.env_prefix();
        let var = |suffix: &str| format!("{prefix}_{suffix}");
        let req = |suffix: &str| {
            get(&var(suffix)).ok_or_else(|| FetchError::MissingConfig(var(suffix)))
        };

        if let Some(path) = get(&var("FEED_FILE")) {
            return Ok(FeedSource::LocalFile { path: path.into() });
        }

        match transport {
            Transport::Http => Ok(FeedSource::Http {
                url: req("FEED_URL")?,
                timeout_secs: get(&var("FEED_TIMEOUT_SECS"))
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(60),
            }),
            Transport::Ftp => Ok(FeedSource::Ftp {
                host: req("FTP_HOST")?,
                user: req("FTP_USER")?,
                password: req("FTP_PASSWORD")?,
                dir: get(&var("FTP_DIR")).unwrap_or_else(|| "/".to_string()),
                pattern: get(&var("FTP_PATTERN")),
            }),
            Transport::Sftp => Ok(FeedSource::Sftp {
                host: req("SFTP_HOST")?,
                port: get(&var("SFTP_PORT"))
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(22),
                user: req("SFTP_USER")?,
                password: req("SFTP_PASSWORD")?,
                path: req("SFTP_PATH")?,
            }),
        }
    }

    /// Log-safe description: never includes credentials.
    pub fn describe(&self) -> String {
        match self {
            FeedSource::Http { url, .. } => format!("http {url}"),
            FeedSource::Ftp {
                host, user, dir, pattern, ..
            } => match pattern {
                Some(p) => format!("ftp {user}@{host}{dir} ({p}, newest)"),
                None => format!("ftp {user}@{host}{dir}"),
            },
            FeedSource::Sftp {
                host, port, user, path, ..
            } => format!("sftp {user}@{host}:{port}{path}"),
            FeedSource::LocalFile { path } => format!("file {}", path.display()),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("missing feed configuration: {0}")]
    MissingConfig(String),

    #[error("no in-process {transport} client; stage the file and set {prefix}_FEED_FILE")]
    Unsupported {
        transport: &'static str,
        prefix: String,
    },

    #[error("http status {status} from {url}")]
    HttpStatus {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("read {path}: {source}")]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("empty transfer from {0}")]
    Empty(String),
}

/// Downloads feed files and archives a spool copy of everything it fetched.
pub struct FeedFetcher {
    http: reqwest::Client,
    spool_dir: Option<PathBuf>,
}

impl FeedFetcher {
    pub fn new(spool_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("stocksync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building feed http client")?;
        Ok(Self { http, spool_dir })
    }

    /// Spool dir from `FEED_SPOOL_DIR` (default `./spool`), disabled by
    /// `FEED_SPOOL_DISABLED`.
    pub fn from_env() -> anyhow::Result<Self> {
        let spool_dir = if env_flag("FEED_SPOOL_DISABLED", false) {
            None
        } else {
            Some(PathBuf::from(
                env_opt("FEED_SPOOL_DIR").unwrap_or_else(|| "./spool".to_string()),
            ))
        };
        Self::new(spool_dir)
    }

    pub async fn fetch(
        &self,
        key: SupplierKey,
        source: &FeedSource,
    ) -> Result<Bytes, FetchError> {
        let bytes = match source {
            FeedSource::Http { url, timeout_secs } => {
                self.fetch_http(url, *timeout_secs).await?
            }
            FeedSource::LocalFile { path } => {
                let data = tokio::fs::read(path).await.map_err(|source| {
                    FetchError::LocalRead {
                        path: path.clone(),
                        source,
                    }
                })?;
                Bytes::from(data)
            }
            FeedSource::Ftp { .. } => {
                return Err(FetchError::Unsupported {
                    transport: "ftp",
                    prefix: key.env_prefix(),
                })
            }
            FeedSource::Sftp { .. } => {
                return Err(FetchError::Unsupported {
                    transport: "sftp",
                    prefix: key.env_prefix(),
                })
            }
        };

        if bytes.is_empty() {
            return Err(FetchError::Empty(source.describe()));
        }

        info!(
            supplier = key.name(),
            source = %source.describe(),
            size = bytes.len(),
            "fetched feed"
        );
        self.spool_copy(key, &bytes).await;
        Ok(bytes)
    }

    async fn fetch_http(&self, url: &str, timeout_secs: u64) -> Result<Bytes, FetchError> {
        let response = self
            .http
            .get(url)
            .timeout(Duration::from_secs(timeout_secs))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status,
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?)
    }

    /// Best effort: a failed archive write never fails the run.
    async fn spool_copy(&self, key: SupplierKey, bytes: &[u8]) {
        let Some(dir) = &self.spool_dir else { return };
        let sub = dir.join(key.name());
        if let Err(error) = tokio::fs::create_dir_all(&sub).await {
            warn!(%error, dir = %sub.display(), "cannot create spool dir");
            return;
        }
        let name = format!("{}.csv", chrono::Utc::now().format("%Y%m%dT%H%M%S%3f"));
        let path = sub.join(name);
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => debug!(path = %path.display(), size = bytes.len(), "archived feed copy"),
            Err(error) => warn!(%error, path = %path.display(), "failed to archive feed copy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn staged_file_wins_over_transport_config() {
        let source = FeedSource::from_vars(
            SupplierKey::Deltyre,
            Transport::Ftp,
            vars(&[
                ("DELTYRE_FEED_FILE", "/tmp/deltyre.csv"),
                ("DELTYRE_FTP_HOST", "ftp.example.com"),
            ]),
        )
        .unwrap();
        assert_eq!(
            source,
            FeedSource::LocalFile {
                path: "/tmp/deltyre.csv".into()
            }
        );
    }

    #[test]
    fn http_source_requires_url() {
        let err = FeedSource::from_vars(SupplierKey::Gripfield, Transport::Http, vars(&[]))
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::MissingConfig(ref name) if name == "GRIPFIELD_FEED_URL"
        ));

        let source = FeedSource::from_vars(
            SupplierKey::Gripfield,
            Transport::Http,
            vars(&[
                ("GRIPFIELD_FEED_URL", "https://feeds.example.com/stock.csv"),
                ("GRIPFIELD_FEED_TIMEOUT_SECS", "15"),
            ]),
        )
        .unwrap();
        assert_eq!(
            source,
            FeedSource::Http {
                url: "https://feeds.example.com/stock.csv".to_string(),
                timeout_secs: 15,
            }
        );
    }

    #[test]
    fn describe_never_leaks_credentials() {
        let source = FeedSource::Ftp {
            host: "ftp.example.com".to_string(),
            user: "feeds".to_string(),
            password: "s3cret".to_string(),
            dir: "/out".to_string(),
            pattern: Some("stock_*.csv".to_string()),
        };
        let text = source.describe();
        assert!(text.contains("ftp.example.com"));
        assert!(!text.contains("s3cret"));
    }

    #[tokio::test]
    async fn local_fetch_reads_and_spools() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("feed.csv");
        tokio::fs::write(&feed, b"A;1;2\n").await.unwrap();
        let spool = tempfile::tempdir().unwrap();

        let fetcher = FeedFetcher::new(Some(spool.path().to_path_buf())).unwrap();
        let bytes = fetcher
            .fetch(SupplierKey::Deltyre, &FeedSource::LocalFile { path: feed })
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"A;1;2\n");

        let mut archived = std::fs::read_dir(spool.path().join("deltyre"))
            .unwrap()
            .count();
        assert_eq!(archived, 1);
        // a second fetch archives a second copy; tick past the millisecond
        // used in the archive name first
        tokio::time::sleep(Duration::from_millis(5)).await;
        let feed2 = dir.path().join("feed2.csv");
        tokio::fs::write(&feed2, b"B;1;2\n").await.unwrap();
        fetcher
            .fetch(SupplierKey::Deltyre, &FeedSource::LocalFile { path: feed2 })
            .await
            .unwrap();
        archived = std::fs::read_dir(spool.path().join("deltyre"))
            .unwrap()
            .count();
        assert_eq!(archived, 2);
    }

    #[tokio::test]
    async fn empty_transfer_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("empty.csv");
        tokio::fs::write(&feed, b"").await.unwrap();

        let fetcher = FeedFetcher::new(None).unwrap();
        let err = fetcher
            .fetch(SupplierKey::Rimexpo, &FeedSource::LocalFile { path: feed })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Empty(_)));
    }

    #[tokio::test]
    async fn missing_staged_file_is_an_error() {
        let fetcher = FeedFetcher::new(None).unwrap();
        let err = fetcher
            .fetch(
                SupplierKey::Rimexpo,
                &FeedSource::LocalFile {
                    path: "/nonexistent/feed.csv".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::LocalRead { .. }));
    }

    #[tokio::test]
    async fn ftp_fetch_reports_staging_gap() {
        let fetcher = FeedFetcher::new(None).unwrap();
        let err = fetcher
            .fetch(
                SupplierKey::Deltyre,
                &FeedSource::Ftp {
                    host: "ftp.example.com".to_string(),
                    user: "u".to_string(),
                    password: "p".to_string(),
                    dir: "/".to_string(),
                    pattern: None,
                },
            )
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("DELTYRE_FEED_FILE"), "got: {text}");
    }
}
