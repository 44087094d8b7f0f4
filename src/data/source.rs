//! Where the Lexis snapshot comes from.
//!
//! The supported path is the cached CSV snapshot. A remote HMD client can be
//! plugged in through `LexisFetcher`; it receives credentials as an explicit
//! `HmdCredentials` value. When a fetch fails for any reason we fall back to
//! the cached snapshot as a whole. There is no per-request retry.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use tracing::{info, warn};

use crate::domain::{ObservationRecord, RecordKey, Sex, Triangle};
use crate::error::{AppError, PipelineError};
use crate::io::{load_snapshot, save_snapshot};

/// HMD account credentials.
#[derive(Clone)]
pub struct HmdCredentials {
    pub username: String,
    password: String,
}

impl HmdCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self, PipelineError> {
        let username = username.into();
        let password = password.into();
        if username.trim().is_empty() || password.is_empty() {
            return Err(PipelineError::Configuration(
                "HMD credentials need a username and a password".to_string(),
            ));
        }
        Ok(Self { username, password })
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for HmdCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmdCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// HMD Lexis datasets used by the pipeline (age 0 only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexisDataset {
    Deaths,
    Exposures,
}

impl LexisDataset {
    pub fn name(self) -> &'static str {
        match self {
            LexisDataset::Deaths => "Deaths_lexis",
            LexisDataset::Exposures => "Exposures_lexis",
        }
    }
}

/// One age-0 value of a Lexis dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct LexisValue {
    pub code: String,
    pub cohort: i32,
    pub year: i32,
    pub sex: Sex,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{dataset} for {code}: {message}")]
pub struct FetchError {
    pub code: String,
    pub dataset: &'static str,
    pub message: String,
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        AppError::new(5, err.to_string())
    }
}

/// A source of HMD Lexis data for one country at a time.
pub trait LexisFetcher {
    fn fetch(
        &self,
        code: &str,
        dataset: LexisDataset,
        credentials: &HmdCredentials,
    ) -> Result<Vec<LexisValue>, FetchError>;
}

/// Combine the deaths and exposures datasets into observation records.
///
/// Every `(code, cohort, year, sex)` cell must be present in both datasets.
pub fn merge_lexis(
    deaths: &[LexisValue],
    exposures: &[LexisValue],
) -> Result<Vec<ObservationRecord>, PipelineError> {
    type Cell = (String, i32, i32, Sex);
    let index = |values: &[LexisValue]| -> Result<BTreeMap<Cell, f64>, PipelineError> {
        let mut map = BTreeMap::new();
        for v in values {
            let cell = (v.code.clone(), v.cohort, v.year, v.sex);
            if map.insert(cell, v.value).is_some() {
                return Err(PipelineError::InsufficientData(format!(
                    "{} year {}: duplicated cell",
                    RecordKey::new(v.code.clone(), v.cohort, v.sex),
                    v.year
                )));
            }
        }
        Ok(map)
    };
    let deaths = index(deaths)?;
    let mut exposures = index(exposures)?;

    let mut out = Vec::with_capacity(deaths.len());
    for ((code, cohort, year, sex), d) in deaths {
        let key = RecordKey::new(code.clone(), cohort, sex);
        let e = exposures.remove(&(code.clone(), cohort, year, sex)).ok_or_else(|| {
            PipelineError::InsufficientData(format!("{key} year {year}: deaths without exposures"))
        })?;
        let triangle = Triangle::from_years(cohort, year).ok_or_else(|| {
            PipelineError::InsufficientData(format!("{key}: year {year} precedes the cohort"))
        })?;
        out.push(ObservationRecord {
            code,
            cohort,
            year,
            sex,
            triangle,
            deaths: d,
            exposures: e,
        });
    }
    if let Some(((code, cohort, year, sex), _)) = exposures.into_iter().next() {
        return Err(PipelineError::InsufficientData(format!(
            "{} year {year}: exposures without deaths",
            RecordKey::new(code, cohort, sex)
        )));
    }
    Ok(out)
}

/// Fetch and merge both datasets for every country.
pub fn fetch_all(
    fetcher: &dyn LexisFetcher,
    countries: &[String],
    credentials: &HmdCredentials,
) -> Result<Vec<ObservationRecord>, AppError> {
    let mut records = Vec::new();
    for code in countries {
        let deaths = fetcher.fetch(code, LexisDataset::Deaths, credentials)?;
        let exposures = fetcher.fetch(code, LexisDataset::Exposures, credentials)?;
        records.extend(merge_lexis(&deaths, &exposures)?);
    }
    Ok(records)
}

/// How the snapshot for this run was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    Cache,
    Fetched,
}

/// Optional remote source: a fetcher plus the credentials it needs.
pub struct RemoteSource<'a> {
    pub fetcher: &'a dyn LexisFetcher,
    pub credentials: &'a HmdCredentials,
}

/// Obtain observation records for `countries`.
///
/// With a remote source, a successful fetch refreshes the cache file. A failed
/// fetch falls back to the cache; a missing cache is a configuration error.
pub fn resolve_snapshot(
    cache: &Path,
    countries: &[String],
    remote: Option<RemoteSource<'_>>,
) -> Result<(Vec<ObservationRecord>, SnapshotOrigin), AppError> {
    if let Some(remote) = remote {
        match fetch_all(remote.fetcher, countries, remote.credentials) {
            Ok(records) => {
                info!(rows = records.len(), "fetched Lexis data");
                save_snapshot(cache, &records)?;
                return Ok((records, SnapshotOrigin::Fetched));
            }
            Err(e) => {
                warn!(error = %e, cache = %cache.display(), "fetch failed; using cached snapshot");
            }
        }
    }
    Ok((load_snapshot(cache)?, SnapshotOrigin::Cache))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFetcher {
        fail: bool,
    }

    impl LexisFetcher for FixedFetcher {
        fn fetch(
            &self,
            code: &str,
            dataset: LexisDataset,
            _credentials: &HmdCredentials,
        ) -> Result<Vec<LexisValue>, FetchError> {
            if self.fail {
                return Err(FetchError {
                    code: code.to_string(),
                    dataset: dataset.name(),
                    message: "503 Service Unavailable".to_string(),
                });
            }
            let value = |year, v| LexisValue {
                code: code.to_string(),
                cohort: 2000,
                year,
                sex: Sex::Female,
                value: v,
            };
            Ok(match dataset {
                LexisDataset::Deaths => vec![value(2000, 20.0), value(2001, 3.0)],
                LexisDataset::Exposures => vec![value(2000, 9_000.0), value(2001, 8_900.0)],
            })
        }
    }

    fn credentials() -> HmdCredentials {
        HmdCredentials::new("analyst@example.org", "secret").unwrap()
    }

    #[test]
    fn credentials_require_both_parts_and_hide_password() {
        assert!(HmdCredentials::new("", "x").is_err());
        assert!(HmdCredentials::new("user", "").is_err());
        let debug = format!("{:?}", credentials());
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn merge_pairs_deaths_with_exposures_and_labels_triangles() {
        let fetcher = FixedFetcher { fail: false };
        let d = fetcher.fetch("SWE", LexisDataset::Deaths, &credentials()).unwrap();
        let e = fetcher.fetch("SWE", LexisDataset::Exposures, &credentials()).unwrap();
        let merged = merge_lexis(&d, &e).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].triangle, Triangle::Lower);
        assert_eq!(merged[0].deaths, 20.0);
        assert_eq!(merged[0].exposures, 9_000.0);
        assert_eq!(merged[1].triangle, Triangle::Upper);
    }

    #[test]
    fn merge_rejects_unmatched_cells() {
        let fetcher = FixedFetcher { fail: false };
        let d = fetcher.fetch("SWE", LexisDataset::Deaths, &credentials()).unwrap();
        let e = fetcher.fetch("SWE", LexisDataset::Exposures, &credentials()).unwrap();
        assert!(merge_lexis(&d[..1], &e).is_err());
        assert!(merge_lexis(&d, &e[..1]).is_err());
    }

    #[test]
    fn successful_fetch_refreshes_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("lexis.csv");
        let fetcher = FixedFetcher { fail: false };
        let creds = credentials();
        let countries = vec!["SWE".to_string(), "NOR".to_string()];
        let remote = RemoteSource {
            fetcher: &fetcher,
            credentials: &creds,
        };
        let (records, origin) = resolve_snapshot(&cache, &countries, Some(remote)).unwrap();
        assert_eq!(origin, SnapshotOrigin::Fetched);
        assert_eq!(records.len(), 4);
        assert_eq!(load_snapshot(&cache).unwrap(), records);
    }

    #[test]
    fn fetch_failure_has_its_own_exit_code() {
        let bad = FixedFetcher { fail: true };
        let err = fetch_all(&bad, &["SWE".to_string()], &credentials()).unwrap_err();
        assert_eq!(err.exit_code(), 5);
        assert!(err.message().contains("Deaths_lexis for SWE"));
    }

    #[test]
    fn failed_fetch_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("lexis.csv");
        let good = FixedFetcher { fail: false };
        let creds = credentials();
        let countries = vec!["SWE".to_string()];
        let records = fetch_all(&good, &countries, &creds).unwrap();
        save_snapshot(&cache, &records).unwrap();

        let bad = FixedFetcher { fail: true };
        let remote = RemoteSource {
            fetcher: &bad,
            credentials: &creds,
        };
        let (loaded, origin) = resolve_snapshot(&cache, &countries, Some(remote)).unwrap();
        assert_eq!(origin, SnapshotOrigin::Cache);
        assert_eq!(loaded, records);
    }

    #[test]
    fn failed_fetch_without_cache_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let bad = FixedFetcher { fail: true };
        let creds = credentials();
        let remote = RemoteSource {
            fetcher: &bad,
            credentials: &creds,
        };
        let err = resolve_snapshot(&dir.path().join("none.csv"), &["SWE".to_string()], Some(remote))
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
