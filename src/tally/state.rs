//! Persisted tally state.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Current layout version of the state file.
pub const SCHEMA_VERSION: u32 = 1;

/// Version assumed for files written before the `version` key existed.
const LEGACY_VERSION: u32 = 0;

/// Totals keyed by user.
pub type UserTotals = BTreeMap<String, u64>;

/// Month bucket holding counts from before per-month tracking began.
pub const UNKNOWN_MONTH: &str = "unknown";

/// Per-user subtotals keyed by `YYYY-MM`.
pub type MonthlyTotals = BTreeMap<String, BTreeMap<String, u64>>;

/// Errors that can occur while loading or saving the state file.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("State file {path} has schema version {found}, newest supported is {supported}")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    #[error("Failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything that survives between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredState")]
pub struct TallyState {
    /// Layout version of the file.
    pub version: u32,

    /// Opaque session credential; empty until the first login.
    pub session_credential: String,

    /// Highest message identifier folded into the totals.
    pub last_processed_id: i64,

    /// Cumulative count per user.
    pub totals: UserTotals,

    /// Cumulative count per user and month.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub monthly: MonthlyTotals,
}

/// On-disk layout as read, including the keys older files used.
///
/// When a file carries both an old and a current key, the current one wins.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredState {
    #[serde(default = "legacy_version")]
    version: u32,
    session_credential: Option<String>,
    session_string: Option<String>,
    last_processed_id: Option<i64>,
    last_offset_id: Option<i64>,
    #[serde(default)]
    totals: UserTotals,
    #[serde(default)]
    monthly: MonthlyTotals,
}

impl From<StoredState> for TallyState {
    fn from(stored: StoredState) -> Self {
        Self {
            version: stored.version,
            session_credential: stored
                .session_credential
                .or(stored.session_string)
                .unwrap_or_default(),
            last_processed_id: stored
                .last_processed_id
                .or(stored.last_offset_id)
                .unwrap_or_default(),
            totals: stored.totals,
            monthly: stored.monthly,
        }
    }
}

fn legacy_version() -> u32 {
    LEGACY_VERSION
}

impl Default for TallyState {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            session_credential: String::new(),
            last_processed_id: 0,
            totals: UserTotals::new(),
            monthly: MonthlyTotals::new(),
        }
    }
}

/// A user whose monthly subtotals do not add up to their total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inconsistency {
    pub user: String,
    pub total: u64,
    pub monthly_sum: u64,
}

impl TallyState {
    /// Loads state from a JSON file, returns default state if the file does not exist.
    ///
    /// A file that exists but cannot be parsed is an error; it is never
    /// silently replaced by an empty state.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let path = path.as_ref();

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting fresh", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(StateError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut state: Self = serde_json::from_str(&content).map_err(|source| StateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        match state.version {
            LEGACY_VERSION => {
                debug!("Migrating unversioned state file {}", path.display());
                state.version = SCHEMA_VERSION;
            }
            SCHEMA_VERSION => {}
            found => {
                return Err(StateError::UnsupportedVersion {
                    path: path.to_path_buf(),
                    found,
                    supported: SCHEMA_VERSION,
                });
            }
        }

        Ok(state)
    }

    /// Saves state to a JSON file.
    ///
    /// The document is written to a sibling temporary file first and then
    /// renamed over the destination, so readers never observe a torn file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StateError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        let temp = temp_path(path);

        std::fs::write(&temp, json).map_err(|source| StateError::Write {
            path: temp.clone(),
            source,
        })?;
        std::fs::rename(&temp, path).map_err(|source| StateError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(
            "Saved state to {} (watermark {})",
            path.display(),
            self.last_processed_id
        );
        Ok(())
    }

    /// Whether a session credential has been stored.
    #[must_use]
    pub fn has_credential(&self) -> bool {
        !self.session_credential.trim().is_empty()
    }

    /// Decides whether this run keeps per-month subtotals and brings the
    /// state in line with that decision.
    ///
    /// A file that already has monthly data keeps being tracked monthly even
    /// when `requested` is false. Whenever tracking is on, any part of a
    /// user's total not covered by their months (counts from a totals-only
    /// file) is booked under [`UNKNOWN_MONTH`], so subtotals always add up.
    pub fn settle_monthly_mode(&mut self, requested: bool) -> bool {
        let track = requested || !self.monthly.is_empty();
        if !requested && track {
            warn!("State already holds monthly subtotals; keeping monthly tracking on");
        }
        if !track {
            return false;
        }

        for (user, total) in &self.totals {
            let months = self.monthly.entry(user.clone()).or_default();
            let covered = months.values().fold(0, |acc: u64, v| acc.saturating_add(*v));
            if let Some(gap) = total.checked_sub(covered).filter(|gap| *gap > 0) {
                debug!("Booking {} earlier push-ups of {} under {}", gap, user, UNKNOWN_MONTH);
                let bucket = months.entry(UNKNOWN_MONTH.to_owned()).or_insert(0);
                *bucket = bucket.saturating_add(gap);
            }
        }
        self.monthly.retain(|_, months| !months.is_empty());

        true
    }

    /// Sum of all users' totals.
    #[must_use]
    pub fn grand_total(&self) -> u64 {
        self.totals.values().fold(0, |acc, v| acc.saturating_add(*v))
    }

    /// Returns every user whose monthly subtotals disagree with their total.
    ///
    /// A state without any monthly data is trivially consistent.
    #[must_use]
    pub fn check_consistency(&self) -> Vec<Inconsistency> {
        if self.monthly.is_empty() {
            return Vec::new();
        }

        let mut users: Vec<&String> = self.totals.keys().chain(self.monthly.keys()).collect();
        users.sort();
        users.dedup();

        users
            .into_iter()
            .filter_map(|user| {
                let total = self.totals.get(user).copied().unwrap_or(0);
                let monthly_sum = self
                    .monthly
                    .get(user)
                    .map_or(0, |months| months.values().fold(0, |acc: u64, v| acc.saturating_add(*v)));
                (total != monthly_sum).then(|| Inconsistency {
                    user: user.clone(),
                    total,
                    monthly_sum,
                })
            })
            .collect()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsStr::to_os_string).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
