//! Cross-process frequency guard backed by a shared JSON file.
//!
//! The [`FrequencyGuard`] stops one logical operation (a *guard key*, e.g.
//! provider + input) from repeating within a fixed ten minute window, across
//! every process that shares the state file.
//!
//! # State file
//!
//! A flat JSON object mapping guard keys to UNIX timestamps (seconds), stored
//! at a fixed path under the platform temp directory. The whole
//! read-decide-write sequence runs under one exclusive advisory lock.
//!
//! # Failure policy
//!
//! The guard is advisory and fails open: if the file cannot be opened,
//! locked, parsed or written, the call is allowed and a warning is logged.
//! The lock is polled for about a second; a holder that never releases it
//! cannot stall callers.
//! Two processes may both pass while the file is unreadable; that window is
//! accepted.
//!
//! # Eviction
//!
//! When the map holds 30 or more entries the whole map is discarded before
//! the new key is recorded. This is coarse (an LRU would keep recent keys),
//! but it is the established behavior and other tools read the same file.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::{DISABLE_THIRD_API_ENV, env_flag};

/// Cooldown window for one guard key.
pub const GUARD_WINDOW: Duration = Duration::from_secs(600);

/// Map size at which the persisted state is reset.
pub const MAX_GUARD_ENTRIES: usize = 30;

/// Non-blocking lock attempts before the guard fails open.
const LOCK_ATTEMPTS: u32 = 50;

/// Pause between lock attempts.
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(20);

/// File name of the shared state under the temp directory.
pub const GUARD_FILE_NAME: &str = "third_api_frequency_guard.json";

/// Reasons the guard denies a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// The key was used within the cooldown window
    #[error("'{key}' was called too frequently; retry in {retry_in_secs}s")]
    TooFrequent {
        /// The denied guard key
        key: String,
        /// Seconds until the cooldown expires
        retry_in_secs: u64,
    },

    /// The global kill switch is set
    #[error("third-party API calls are disabled")]
    Disabled,
}

/// File-backed, key-scoped cooldown gate.
#[derive(Debug, Clone)]
pub struct FrequencyGuard {
    path: PathBuf,
    disabled: bool,
    window: Duration,
}

impl Default for FrequencyGuard {
    fn default() -> Self {
        Self::new(default_guard_path())
    }
}

impl FrequencyGuard {
    /// Creates a guard using the given state file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            disabled: false,
            window: GUARD_WINDOW,
        }
    }

    /// Sets the configuration kill switch.
    #[must_use]
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Returns the state file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the kill switch is set in configuration or environment.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled || env_flag(DISABLE_THIRD_API_ENV)
    }

    /// Checks and records `key` at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Disabled`] when the kill switch is set and
    /// [`GuardError::TooFrequent`] when `key` is still cooling down.
    pub fn check(&self, key: &str) -> Result<(), GuardError> {
        self.check_at(key, unix_now())
    }

    /// Checks and records `key` as if the current time were `now` (UNIX seconds).
    ///
    /// A denied call leaves the stored timestamp untouched, so repeated denied
    /// attempts never extend the cooldown.
    ///
    /// # Errors
    ///
    /// Same as [`FrequencyGuard::check`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn check_at(&self, key: &str, now: u64) -> Result<(), GuardError> {
        if self.is_disabled() {
            return Err(GuardError::Disabled);
        }

        let file = match open_state_file(&self.path) {
            Ok(file) => file,
            Err(error) => {
                warn!(error = %error, "cannot open guard state; allowing call");
                return Ok(());
            }
        };

        if let Err(error) = lock_with_retry(&file, <File as FileExt>::try_lock_exclusive) {
            warn!(error = %error, "cannot lock guard state; allowing call");
            return Ok(());
        }

        let result = self.check_locked(&file, key, now);

        if let Err(error) = FileExt::unlock(&file) {
            debug!(error = %error, "guard unlock failed; lock released on close");
        }
        result
    }

    /// Async wrapper running the locked section on the blocking pool.
    ///
    /// # Errors
    ///
    /// Same as [`FrequencyGuard::check`].
    pub async fn check_async(&self, key: String) -> Result<(), GuardError> {
        let guard = self.clone();
        match tokio::task::spawn_blocking(move || guard.check(&key)).await {
            Ok(result) => result,
            Err(error) => {
                warn!(error = %error, "guard task failed; allowing call");
                Ok(())
            }
        }
    }

    /// Reads the persisted records without locking for write.
    ///
    /// Unreadable or corrupt state reads as empty.
    #[must_use]
    pub fn records(&self) -> BTreeMap<String, u64> {
        let Ok(mut file) = File::open(&self.path) else {
            return BTreeMap::new();
        };
        if let Err(error) = lock_with_retry(&file, <File as FileExt>::try_lock_shared) {
            warn!(error = %error, "cannot lock guard state; reading as empty");
            return BTreeMap::new();
        }
        let records = read_records(&mut file);
        let _ = FileExt::unlock(&file);
        records
    }

    fn check_locked(&self, file: &File, key: &str, now: u64) -> Result<(), GuardError> {
        let mut handle = file;
        let mut records = read_records(&mut handle);

        if let Some(last) = records.get(key) {
            let elapsed = now.saturating_sub(*last);
            let window = self.window.as_secs();
            if elapsed < window {
                debug!(key, elapsed, "guard key still cooling down");
                return Err(GuardError::TooFrequent {
                    key: key.to_string(),
                    retry_in_secs: window - elapsed,
                });
            }
        }

        if records.len() >= MAX_GUARD_ENTRIES {
            debug!(entries = records.len(), "guard state full; resetting");
            records.clear();
        }
        records.insert(key.to_string(), now);

        if let Err(error) = write_records(&mut handle, &records) {
            warn!(error = %error, "cannot persist guard state; allowing call");
        }
        Ok(())
    }
}

/// Builds the guard key for one call site: `{namespace}-{api}-{input}`.
#[must_use]
pub fn guard_key(namespace: &str, api: &str, input: &str) -> String {
    format!("{namespace}-{api}-{input}")
}

/// Returns the shared state path under the platform temp directory.
#[must_use]
pub fn default_guard_path() -> PathBuf {
    std::env::temp_dir().join(GUARD_FILE_NAME)
}

fn open_state_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

/// Polls a non-blocking lock so a stuck holder cannot stall callers.
fn lock_with_retry(
    file: &File,
    try_lock: fn(&File) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let mut attempt = 1;
    loop {
        match try_lock(file) {
            Ok(()) => return Ok(()),
            Err(error) if attempt >= LOCK_ATTEMPTS => return Err(error),
            Err(error) => {
                if error.kind() != fs2::lock_contended_error().kind() {
                    return Err(error);
                }
                std::thread::sleep(LOCK_RETRY_DELAY);
                attempt += 1;
            }
        }
    }
}

fn read_records<R: Read + Seek>(reader: &mut R) -> BTreeMap<String, u64> {
    let mut raw = String::new();
    if reader.seek(SeekFrom::Start(0)).is_err() || reader.read_to_string(&mut raw).is_err() {
        return BTreeMap::new();
    }
    if raw.trim().is_empty() {
        return BTreeMap::new();
    }
    serde_json::from_str(&raw).unwrap_or_else(|error| {
        warn!(error = %error, "guard state is corrupt; starting empty");
        BTreeMap::new()
    })
}

fn write_records(file: &mut &File, records: &BTreeMap<String, u64>) -> std::io::Result<()> {
    let body = serde_json::to_vec(records).map_err(std::io::Error::other)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&body)?;
    file.flush()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn guard_in(dir: &TempDir) -> FrequencyGuard {
        FrequencyGuard::new(dir.path().join(GUARD_FILE_NAME))
    }

    #[test]
    fn test_first_call_is_allowed_and_recorded() {
        let dir = TempDir::new().unwrap();
        let guard = guard_in(&dir);
        guard.check_at("ns-api-a", 1_000).unwrap();
        assert_eq!(guard.records().get("ns-api-a"), Some(&1_000));
    }

    #[test]
    fn test_second_call_within_window_is_denied_without_update() {
        let dir = TempDir::new().unwrap();
        let guard = guard_in(&dir);
        guard.check_at("k", 1_000).unwrap();

        let err = guard.check_at("k", 1_599).unwrap_err();
        assert_eq!(
            err,
            GuardError::TooFrequent {
                key: "k".to_string(),
                retry_in_secs: 1,
            }
        );
        assert_eq!(guard.records().get("k"), Some(&1_000), "timestamp unchanged");
    }

    #[test]
    fn test_call_after_window_is_allowed_and_updates() {
        let dir = TempDir::new().unwrap();
        let guard = guard_in(&dir);
        guard.check_at("k", 1_000).unwrap();
        guard.check_at("k", 1_600).unwrap();
        assert_eq!(guard.records().get("k"), Some(&1_600));
    }

    #[test]
    fn test_distinct_keys_are_independent() {
        let dir = TempDir::new().unwrap();
        let guard = guard_in(&dir);
        guard.check_at("a", 1_000).unwrap();
        guard.check_at("b", 1_001).unwrap();
        assert_eq!(guard.records().len(), 2);
    }

    #[test]
    fn test_full_map_resets_to_single_entry() {
        let dir = TempDir::new().unwrap();
        let guard = guard_in(&dir);
        for i in 0..MAX_GUARD_ENTRIES {
            guard.check_at(&format!("key-{i}"), 1_000).unwrap();
        }
        assert_eq!(guard.records().len(), MAX_GUARD_ENTRIES);

        guard.check_at("one-more", 1_000).unwrap();
        let records = guard.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records.get("one-more"), Some(&1_000));
    }

    #[test]
    fn test_corrupt_state_fails_open() {
        let dir = TempDir::new().unwrap();
        let guard = guard_in(&dir);
        std::fs::write(guard.path(), b"{not json").unwrap();

        guard.check_at("k", 1_000).unwrap();
        assert_eq!(guard.records().get("k"), Some(&1_000), "file recreated");
    }

    #[test]
    fn test_unopenable_path_fails_open() {
        let dir = TempDir::new().unwrap();
        let guard = FrequencyGuard::new(dir.path().join("missing-dir").join("state.json"));
        assert!(guard.check_at("k", 1_000).is_ok());
        assert!(guard.check_at("k", 1_001).is_ok(), "nothing recorded, still open");
    }

    #[test]
    fn test_disabled_guard_denies() {
        let dir = TempDir::new().unwrap();
        let guard = guard_in(&dir).with_disabled(true);
        assert_eq!(guard.check_at("k", 1_000), Err(GuardError::Disabled));
        assert!(guard.records().is_empty());
    }

    #[test]
    fn test_guard_key_format() {
        assert_eq!(
            guard_key("third_api", "snap_mutil_rapidapi", "https://a.com/v"),
            "third_api-snap_mutil_rapidapi-https://a.com/v"
        );
    }

    #[test]
    fn test_default_path_is_under_temp_dir() {
        let guard = FrequencyGuard::default();
        assert!(guard.path().starts_with(std::env::temp_dir()));
        assert!(guard.path().ends_with(GUARD_FILE_NAME));
    }

    #[test]
    fn test_lock_held_elsewhere_fails_open_within_bound() {
        let dir = TempDir::new().unwrap();
        let guard = guard_in(&dir);
        guard.check_at("k", 1_000).unwrap();

        let holder = File::open(guard.path()).unwrap();
        FileExt::lock_exclusive(&holder).unwrap();

        let started = std::time::Instant::now();
        assert!(guard.check_at("k", 1_001).is_ok(), "fails open while locked");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(guard.records().is_empty(), "shared read gives up too");

        FileExt::unlock(&holder).unwrap();
        assert!(guard.check_at("k", 1_002).is_err(), "record kept after unlock");
    }

    #[tokio::test]
    async fn test_check_async_matches_sync_semantics() {
        let dir = TempDir::new().unwrap();
        let guard = guard_in(&dir);
        guard.check_async("k".to_string()).await.unwrap();
        assert!(matches!(
            guard.check_async("k".to_string()).await,
            Err(GuardError::TooFrequent { .. })
        ));
    }
}
