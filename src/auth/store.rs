//! Durable per-profile credential storage.
//!
//! One JSON file per profile under an owner-only directory. Writes go
//! through a temp file in the same directory followed by an atomic rename,
//! so concurrent readers only ever observe a fully-old or fully-new record.
//! Rotated-refresh-token write-backs additionally take a per-profile
//! directory lock (see [`ProfileStore::lock_profile`]) to serialize the
//! read-modify-write across CLI invocations.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::error::{Error, Result};

/// Locks older than this are assumed abandoned and force-cleared.
const LOCK_STALE_SECS: u64 = 30;

/// How long to wait on a contended lock before giving up.
const LOCK_WAIT: Duration = Duration::from_secs(5);

const LOCK_POLL: Duration = Duration::from_millis(100);

/// A persisted identity context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Tenant ID, or the literal `"common"` until a login resolves it.
    pub tenant_id: String,
    /// Opaque refresh token. Sensitive.
    pub refresh_token: String,
    /// User principal, display-only.
    #[serde(default)]
    pub user: String,
    /// When the refresh token was acquired.
    pub acquired_at: DateTime<Utc>,
}

/// File-backed CRUD over [`ProfileRecord`]s.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    /// Store rooted at the default profile directory
    /// (`~/.config/ppctl/profiles`).
    pub fn open_default() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::storage("no user config directory"))?
            .join("ppctl")
            .join("profiles");
        Self::open(dir)
    }

    /// Store rooted at an explicit directory. Creates it (owner-only) if
    /// missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        restrict_permissions(&dir, 0o700)?;
        Ok(Self { dir })
    }

    /// Overwrite the record for `profile`. Never partially visible.
    pub fn write(&self, profile: &str, record: &ProfileRecord) -> Result<()> {
        let json = serde_json::to_vec_pretty(record)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| Error::storage(format!("temp file for profile write: {e}")))?;
        tmp.write_all(&json)?;
        restrict_permissions(tmp.path(), 0o600)?;
        tmp.persist(self.profile_path(profile))
            .map_err(|e| Error::storage(format!("persisting profile {profile}: {e}")))?;

        tracing::debug!(profile, "profile record written");
        Ok(())
    }

    /// Read the record for `profile`.
    ///
    /// Absence is a normal state ("not logged in"), so missing or unreadable
    /// records come back as `None` rather than an error.
    pub fn read(&self, profile: &str) -> Option<ProfileRecord> {
        let path = self.profile_path(profile);
        let contents = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(profile, error = %e, "unreadable profile record, treating as absent");
                None
            }
        }
    }

    /// Remove the record for `profile`. Idempotent.
    pub fn delete(&self, profile: &str) -> Result<()> {
        match std::fs::remove_file(self.profile_path(profile)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// True iff a record with a non-empty refresh token is present.
    ///
    /// A liveness probe only; it does not validate the token server-side.
    pub fn exists(&self, profile: &str) -> bool {
        self.read(profile)
            .map(|r| !r.refresh_token.is_empty())
            .unwrap_or(false)
    }

    /// Acquire the per-profile mutex used to serialize refresh-token
    /// rotation write-backs across processes.
    ///
    /// Directory creation is atomic on every platform, so the lock is a
    /// `<profile>.lock` directory. A lock older than [`LOCK_STALE_SECS`] is
    /// force-cleared on the assumption its owner died.
    pub fn lock_profile(&self, profile: &str) -> Result<ProfileLock> {
        let path = self.dir.join(format!("{profile}.lock"));
        let deadline = std::time::Instant::now() + LOCK_WAIT;

        loop {
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok(ProfileLock { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        tracing::warn!(profile, "clearing stale profile lock");
                        let _ = std::fs::remove_dir(&path);
                        continue;
                    }
                    if std::time::Instant::now() >= deadline {
                        return Err(Error::storage(format!(
                            "profile {profile} is locked by another process"
                        )));
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn profile_path(&self, profile: &str) -> PathBuf {
        self.dir.join(format!("{profile}.json"))
    }
}

/// Held lock on one profile's storage. Released on drop.
#[derive(Debug)]
pub struct ProfileLock {
    path: PathBuf,
}

impl Drop for ProfileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir(&self.path);
    }
}

fn lock_is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .map(|age| age.as_secs() > LOCK_STALE_SECS)
        .unwrap_or(false)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<()> {
    // Windows ACLs default to owner access for files under the user profile.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(refresh: &str) -> ProfileRecord {
        ProfileRecord {
            tenant_id: "tenant-x".into(),
            refresh_token: refresh.into(),
            user: "a@b.com".into(),
            acquired_at: Utc::now(),
        }
    }

    fn temp_store() -> (tempfile::TempDir, ProfileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("profiles")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (_dir, store) = temp_store();
        store.write("dev", &record("RT1")).unwrap();

        let loaded = store.read("dev").expect("record present");
        assert_eq!(loaded.tenant_id, "tenant-x");
        assert_eq!(loaded.refresh_token, "RT1");
        assert_eq!(loaded.user, "a@b.com");
    }

    #[test]
    fn test_read_missing_is_none() {
        let (_dir, store) = temp_store();
        assert!(store.read("nope").is_none());
        assert!(!store.exists("nope"));
    }

    #[test]
    fn test_corrupt_record_degrades_to_absent() {
        let (_dir, store) = temp_store();
        std::fs::write(store.dir.join("bad.json"), "{not json").unwrap();
        assert!(store.read("bad").is_none());
    }

    #[test]
    fn test_delete_idempotent() {
        let (_dir, store) = temp_store();
        store.write("dev", &record("RT1")).unwrap();
        store.delete("dev").unwrap();
        assert!(!store.exists("dev"));
        // Second delete of an absent record is fine.
        store.delete("dev").unwrap();
    }

    #[test]
    fn test_exists_requires_refresh_token() {
        let (_dir, store) = temp_store();
        store.write("empty", &record("")).unwrap();
        assert!(!store.exists("empty"));
        store.write("full", &record("RT")).unwrap();
        assert!(store.exists("full"));
    }

    #[test]
    fn test_overwrite_replaces() {
        let (_dir, store) = temp_store();
        store.write("dev", &record("OLD")).unwrap();
        store.write("dev", &record("NEW")).unwrap();
        assert_eq!(store.read("dev").unwrap().refresh_token, "NEW");
    }

    #[cfg(unix)]
    #[test]
    fn test_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = temp_store();
        store.write("dev", &record("RT1")).unwrap();

        let dir_mode = std::fs::metadata(&store.dir).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);

        let file_mode = std::fs::metadata(store.dir.join("dev.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(file_mode & 0o777, 0o600);
    }

    #[test]
    fn test_lock_blocks_second_acquirer() {
        let (_dir, store) = temp_store();
        let guard = store.lock_profile("dev").unwrap();

        // Contended acquire times out. Use a clone to mimic a second process.
        let store2 = store.clone();
        let contender = std::thread::spawn(move || store2.lock_profile("dev").is_err());
        assert!(contender.join().unwrap());

        drop(guard);
        // Released: acquirable again.
        let _guard = store.lock_profile("dev").unwrap();
    }

    #[test]
    fn test_stale_lock_is_cleared() {
        let (_dir, store) = temp_store();
        let lock_path = store.dir.join("dev.lock");
        std::fs::create_dir(&lock_path).unwrap();

        // Backdate the lock well past the staleness horizon.
        let stale = std::time::SystemTime::now() - Duration::from_secs(LOCK_STALE_SECS + 10);
        let f = std::fs::File::open(&lock_path).unwrap();
        f.set_modified(stale).unwrap();

        let _guard = store.lock_profile("dev").expect("stale lock force-cleared");
    }
}
