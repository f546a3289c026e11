//! Filesystem-backed session store.
//!
//! One file per session under the state directory, named
//! `session:<session_id>`. File bodies are signed with the configured
//! session signing key; a bad signature reads the same as a missing
//! record. Every write lands in a temporary sibling first and is committed
//! by rename, so readers, the sweeper, and `destroy_all` only ever observe
//! whole records.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tracing::{debug, warn};
use ulid::Ulid;

use super::{SessionRecord, SessionStore, StoreError, SESSION_FILE_PREFIX};
use crate::auth::{now_unix, token::TokenSigner};

/// Bound on every filesystem operation; exceeding it is a transient
/// storage failure, not an authentication failure.
const IO_DEADLINE: Duration = Duration::from_secs(5);

pub struct FsSessionStore {
    dir: PathBuf,
    signer: TokenSigner,
    idle_timeout: u64,
    remember_lifetime: u64,
}

impl FsSessionStore {
    /// Open (and create if needed) the session directory.
    ///
    /// # Errors
    /// Returns an error when the directory cannot be created.
    pub fn open(
        dir: impl Into<PathBuf>,
        signer: TokenSigner,
        idle_timeout: u64,
        remember_lifetime: u64,
    ) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            signer,
            idle_timeout,
            remember_lifetime,
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{SESSION_FILE_PREFIX}{session_id}"))
    }

    /// Serialize, sign, and commit a record by rename.
    async fn write_record(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_vec(record)
            .map_err(|err| StoreError::Other(format!("failed to serialize session: {err}")))?;
        let sealed = self.signer.seal(&payload);
        let tmp = self.dir.join(format!(".tmp-{}", Ulid::new()));
        let path = self.session_path(&record.session_id);

        let result = deadline(async {
            fs::write(&tmp, sealed.as_bytes()).await?;
            fs::rename(&tmp, &path).await
        })
        .await;

        if result.is_err() {
            // Never leave a half-written temp file behind.
            let _ = fs::remove_file(&tmp).await;
        }
        result?;
        Ok(())
    }

    async fn read_record(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let path = self.session_path(session_id);
        let sealed = match deadline(fs::read_to_string(&path)).await {
            Ok(sealed) => sealed,
            Err(StoreError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(None)
            }
            Err(err) => return Err(err),
        };
        let Some(payload) = self.signer.open(&sealed) else {
            debug!(session_id, "Discarding session file with bad signature");
            return Ok(None);
        };
        match serde_json::from_slice::<SessionRecord>(&payload) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                debug!(session_id, "Discarding unparsable session file: {err}");
                Ok(None)
            }
        }
    }

    async fn remove_path(&self, path: &Path) -> Result<(), StoreError> {
        match deadline(fs::remove_file(path)).await {
            Ok(()) => Ok(()),
            // Another request or the sweeper got there first.
            Err(StoreError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[async_trait::async_trait]
impl SessionStore for FsSessionStore {
    async fn create(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.write_record(record).await
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let Some(record) = self.read_record(session_id).await? else {
            return Ok(None);
        };
        if record.is_expired(now_unix(), self.idle_timeout, self.remember_lifetime) {
            self.remove_path(&self.session_path(session_id)).await?;
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn touch(&self, session_id: &str) -> Result<bool, StoreError> {
        let Some(mut record) = self.load(session_id).await? else {
            return Ok(false);
        };
        record.last_seen_at_unix = now_unix();
        self.write_record(&record).await?;
        Ok(true)
    }

    async fn update(&self, record: &SessionRecord) -> Result<(), StoreError> {
        if self.read_record(&record.session_id).await?.is_none() {
            return Ok(());
        }
        self.write_record(record).await
    }

    async fn destroy(&self, session_id: &str) -> Result<(), StoreError> {
        self.remove_path(&self.session_path(session_id)).await
    }

    async fn destroy_all(&self) -> Result<(), StoreError> {
        let mut entries = deadline(fs::read_dir(&self.dir)).await?;
        while let Some(entry) = deadline(entries.next_entry()).await? {
            if file_name_has_prefix(&entry.file_name()) {
                self.remove_path(&entry.path()).await?;
            }
        }
        Ok(())
    }

    async fn sweep(&self, older_than: u64) -> Result<usize, StoreError> {
        let cutoff = std::time::SystemTime::now()
            .checked_sub(Duration::from_secs(older_than))
            .unwrap_or(std::time::UNIX_EPOCH);
        let mut removed = 0usize;

        let mut entries = deadline(fs::read_dir(&self.dir)).await?;
        while let Some(entry) = deadline(entries.next_entry()).await? {
            if !file_name_has_prefix(&entry.file_name()) {
                continue;
            }
            // mtime is a coarse filter only; contents are never read here.
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if modified < cutoff {
                match self.remove_path(&entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(err) => warn!("Failed to sweep session file: {err}"),
                }
            }
        }
        Ok(removed)
    }
}

fn file_name_has_prefix(name: &std::ffi::OsStr) -> bool {
    name.to_str()
        .is_some_and(|name| name.starts_with(SESSION_FILE_PREFIX))
}

async fn deadline<T>(
    fut: impl std::future::Future<Output = std::io::Result<T>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(IO_DEADLINE, fut).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => Err(StoreError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn signer() -> TokenSigner {
        TokenSigner::new(&SecretString::from(
            "an-integration-test-key-of-32-bytes!".to_string(),
        ))
    }

    fn open_store(dir: &Path) -> FsSessionStore {
        FsSessionStore::open(dir, signer(), 300, 3_600).expect("open store")
    }

    #[tokio::test]
    async fn create_then_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());
        let record = SessionRecord::issue(true).expect("issue");
        store.create(&record).await.expect("create");

        let loaded = store.load(&record.session_id).await.expect("load");
        assert_eq!(loaded, Some(record));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let record = SessionRecord::issue(false).expect("issue");
        open_store(dir.path())
            .create(&record)
            .await
            .expect("create");

        let reopened = open_store(dir.path());
        let loaded = reopened.load(&record.session_id).await.expect("load");
        assert_eq!(loaded, Some(record));
    }

    #[tokio::test]
    async fn tampered_file_reads_as_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());
        let record = SessionRecord::issue(false).expect("issue");
        store.create(&record).await.expect("create");

        let path = store.session_path(&record.session_id);
        let mut body = std::fs::read_to_string(&path).expect("read");
        body.insert(0, 'x');
        std::fs::write(&path, body).expect("write");

        assert_eq!(store.load(&record.session_id).await.expect("load"), None);
    }

    #[tokio::test]
    async fn wrong_signing_key_reads_as_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let record = SessionRecord::issue(false).expect("issue");
        open_store(dir.path())
            .create(&record)
            .await
            .expect("create");

        let other_key = TokenSigner::new(&SecretString::from(
            "a-different-signing-key-of-32-bytes!".to_string(),
        ));
        let store = FsSessionStore::open(dir.path(), other_key, 300, 3_600).expect("open");
        assert_eq!(store.load(&record.session_id).await.expect("load"), None);
    }

    #[tokio::test]
    async fn expired_record_is_deleted_on_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());
        let mut record = SessionRecord::issue(false).expect("issue");
        record.last_seen_at_unix = now_unix() - 10_000;
        store.create(&record).await.expect("create");

        assert_eq!(store.load(&record.session_id).await.expect("load"), None);
        assert!(!store.session_path(&record.session_id).exists());
    }

    #[tokio::test]
    async fn touch_missing_returns_false() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(!open_store(dir.path()).touch("absent").await.expect("touch"));
    }

    #[tokio::test]
    async fn destroy_all_only_removes_session_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());
        for _ in 0..3 {
            let record = SessionRecord::issue(false).expect("issue");
            store.create(&record).await.expect("create");
        }
        let unrelated = dir.path().join(".env.local");
        std::fs::write(&unrelated, "KEY=value\n").expect("write");

        store.destroy_all().await.expect("destroy_all");

        let leftover: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name())
            .collect();
        assert_eq!(leftover, vec![std::ffi::OsString::from(".env.local")]);
    }

    #[tokio::test]
    async fn sweep_respects_mtime_cutoff() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());
        let record = SessionRecord::issue(true).expect("issue");
        store.create(&record).await.expect("create");

        // Fresh files survive a one-hour cutoff but not a zero cutoff.
        assert_eq!(store.sweep(3_600).await.expect("sweep"), 0);
        assert_eq!(store.sweep(0).await.expect("sweep"), 1);
        assert_eq!(store.load(&record.session_id).await.expect("load"), None);
    }
}
