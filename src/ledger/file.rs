use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use waypoint_common::{LedgerEntry, PendingDeployment};

use super::{MigrationLedger, check_environment, check_next, check_prefix};
use crate::errors::LedgerError;

/// On-disk shape of `<environment>.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    environment: String,
    entries: Vec<LedgerEntry>,
}

/// Ledger stored as one JSON document per environment.
///
/// Writes go to a temporary file in the same directory which is fsynced and
/// then renamed over the previous document, so a reader sees either the old
/// ledger or the new one and never a partial write.
pub struct FileLedger {
    dir: PathBuf,
}

impl FileLedger {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ledger_path(&self, environment: &str) -> PathBuf {
        self.dir.join(format!("{}.json", environment))
    }

    fn pending_path(&self, environment: &str) -> PathBuf {
        self.dir.join(format!("{}.pending.json", environment))
    }

    fn read_document(&self, environment: &str) -> Result<LedgerDocument, LedgerError> {
        let path = self.ledger_path(environment);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LedgerDocument {
                    environment: environment.to_string(),
                    entries: Vec::new(),
                });
            }
            Err(source) => return Err(LedgerError::Read { path, source }),
        };
        let document: LedgerDocument = serde_json::from_str(&content)
            .map_err(|source| LedgerError::Corrupt { path, source })?;
        check_prefix(environment, &document.entries)?;
        Ok(document)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
        let write_err = |source: std::io::Error| LedgerError::Write {
            path: path.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        tmp.write_all(bytes).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        sync_dir(&self.dir).map_err(write_err)?;
        Ok(())
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

fn to_json<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>, LedgerError> {
    serde_json::to_vec_pretty(value).map_err(|source| LedgerError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

impl MigrationLedger for FileLedger {
    fn entries(&self, environment: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        check_environment(environment)?;
        Ok(self.read_document(environment)?.entries)
    }

    fn record_applied(&self, environment: &str, entry: LedgerEntry) -> Result<(), LedgerError> {
        check_environment(environment)?;
        let mut document = self.read_document(environment)?;
        check_next(environment, &document.entries, &entry)?;

        let sequence = entry.sequence;
        document.entries.push(entry);
        let path = self.ledger_path(environment);
        self.write_atomic(&path, &to_json(&path, &document)?)?;

        tracing::debug!(environment, sequence, path = %path.display(), "Ledger entry recorded");
        Ok(())
    }

    fn pending(&self, environment: &str) -> Result<Option<PendingDeployment>, LedgerError> {
        check_environment(environment)?;
        let path = self.pending_path(environment);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(LedgerError::Read { path, source }),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| LedgerError::Corrupt { path, source })
    }

    fn set_pending(
        &self,
        environment: &str,
        pending: &PendingDeployment,
    ) -> Result<(), LedgerError> {
        check_environment(environment)?;
        let path = self.pending_path(environment);
        self.write_atomic(&path, &to_json(&path, pending)?)
    }

    fn clear_pending(&self, environment: &str) -> Result<(), LedgerError> {
        check_environment(environment)?;
        let path = self.pending_path(environment);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LedgerError::Write { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_ledger() -> (FileLedger, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (FileLedger::new(dir.path().join("ledger")), dir)
    }

    #[test]
    fn test_new_environment_is_empty() {
        let (ledger, _dir) = make_ledger();
        assert!(ledger.list_applied("development").unwrap().is_empty());
        assert!(ledger.pending("development").unwrap().is_none());
    }

    #[test]
    fn test_record_and_list_roundtrip() {
        let (ledger, _dir) = make_ledger();
        ledger
            .record_applied("development", LedgerEntry::new(1, "token", "0xaaa"))
            .unwrap();
        ledger
            .record_applied(
                "development",
                LedgerEntry::new(2, "shop", "0xbbb").with_receipt("0xtx"),
            )
            .unwrap();

        assert_eq!(ledger.list_applied("development").unwrap(), vec![1, 2]);
        let entries = ledger.entries("development").unwrap();
        assert_eq!(entries[1].result_ref, "0xbbb");
        assert_eq!(entries[1].receipt_id.as_deref(), Some("0xtx"));
    }

    #[test]
    fn test_out_of_order_append_is_rejected_and_leaves_ledger_untouched() {
        let (ledger, _dir) = make_ledger();
        ledger
            .record_applied("development", LedgerEntry::new(1, "a", "0x1"))
            .unwrap();

        let err = ledger
            .record_applied("development", LedgerEntry::new(3, "c", "0x3"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::SequenceViolation { .. }));

        let dup = ledger
            .record_applied("development", LedgerEntry::new(1, "a", "0x1"))
            .unwrap_err();
        assert!(matches!(dup, LedgerError::SequenceViolation { .. }));

        assert_eq!(ledger.list_applied("development").unwrap(), vec![1]);
    }

    #[test]
    fn test_environments_are_isolated() {
        let (ledger, _dir) = make_ledger();
        ledger
            .record_applied("alpha", LedgerEntry::new(1, "a", "0x1"))
            .unwrap();
        assert!(ledger.list_applied("beta").unwrap().is_empty());
        assert!(!ledger.dir().join("beta.json").exists());
    }

    #[test]
    fn test_recovery_after_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger");
        {
            let ledger = FileLedger::new(path.clone());
            ledger
                .record_applied("development", LedgerEntry::new(1, "a", "0x1"))
                .unwrap();
        }
        let ledger = FileLedger::new(path);
        assert_eq!(ledger.list_applied("development").unwrap(), vec![1]);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (ledger, _dir) = make_ledger();
        ledger
            .record_applied("development", LedgerEntry::new(1, "a", "0x1"))
            .unwrap();
        let files: Vec<_> = std::fs::read_dir(ledger.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(files, vec!["development.json".to_string()]);
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let (ledger, _dir) = make_ledger();
        std::fs::create_dir_all(ledger.dir()).unwrap();
        std::fs::write(ledger.dir().join("development.json"), "{ not json").unwrap();
        assert!(matches!(
            ledger.entries("development"),
            Err(LedgerError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_tampered_gap_is_a_sequence_violation() {
        let (ledger, _dir) = make_ledger();
        std::fs::create_dir_all(ledger.dir()).unwrap();
        let doc = LedgerDocument {
            environment: "development".into(),
            entries: vec![LedgerEntry::new(1, "a", "0x1"), LedgerEntry::new(3, "c", "0x3")],
        };
        std::fs::write(
            ledger.dir().join("development.json"),
            serde_json::to_string(&doc).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            ledger.list_applied("development"),
            Err(LedgerError::SequenceViolation { .. })
        ));
    }

    #[test]
    fn test_pending_journal_roundtrip() {
        let (ledger, _dir) = make_ledger();
        let mut pending = PendingDeployment::new(1, "shop");
        ledger.set_pending("development", &pending).unwrap();
        assert!(ledger.pending("development").unwrap().unwrap().is_unknown());

        pending.receipt_id = Some("0xtx".into());
        ledger.set_pending("development", &pending).unwrap();
        assert_eq!(ledger.pending("development").unwrap(), Some(pending));

        ledger.clear_pending("development").unwrap();
        assert!(ledger.pending("development").unwrap().is_none());
        ledger.clear_pending("development").unwrap();
    }

    #[test]
    fn test_invalid_environment_name_is_rejected() {
        let (ledger, _dir) = make_ledger();
        assert!(matches!(
            ledger.entries("../escape"),
            Err(LedgerError::InvalidEnvironment(_))
        ));
    }
}
