use std::io;
use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::error::RejectReason;
use crate::runtime::trim_trailing_newline;

/// Result of one edit attempt. `Inconclusive` means the kernel accepted
/// the write but the re-read did not echo the requested value back — it
/// may have normalized or clamped it, or the file became unreadable. That
/// is surfaced as-is, never treated as success or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Applied {
        observed: String,
    },
    Rejected {
        reason: RejectReason,
    },
    Inconclusive {
        requested: String,
        observed: Option<String>,
    },
}

/// Writes an already-validated value to a live parameter file and re-reads
/// it to confirm. The handle is scoped so it is released on every exit
/// path. Truncation is requested on open: sysfs ignores it, regular files
/// (tests, fixtures) need it so a short value fully replaces a longer one.
pub async fn apply_edit(path: &Path, normalized: &str) -> EditOutcome {
    let mut file = match tokio::fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .await
    {
        Ok(file) => file,
        Err(err) => return rejected(path, &err),
    };
    if let Err(err) = file.write_all(normalized.as_bytes()).await {
        return rejected(path, &err);
    }
    // The kernel's setter can also reject the value at flush time (EINVAL
    // and friends surface from the underlying write).
    if let Err(err) = file.flush().await {
        return rejected(path, &err);
    }
    drop(file);

    let observed = match tokio::fs::read(path).await {
        Ok(bytes) => {
            let raw = String::from_utf8_lossy(&bytes);
            Some(trim_trailing_newline(&raw).to_string())
        }
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "confirmation read failed");
            None
        }
    };
    verdict(normalized, observed)
}

/// Compares the requested value against what the kernel reports back,
/// using the same trim rule as the runtime reader.
pub(crate) fn verdict(requested: &str, observed: Option<String>) -> EditOutcome {
    match observed {
        Some(observed) if observed == requested => EditOutcome::Applied { observed },
        observed => EditOutcome::Inconclusive {
            requested: requested.to_string(),
            observed,
        },
    }
}

fn rejected(path: &Path, err: &io::Error) -> EditOutcome {
    let reason = match err.kind() {
        io::ErrorKind::NotFound => RejectReason::NotFoundDuringWrite,
        io::ErrorKind::PermissionDenied => RejectReason::WriteDenied,
        _ => RejectReason::WriteFailed(err.to_string()),
    };
    tracing::debug!(path = %path.display(), error = %err, reason = %reason, "edit write rejected");
    EditOutcome::Rejected { reason }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn applied_when_the_file_echoes_the_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("level");
        fs::write(&path, "100\n").expect("seed");

        let outcome = apply_edit(&path, "5").await;
        assert_eq!(
            outcome,
            EditOutcome::Applied {
                observed: "5".into()
            }
        );
        // The shorter value fully replaces the longer one.
        assert_eq!(fs::read_to_string(&path).expect("read back"), "5");
    }

    #[tokio::test]
    async fn vanished_file_is_not_found_during_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outcome = apply_edit(&dir.path().join("gone"), "5").await;
        assert_eq!(
            outcome,
            EditOutcome::Rejected {
                reason: RejectReason::NotFoundDuringWrite
            }
        );
    }

    #[test]
    fn verdict_trusts_only_an_exact_echo() {
        assert_eq!(
            verdict("5", Some("5".into())),
            EditOutcome::Applied {
                observed: "5".into()
            }
        );
        assert_eq!(
            verdict("99", Some("10".into())),
            EditOutcome::Inconclusive {
                requested: "99".into(),
                observed: Some("10".into()),
            }
        );
        assert_eq!(
            verdict("5", None),
            EditOutcome::Inconclusive {
                requested: "5".into(),
                observed: None,
            }
        );
    }

    #[test]
    fn write_errors_classify_by_kind() {
        let path = Path::new("/sys/module/x/parameters/y");
        let denied = rejected(path, &io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(
            denied,
            EditOutcome::Rejected {
                reason: RejectReason::WriteDenied
            }
        );
        let missing = rejected(path, &io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(
            missing,
            EditOutcome::Rejected {
                reason: RejectReason::NotFoundDuringWrite
            }
        );
        let other = rejected(path, &io::Error::from(io::ErrorKind::InvalidInput));
        assert!(matches!(
            other,
            EditOutcome::Rejected {
                reason: RejectReason::WriteFailed(_)
            }
        ));
    }
}
