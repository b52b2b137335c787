use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::types::PermissionClass;
use crate::types::RuntimeState;

/// One live parameter as read from sysfs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeParam {
    pub name: String,
    pub state: RuntimeState,
}

/// Result of reading one module's live parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleRuntime {
    /// The module directory itself is gone: unloaded between the registry
    /// scan and this read. The module drops out of the runtime portion of
    /// the snapshot.
    Vanished,
    /// The module is loaded; the vector may legitimately be empty for
    /// modules that expose no parameters.
    Present(Vec<RuntimeParam>),
}

/// Values are raw file content with exactly one trailing newline removed;
/// embedded whitespace is preserved.
pub(crate) fn trim_trailing_newline(raw: &str) -> &str {
    raw.strip_suffix('\n').unwrap_or(raw)
}

/// Turns one parameter file's read result into its runtime state. `None`
/// drops the entry (the file vanished between listing and reading); any
/// other failure keeps the entry with its permission class and no value
/// (write-only parameters, kernel read errors).
fn entry_state(
    module: &str,
    name: &str,
    permission: PermissionClass,
    result: std::io::Result<Vec<u8>>,
) -> Option<RuntimeState> {
    let value = match result {
        Ok(bytes) => {
            let raw = String::from_utf8_lossy(&bytes);
            Some(trim_trailing_newline(&raw).to_string())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            tracing::debug!(module, param = %name, error = %err, "parameter value unreadable");
            None
        }
    };
    Some(RuntimeState { value, permission })
}

/// Reads every live parameter of `module`. Failures below module
/// granularity degrade: a parameter file that vanishes mid-read is
/// omitted, an unreadable one keeps its permission class with no value.
pub async fn read_module_params(root: &Path, module: &str) -> ModuleRuntime {
    let params_dir = root.join(module).join("parameters");
    let mut dir = match tokio::fs::read_dir(&params_dir).await {
        Ok(dir) => dir,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            // No parameters directory is normal; a missing module
            // directory means the module was unloaded under us.
            return if tokio::fs::try_exists(root.join(module)).await.unwrap_or(false) {
                ModuleRuntime::Present(Vec::new())
            } else {
                ModuleRuntime::Vanished
            };
        }
        Err(err) => {
            tracing::warn!(module, error = %err, "parameters directory unreadable");
            return ModuleRuntime::Present(Vec::new());
        }
    };

    let mut params = Vec::new();
    loop {
        let entry = match dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(module, error = %err, "parameter listing aborted early");
                break;
            }
        };
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => {
                tracing::warn!(module, param = %name, error = %err, "parameter mode unreadable");
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        let permission = PermissionClass::from_mode(metadata.permissions().mode());
        let read = tokio::fs::read(entry.path()).await;
        let Some(state) = entry_state(module, &name, permission, read) else {
            continue;
        };
        params.push(RuntimeParam { name, state });
    }
    params.sort_by(|a, b| a.name.cmp(&b.name));
    ModuleRuntime::Present(params)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::*;

    fn write_param(dir: &Path, name: &str, contents: &str, mode: u32) {
        let path = dir.join(name);
        fs::write(&path, contents).expect("write param");
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).expect("chmod");
    }

    fn module_with_params(root: &Path, module: &str) -> std::path::PathBuf {
        let params = root.join(module).join("parameters");
        fs::create_dir_all(&params).expect("mkdir");
        params
    }

    #[tokio::test]
    async fn reads_values_and_classifies_permissions() {
        let root = tempfile::tempdir().expect("tempdir");
        let params = module_with_params(root.path(), "dummy");
        write_param(&params, "level", "3\n", 0o644);
        write_param(&params, "label", "steady\n", 0o444);

        let ModuleRuntime::Present(params) = read_module_params(root.path(), "dummy").await
        else {
            panic!("module is present");
        };
        assert_eq!(
            params,
            vec![
                RuntimeParam {
                    name: "label".into(),
                    state: RuntimeState {
                        value: Some("steady".into()),
                        permission: PermissionClass::ReadOnly,
                    },
                },
                RuntimeParam {
                    name: "level".into(),
                    state: RuntimeState {
                        value: Some("3".into()),
                        permission: PermissionClass::ReadWrite,
                    },
                },
            ]
        );
    }

    #[tokio::test]
    async fn trims_exactly_one_trailing_newline() {
        let root = tempfile::tempdir().expect("tempdir");
        let params = module_with_params(root.path(), "dummy");
        write_param(&params, "doubled", "text\n\n", 0o644);
        write_param(&params, "embedded", "a b\tc\n", 0o644);
        write_param(&params, "bare", "plain", 0o644);

        let ModuleRuntime::Present(params) = read_module_params(root.path(), "dummy").await
        else {
            panic!("module is present");
        };
        let values: Vec<Option<String>> =
            params.into_iter().map(|p| p.state.value).collect();
        assert_eq!(
            values,
            vec![
                Some("plain".into()),
                Some("text\n".into()),
                Some("a b\tc".into()),
            ]
        );
    }

    #[tokio::test]
    async fn module_without_parameters_dir_is_present_and_empty() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::create_dir(root.path().join("bare_mod")).expect("mkdir");

        let result = read_module_params(root.path(), "bare_mod").await;
        assert_eq!(result, ModuleRuntime::Present(Vec::new()));
    }

    #[tokio::test]
    async fn missing_module_directory_reports_vanished() {
        let root = tempfile::tempdir().expect("tempdir");
        let result = read_module_params(root.path(), "gone_mod").await;
        assert_eq!(result, ModuleRuntime::Vanished);
    }

    #[test]
    fn read_failure_keeps_the_entry_without_a_value() {
        // Write-only parameters and kernel read errors keep the entry;
        // the permission class read from the mode bits still stands, only
        // the value is absent.
        let err = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(
            entry_state("dummy", "secret", PermissionClass::ReadWrite, Err(err)),
            Some(RuntimeState {
                value: None,
                permission: PermissionClass::ReadWrite,
            })
        );
    }

    #[test]
    fn vanished_file_drops_the_entry() {
        let err = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(
            entry_state("dummy", "gone", PermissionClass::ReadWrite, Err(err)),
            None
        );
    }

    #[test]
    fn successful_read_trims_and_keeps_content() {
        assert_eq!(
            entry_state("dummy", "level", PermissionClass::ReadOnly, Ok(b"3\n".to_vec())),
            Some(RuntimeState {
                value: Some("3".into()),
                permission: PermissionClass::ReadOnly,
            })
        );
    }

    #[test]
    fn newline_trim_is_single_shot() {
        assert_eq!(trim_trailing_newline("v\n"), "v");
        assert_eq!(trim_trailing_newline("v\n\n"), "v\n");
        assert_eq!(trim_trailing_newline("v"), "v");
        assert_eq!(trim_trailing_newline(""), "");
    }
}
