use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;

use crate::error::MetadataError;
use crate::metadata::ParamMetadata;
use crate::modprobe::ConfigScan;
use crate::runtime::RuntimeParam;
use crate::snapshot::ModuleRecord;
use crate::snapshot::ParamRecord;
use crate::snapshot::Snapshot;

/// Everything a refresh gathered, handed to [`merge`] once all fan-out
/// workers have finished. `runtime` holds only modules still present at
/// read time; `metadata` holds one fetch result per present module.
pub struct RefreshInputs {
    pub runtime: BTreeMap<String, Vec<RuntimeParam>>,
    pub metadata: BTreeMap<String, Result<BTreeMap<String, ParamMetadata>, MetadataError>>,
    pub config: ConfigScan,
    pub captured_at: DateTime<Utc>,
}

/// Merges the three sources into one snapshot. Pure: no I/O, no clock
/// reads, deterministic output for identical inputs. The record set is the
/// union of live parameters and persistently configured pairs; metadata
/// only ever enriches records, it never creates them. The version is left
/// at zero for the store to stamp at install time.
pub fn merge(inputs: RefreshInputs) -> Snapshot {
    let mut modules: BTreeMap<String, ModuleRecord> = BTreeMap::new();

    for (module, params) in &inputs.runtime {
        let (metadata, warning) = match inputs.metadata.get(module) {
            Some(Ok(map)) => (Some(map), None),
            Some(Err(err)) => (None, Some(err.to_string())),
            None => (None, None),
        };
        if let Some(warning) = &warning {
            tracing::warn!(module, warning, "metadata degraded to empty mapping");
        }
        let mut records = BTreeMap::new();
        for param in params {
            let shape = metadata.and_then(|map| map.get(&param.name));
            records.insert(
                param.name.clone(),
                ParamRecord {
                    module: module.clone(),
                    name: param.name.clone(),
                    runtime: Some(param.state.clone()),
                    declared_type: shape.map(|s| s.declared_type).unwrap_or_default(),
                    array: shape.map(|s| s.array).unwrap_or(false),
                    description: shape.and_then(|s| s.description.clone()),
                    persistent: Vec::new(),
                },
            );
        }
        modules.insert(
            module.clone(),
            ModuleRecord {
                name: module.clone(),
                loaded: true,
                metadata_warning: warning,
                params: records,
            },
        );
    }

    // Persistent entries extend the union: pairs for unloaded modules (or
    // parameters a loaded module does not expose) become records without
    // runtime state. Entry order within a record is scan order, so
    // provenance stays file-then-line sorted.
    for entry in inputs.config.entries {
        let module = modules
            .entry(entry.module.clone())
            .or_insert_with(|| ModuleRecord {
                name: entry.module.clone(),
                loaded: false,
                metadata_warning: None,
                params: BTreeMap::new(),
            });
        let shape = inputs
            .metadata
            .get(&entry.module)
            .and_then(|result| result.as_ref().ok())
            .and_then(|map| map.get(&entry.param));
        let record = module
            .params
            .entry(entry.param.clone())
            .or_insert_with(|| ParamRecord {
                module: entry.module.clone(),
                name: entry.param.clone(),
                runtime: None,
                declared_type: shape.map(|s| s.declared_type).unwrap_or_default(),
                array: shape.map(|s| s.array).unwrap_or(false),
                description: shape.and_then(|s| s.description.clone()),
                persistent: Vec::new(),
            });
        record.persistent.push(entry);
    }

    Snapshot {
        version: 0,
        captured_at: inputs.captured_at,
        modules,
        skipped_config_lines: inputs.config.skipped_lines,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::modprobe::ConfigEntry;
    use crate::types::ParameterType;
    use crate::types::PermissionClass;
    use crate::types::RuntimeState;

    fn live(name: &str, value: &str, permission: PermissionClass) -> RuntimeParam {
        RuntimeParam {
            name: name.to_string(),
            state: RuntimeState {
                value: Some(value.to_string()),
                permission,
            },
        }
    }

    fn conf(module: &str, param: &str, value: &str) -> ConfigEntry {
        ConfigEntry {
            file: "test.conf".to_string(),
            line: 1,
            module: module.to_string(),
            param: param.to_string(),
            value: value.to_string(),
            shadowed: false,
        }
    }

    fn inputs() -> RefreshInputs {
        RefreshInputs {
            runtime: BTreeMap::new(),
            metadata: BTreeMap::new(),
            config: ConfigScan::default(),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn unions_runtime_and_persistent_identities() {
        let mut input = inputs();
        input.runtime.insert(
            "dummy".into(),
            vec![live("level", "3", PermissionClass::ReadWrite)],
        );
        input.config.entries = vec![
            conf("dummy", "level", "7"),
            conf("dummy", "extra", "1"),
            conf("ghost", "tuning", "4,5"),
        ];

        let snapshot = merge(input);
        let names: Vec<String> = snapshot
            .parameters()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(names, vec!["dummy.extra", "dummy.level", "ghost.tuning"]);

        let dummy = snapshot.modules.get("dummy").expect("dummy module");
        assert!(dummy.loaded);
        let level = dummy.params.get("level").expect("level record");
        assert_eq!(
            level.runtime.as_ref().and_then(|r| r.value.as_deref()),
            Some("3")
        );
        assert_eq!(level.persistent.len(), 1);

        // Configured but not exposed at runtime: record without live state.
        let extra = dummy.params.get("extra").expect("extra record");
        assert!(extra.runtime.is_none());

        let ghost = snapshot.modules.get("ghost").expect("ghost module");
        assert!(!ghost.loaded);
        assert!(ghost.params.get("tuning").expect("tuning").runtime.is_none());
    }

    #[test]
    fn metadata_enriches_but_never_creates_records() {
        let mut input = inputs();
        input.runtime.insert(
            "dummy".into(),
            vec![live("level", "3", PermissionClass::ReadWrite)],
        );
        let mut shapes = BTreeMap::new();
        shapes.insert(
            "level".to_string(),
            ParamMetadata {
                description: Some("Verbosity level".into()),
                declared_type: ParameterType::Integer,
                array: false,
            },
        );
        shapes.insert(
            "phantom".to_string(),
            ParamMetadata {
                description: Some("Declared but not exposed".into()),
                declared_type: ParameterType::Integer,
                array: false,
            },
        );
        input.metadata.insert("dummy".into(), Ok(shapes));

        let snapshot = merge(input);
        let dummy = snapshot.modules.get("dummy").expect("dummy module");
        assert_eq!(dummy.params.len(), 1);
        let level = dummy.params.get("level").expect("level record");
        assert_eq!(level.declared_type, ParameterType::Integer);
        assert_eq!(level.description.as_deref(), Some("Verbosity level"));
        assert!(dummy.metadata_warning.is_none());
    }

    #[test]
    fn failed_metadata_becomes_a_module_warning() {
        let mut input = inputs();
        input.runtime.insert(
            "dummy".into(),
            vec![live("level", "3", PermissionClass::ReadWrite)],
        );
        input
            .metadata
            .insert("dummy".into(), Err(MetadataError::TimedOut { timeout_ms: 50 }));

        let snapshot = merge(input);
        let dummy = snapshot.modules.get("dummy").expect("dummy module");
        assert_eq!(
            dummy.metadata_warning.as_deref(),
            Some("metadata tool timed out after 50ms")
        );
        let level = dummy.params.get("level").expect("level record");
        assert_eq!(level.declared_type, ParameterType::Unknown);
        assert!(level.description.is_none());
    }

    #[test]
    fn carries_skipped_line_count() {
        let mut input = inputs();
        input.config.skipped_lines = 3;
        let snapshot = merge(input);
        assert_eq!(snapshot.skipped_config_lines, 3);
    }

    #[test]
    fn metadata_enriches_config_only_records_of_loaded_modules() {
        let mut input = inputs();
        input.runtime.insert("dummy".into(), Vec::new());
        let mut shapes = BTreeMap::new();
        shapes.insert(
            "burst".to_string(),
            ParamMetadata {
                description: Some("Burst budget".into()),
                declared_type: ParameterType::Integer,
                array: false,
            },
        );
        input.metadata.insert("dummy".into(), Ok(shapes));
        input.config.entries = vec![conf("dummy", "burst", "8")];

        let snapshot = merge(input);
        let burst = snapshot
            .modules
            .get("dummy")
            .and_then(|m| m.params.get("burst"))
            .expect("burst record");
        assert!(burst.runtime.is_none());
        assert_eq!(burst.declared_type, ParameterType::Integer);
        assert_eq!(burst.description.as_deref(), Some("Burst budget"));
    }
}
