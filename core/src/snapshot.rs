use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use crate::modprobe::ConfigEntry;
use crate::types::ParamId;
use crate::types::ParameterType;
use crate::types::RuntimeState;

/// One parameter in the merged view: live state (when the module is
/// loaded), declared shape (when metadata produced one), and every
/// persistent assignment that targets it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamRecord {
    pub module: String,
    pub name: String,
    pub runtime: Option<RuntimeState>,
    pub declared_type: ParameterType,
    pub array: bool,
    pub description: Option<String>,
    pub persistent: Vec<ConfigEntry>,
}

impl ParamRecord {
    pub fn id(&self) -> ParamId {
        ParamId::new(&self.module, &self.name)
    }

    /// The persistent entry that actually applies under the configured
    /// precedence, if any.
    pub fn effective_persistent(&self) -> Option<&ConfigEntry> {
        self.persistent.iter().find(|entry| !entry.shadowed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleRecord {
    pub name: String,
    /// False for synthetic records that exist only because persistent
    /// configuration references the module.
    pub loaded: bool,
    /// Set when the metadata fetch for this module failed; the records
    /// below then carry no declared types or descriptions.
    pub metadata_warning: Option<String>,
    pub params: BTreeMap<String, ParamRecord>,
}

/// Immutable merged view of every known parameter. Replaced whole on
/// refresh or edit, never mutated in place; readers hold an `Arc` and keep
/// a consistent (possibly stale) view for as long as they like.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub version: u64,
    pub captured_at: DateTime<Utc>,
    pub modules: BTreeMap<String, ModuleRecord>,
    /// Config lines the last scan skipped as unrecognized or malformed.
    pub skipped_config_lines: usize,
}

impl Snapshot {
    /// The value a store holds before its first refresh.
    pub fn empty() -> Self {
        Self {
            version: 0,
            captured_at: Utc::now(),
            modules: BTreeMap::new(),
            skipped_config_lines: 0,
        }
    }

    pub fn get(&self, id: &ParamId) -> Option<&ParamRecord> {
        self.modules.get(&id.module)?.params.get(&id.name)
    }

    /// Every record, module order then parameter order, both lexicographic.
    pub fn parameters(&self) -> impl Iterator<Item = &ParamRecord> {
        self.modules.values().flat_map(|module| module.params.values())
    }

    pub fn parameter_count(&self) -> usize {
        self.modules.values().map(|module| module.params.len()).sum()
    }

    /// Equality of merged content, ignoring version and capture time. Two
    /// back-to-back refreshes of an unchanged system compare equal here
    /// while their versions still differ.
    pub fn same_content(&self, other: &Self) -> bool {
        self.modules == other.modules
            && self.skipped_config_lines == other.skipped_config_lines
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::PermissionClass;

    fn record(module: &str, name: &str, value: &str) -> ParamRecord {
        ParamRecord {
            module: module.to_string(),
            name: name.to_string(),
            runtime: Some(RuntimeState {
                value: Some(value.to_string()),
                permission: PermissionClass::ReadWrite,
            }),
            declared_type: ParameterType::Unknown,
            array: false,
            description: None,
            persistent: Vec::new(),
        }
    }

    fn snapshot_with(records: Vec<ParamRecord>) -> Snapshot {
        let mut modules: BTreeMap<String, ModuleRecord> = BTreeMap::new();
        for rec in records {
            let module = modules
                .entry(rec.module.clone())
                .or_insert_with(|| ModuleRecord {
                    name: rec.module.clone(),
                    loaded: true,
                    metadata_warning: None,
                    params: BTreeMap::new(),
                });
            module.params.insert(rec.name.clone(), rec);
        }
        Snapshot {
            version: 1,
            captured_at: Utc::now(),
            modules,
            skipped_config_lines: 0,
        }
    }

    #[test]
    fn iteration_is_module_then_param_ordered() {
        let snapshot = snapshot_with(vec![
            record("zeta", "b", "1"),
            record("alpha", "z", "2"),
            record("alpha", "a", "3"),
            record("zeta", "a", "4"),
        ]);
        let ids: Vec<String> = snapshot.parameters().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["alpha.a", "alpha.z", "zeta.a", "zeta.b"]);
        assert_eq!(snapshot.parameter_count(), 4);
    }

    #[test]
    fn get_resolves_exact_identity() {
        let snapshot = snapshot_with(vec![record("dummy", "level", "3")]);
        assert!(snapshot.get(&ParamId::new("dummy", "level")).is_some());
        assert!(snapshot.get(&ParamId::new("dummy", "missing")).is_none());
        assert!(snapshot.get(&ParamId::new("other", "level")).is_none());
    }

    #[test]
    fn same_content_ignores_version_and_timestamp() {
        let a = snapshot_with(vec![record("dummy", "level", "3")]);
        let mut b = a.clone();
        b.version = 99;
        b.captured_at = Utc::now();
        assert!(a.same_content(&b));

        let c = snapshot_with(vec![record("dummy", "level", "4")]);
        assert!(!a.same_content(&c));
    }

    #[test]
    fn effective_persistent_skips_shadowed_entries() {
        let mut rec = record("dummy", "level", "3");
        rec.persistent = vec![
            ConfigEntry {
                file: "a.conf".into(),
                line: 1,
                module: "dummy".into(),
                param: "level".into(),
                value: "1".into(),
                shadowed: true,
            },
            ConfigEntry {
                file: "b.conf".into(),
                line: 1,
                module: "dummy".into(),
                param: "level".into(),
                value: "2".into(),
                shadowed: false,
            },
        ];
        assert_eq!(rec.effective_persistent().map(|e| e.value.as_str()), Some("2"));
    }
}
