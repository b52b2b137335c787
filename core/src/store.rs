use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use tokio::sync::Mutex;

use crate::aggregate;
use crate::aggregate::RefreshInputs;
use crate::config::CoreConfig;
use crate::edit;
use crate::edit::EditOutcome;
use crate::error::RejectReason;
use crate::error::ScanError;
use crate::metadata::MetadataSource;
use crate::metadata::ModinfoFetcher;
use crate::modprobe;
use crate::runtime;
use crate::runtime::ModuleRuntime;
use crate::scanner;
use crate::snapshot::Snapshot;
use crate::types::ParamId;
use crate::validate;

/// The currently installed snapshot plus the bookkeeping that orders
/// installs. `generation` is the ticket of the refresh that produced the
/// snapshot (zero before the first one); `version` only ever grows.
struct Slot {
    snapshot: Arc<Snapshot>,
    generation: u64,
    version: u64,
}

/// Owns the merged view and arbitrates everything that replaces it.
/// Readers get cheap `Arc` clones; refreshes race freely and the slot
/// keeps whichever result came from the newest initiation; edits are
/// serialized per parameter identity and patch their outcome into the
/// snapshot current at completion time.
pub struct StateStore {
    config: CoreConfig,
    metadata: Arc<dyn MetadataSource>,
    slot: StdMutex<Slot>,
    tickets: AtomicU64,
    edit_locks: Mutex<HashMap<ParamId, Arc<Mutex<()>>>>,
}

impl StateStore {
    /// Wires the default `modinfo` fetcher from the config.
    pub fn new(config: CoreConfig) -> Self {
        let fetcher = ModinfoFetcher::new(&config.modinfo_bin, config.metadata_timeout_ms);
        Self::with_metadata_source(config, Arc::new(fetcher))
    }

    /// Injects any metadata source: test doubles, `NullMetadataSource`.
    pub fn with_metadata_source(config: CoreConfig, metadata: Arc<dyn MetadataSource>) -> Self {
        Self {
            config,
            metadata,
            slot: StdMutex::new(Slot {
                snapshot: Arc::new(Snapshot::empty()),
                generation: 0,
                version: 0,
            }),
            tickets: AtomicU64::new(0),
            edit_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The latest installed snapshot; an empty version-0 snapshot before
    /// the first refresh. Never partial, never torn.
    pub fn current(&self) -> Arc<Snapshot> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&slot.snapshot)
    }

    /// Scans, fans out per-module reads and metadata fetches, merges, and
    /// installs the result unless a refresh initiated later already
    /// finished first, in which case this result is dropped and the
    /// freshest installed snapshot is returned instead.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, ScanError> {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let modules = scanner::list_modules(&self.config.sys_module_root).await?;
        let config_scan =
            modprobe::parse_config_dir(&self.config.modprobe_dir, self.config.precedence).await;

        let concurrency = self.config.scan_concurrency.max(1);
        let workers = modules.into_iter().map(|module| {
            let metadata = Arc::clone(&self.metadata);
            let root = self.config.sys_module_root.clone();
            async move {
                let module_runtime = runtime::read_module_params(&root, &module).await;
                let shapes = match &module_runtime {
                    ModuleRuntime::Present(_) => Some(metadata.fetch(&module).await),
                    ModuleRuntime::Vanished => None,
                };
                (module, module_runtime, shapes)
            }
        });
        let results: Vec<_> = stream::iter(workers)
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut runtime_map = BTreeMap::new();
        let mut metadata_map = BTreeMap::new();
        for (module, module_runtime, shapes) in results {
            match module_runtime {
                ModuleRuntime::Present(params) => {
                    runtime_map.insert(module.clone(), params);
                }
                ModuleRuntime::Vanished => {
                    tracing::debug!(module, "module unloaded mid-refresh");
                }
            }
            if let Some(result) = shapes {
                metadata_map.insert(module, result);
            }
        }

        let snapshot = aggregate::merge(RefreshInputs {
            runtime: runtime_map,
            metadata: metadata_map,
            config: config_scan,
            captured_at: Utc::now(),
        });
        Ok(self.install(snapshot, ticket))
    }

    /// Submits one edit. Edits to the same identity serialize; edits to
    /// distinct identities proceed concurrently. Validation runs against
    /// the snapshot current when the edit begins.
    pub async fn edit(&self, id: &ParamId, proposed: &str) -> EditOutcome {
        let key_lock = {
            let mut locks = self.edit_locks.lock().await;
            Arc::clone(locks.entry(id.clone()).or_default())
        };
        let outcome = {
            let _guard = key_lock.lock().await;
            self.edit_serialized(id, proposed).await
        };
        drop(key_lock);
        self.prune_edit_locks().await;
        outcome
    }

    async fn edit_serialized(&self, id: &ParamId, proposed: &str) -> EditOutcome {
        let snapshot = self.current();
        let Some(record) = snapshot.get(id) else {
            return EditOutcome::Rejected {
                reason: RejectReason::UnknownParameter,
            };
        };
        let normalized = match validate::validate(record, proposed) {
            Ok(normalized) => normalized,
            Err(reason) => {
                tracing::debug!(param = %id, %reason, "edit rejected before write");
                return EditOutcome::Rejected { reason };
            }
        };

        let path = self.config.param_path(&id.module, &id.name);
        let outcome = edit::apply_edit(&path, &normalized).await;
        self.record_outcome(id, &normalized, &outcome);
        outcome
    }

    /// Folds a pipeline verdict into the snapshot. Both an exact echo and a
    /// diverging observed value are patched in: the confirmation read is
    /// the freshest truth about this parameter even when it disagrees with
    /// the request.
    fn record_outcome(&self, id: &ParamId, requested: &str, outcome: &EditOutcome) {
        match outcome {
            EditOutcome::Applied { observed } => {
                tracing::info!(param = %id, value = %observed, "edit applied");
                self.patch_current(id, observed);
            }
            EditOutcome::Inconclusive {
                observed: Some(observed),
                ..
            } => {
                tracing::warn!(param = %id, requested = %requested, observed = %observed,
                    "kernel normalized the written value");
                self.patch_current(id, observed);
            }
            _ => {}
        }
    }

    /// Clone-and-replace of exactly one entry's live value. No rescan; the
    /// rest of the snapshot keeps its capture time.
    fn patch_current(&self, id: &ParamId, observed: &str) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = (*slot.snapshot).clone();
        let Some(runtime_state) = next
            .modules
            .get_mut(&id.module)
            .and_then(|module| module.params.get_mut(&id.name))
            .and_then(|record| record.runtime.as_mut())
        else {
            // A refresh replaced the record out from under us; its view of
            // the value is at least as fresh as ours.
            return;
        };
        runtime_state.value = Some(observed.to_string());
        slot.version += 1;
        next.version = slot.version;
        slot.snapshot = Arc::new(next);
    }

    fn install(&self, mut snapshot: Snapshot, ticket: u64) -> Arc<Snapshot> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if ticket <= slot.generation {
            tracing::debug!(
                ticket,
                installed = slot.generation,
                "superseded refresh result dropped"
            );
            return Arc::clone(&slot.snapshot);
        }
        slot.version += 1;
        snapshot.version = slot.version;
        let installed = Arc::new(snapshot);
        slot.snapshot = Arc::clone(&installed);
        slot.generation = ticket;
        installed
    }

    /// Drops per-identity locks nobody holds. Called after each edit so
    /// the registry stays bounded by the number of in-flight edits.
    async fn prune_edit_locks(&self) {
        let mut locks = self.edit_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}
