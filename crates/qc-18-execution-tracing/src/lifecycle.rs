//! # Traced Block Lifecycle
//!
//! Runs the per-block hooks of every registered module, one span per module
//! under one root span per phase.
//!
//! ```text
//! root_begin_block (store: off)
//!   ├─ module_begin_block  module=bank     (store: writes only)
//!   └─ module_begin_block  module=staking  (store: writes only)
//!
//! abci_end_block (store: off)
//!   ├─ module_end_block    module=bank
//!   └─ module_end_block    module=staking  valset_update=true, log valset_diff
//! ```
//!
//! At most one module may return validator set updates per block.

use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::domain::context::ExecutionContext;
use crate::domain::events::{Event, EventManager};
use crate::domain::limits::to_json;
use crate::domain::span::{logs, tags};
use crate::errors::LifecycleError;
use crate::service::{ExecutionTracer, StoreLogMode};

pub const ROOT_BEGIN_BLOCK: &str = "root_begin_block";
pub const MODULE_BEGIN_BLOCK: &str = "module_begin_block";
pub const ABCI_END_BLOCK: &str = "abci_end_block";
pub const MODULE_END_BLOCK: &str = "module_end_block";

/// A module with per-block hooks.
pub trait BlockModule: Send + Sync {
    fn name(&self) -> &str;

    fn begin_block(&self, _ctx: &ExecutionContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Validator set changes to apply at the end of this block, if any.
    fn end_block(&self, _ctx: &ExecutionContext) -> anyhow::Result<Vec<ValidatorUpdate>> {
        Ok(Vec::new())
    }
}

/// New voting power for one validator. Power 0 removes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatorUpdate {
    #[serde(serialize_with = "as_hex")]
    pub pub_key: Vec<u8>,
    pub power: i64,
}

fn as_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeginBlockResponse {
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndBlockResponse {
    pub validator_updates: Vec<ValidatorUpdate>,
    pub events: Vec<Event>,
}

/// Module manager that runs block hooks in registration order.
pub struct TraceModuleManager {
    tracer: Arc<ExecutionTracer>,
    modules: Vec<Arc<dyn BlockModule>>,
}

impl TraceModuleManager {
    pub fn new(tracer: Arc<ExecutionTracer>) -> Self {
        Self {
            tracer,
            modules: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_module(mut self, module: Arc<dyn BlockModule>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Run every module's begin-block hook. The first failure stops the pass.
    pub fn begin_block(
        &self,
        root: &ExecutionContext,
    ) -> Result<BeginBlockResponse, LifecycleError> {
        let events = EventManager::new();
        let root = root.with_event_manager(events.clone());

        if !self.tracer.policy().is_enabled() {
            for module in &self.modules {
                module
                    .begin_block(&root)
                    .map_err(|source| module_error(module.as_ref(), source))?;
            }
            return Ok(BeginBlockResponse {
                events: events.events(),
            });
        }

        self.tracer
            .run_traced(&root, ROOT_BEGIN_BLOCK, StoreLogMode::Off, |parent_ctx, _| {
                for module in &self.modules {
                    self.tracer.run_traced(
                        parent_ctx,
                        MODULE_BEGIN_BLOCK,
                        StoreLogMode::WritesOnly,
                        |work_ctx, span| {
                            span.set_tag(tags::MODULE, module.name());
                            module
                                .begin_block(work_ctx)
                                .map_err(|source| module_error(module.as_ref(), source))
                        },
                    )?;
                }
                Ok(())
            })?;

        Ok(BeginBlockResponse {
            events: events.events(),
        })
    }

    /// Run every module's end-block hook and collect validator set updates.
    pub fn end_block(&self, root: &ExecutionContext) -> Result<EndBlockResponse, LifecycleError> {
        let events = EventManager::new();
        let root = root.with_event_manager(events.clone());
        let mut validator_updates = Vec::new();

        if !self.tracer.policy().is_enabled() {
            for module in &self.modules {
                let updates = module
                    .end_block(&root)
                    .map_err(|source| module_error(module.as_ref(), source))?;
                merge_updates(&mut validator_updates, module.name(), updates)?;
            }
            return Ok(EndBlockResponse {
                validator_updates,
                events: events.events(),
            });
        }

        let limits = *self.tracer.limits();
        self.tracer
            .run_traced(&root, ABCI_END_BLOCK, StoreLogMode::Off, |parent_ctx, _| {
                for module in &self.modules {
                    self.tracer.run_traced(
                        parent_ctx,
                        MODULE_END_BLOCK,
                        StoreLogMode::WritesOnly,
                        |work_ctx, span| {
                            span.set_tag(tags::MODULE, module.name());
                            let updates = module
                                .end_block(work_ctx)
                                .map_err(|source| module_error(module.as_ref(), source))?;
                            if !updates.is_empty() {
                                span.set_tag(tags::VALSET_UPDATE, true);
                                span.log_field(
                                    logs::VALSET_DIFF,
                                    limits.safe_field(&to_json(&updates)),
                                );
                            }
                            merge_updates(&mut validator_updates, module.name(), updates)
                        },
                    )?;
                }
                Ok(())
            })?;

        Ok(EndBlockResponse {
            validator_updates,
            events: events.events(),
        })
    }
}

fn module_error(module: &dyn BlockModule, source: anyhow::Error) -> LifecycleError {
    LifecycleError::Module {
        module: module.name().to_string(),
        source,
    }
}

fn merge_updates(
    acc: &mut Vec<ValidatorUpdate>,
    module: &str,
    updates: Vec<ValidatorUpdate>,
) -> Result<(), LifecycleError> {
    if updates.is_empty() {
        return Ok(());
    }
    if !acc.is_empty() {
        tracing::error!(module, "conflicting validator set update");
        return Err(LifecycleError::ValidatorSetConflict {
            module: module.to_string(),
        });
    }
    acc.extend(updates);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::collector::InMemoryCollector;
    use crate::adapters::memory_store::MemMultiStore;
    use crate::config::TracingConfig;
    use crate::domain::context::BlockHeader;
    use crate::domain::span::TagValue;
    use chrono::Utc;

    struct TestModule {
        name: &'static str,
        fail: bool,
        updates: Vec<ValidatorUpdate>,
    }

    impl TestModule {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail: false,
                updates: Vec::new(),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail: true,
                updates: Vec::new(),
            })
        }

        fn with_updates(name: &'static str, power: i64) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail: false,
                updates: vec![ValidatorUpdate {
                    pub_key: vec![0xab, 0xcd],
                    power,
                }],
            })
        }
    }

    impl BlockModule for TestModule {
        fn name(&self) -> &str {
            self.name
        }

        fn begin_block(&self, ctx: &ExecutionContext) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("begin block exploded");
            }
            ctx.event_manager().emit_event(Event::new(format!("{}_begin", self.name)));
            ctx.multi_store()
                .kv_store("testing")?
                .set(self.name.as_bytes(), b"begin")?;
            Ok(())
        }

        fn end_block(&self, ctx: &ExecutionContext) -> anyhow::Result<Vec<ValidatorUpdate>> {
            ctx.event_manager().emit_event(Event::new(format!("{}_end", self.name)));
            Ok(self.updates.clone())
        }
    }

    fn setup(enabled: bool) -> (Arc<ExecutionTracer>, Arc<InMemoryCollector>, ExecutionContext) {
        let collector = Arc::new(InMemoryCollector::new());
        let config = TracingConfig {
            enabled,
            ..TracingConfig::default()
        };
        let tracer = Arc::new(ExecutionTracer::new(Arc::new(config), collector.clone()));
        let header = BlockHeader {
            height: 10,
            time: Utc::now(),
        };
        let ctx = ExecutionContext::new(Arc::new(MemMultiStore::new(["testing"])), header, false);
        (tracer, collector, ctx)
    }

    #[test]
    fn test_begin_block_spans_per_module() {
        let (tracer, collector, ctx) = setup(true);
        let manager = TraceModuleManager::new(tracer)
            .with_module(TestModule::new("bank"))
            .with_module(TestModule::new("staking"));

        let resp = manager.begin_block(&ctx).unwrap();

        let kinds: Vec<_> = resp.events.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["bank_begin", "staking_begin"]);
        assert!(ctx.event_manager().is_empty());

        let spans = collector.finished_spans();
        let names: Vec<_> = spans.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![MODULE_BEGIN_BLOCK, MODULE_BEGIN_BLOCK, ROOT_BEGIN_BLOCK]);
        assert_eq!(spans[0].tag(tags::MODULE), Some(&TagValue::from("bank")));
        assert_eq!(spans[1].tag(tags::MODULE), Some(&TagValue::from("staking")));
        assert_eq!(spans[0].parent, Some(spans[2].context));
        assert!(spans[0].log(logs::RAW_STORE_IO).unwrap().contains("\"operation\":\"write\""));
        assert!(spans[2].log(logs::RAW_STORE_IO).is_none());
    }

    #[test]
    fn test_begin_block_stops_at_first_error() {
        let (tracer, collector, ctx) = setup(true);
        let manager = TraceModuleManager::new(tracer)
            .with_module(TestModule::failing("bank"))
            .with_module(TestModule::new("staking"));

        let err = manager.begin_block(&ctx).unwrap_err();
        assert!(matches!(err, LifecycleError::Module { ref module, .. } if module == "bank"));

        let spans = collector.finished_spans();
        assert_eq!(spans.len(), 2);
        assert!(spans.iter().all(|s| s.is_errored()));
        assert!(spans[0].log(logs::ERROR).unwrap().contains("begin block exploded"));
    }

    #[test]
    fn test_disabled_tracing_is_pass_through() {
        let (tracer, collector, ctx) = setup(false);
        let manager = TraceModuleManager::new(tracer)
            .with_module(TestModule::new("bank"))
            .with_module(TestModule::with_updates("staking", 5));

        let begin = manager.begin_block(&ctx).unwrap();
        let end = manager.end_block(&ctx).unwrap();

        assert_eq!(begin.events.len(), 2);
        assert_eq!(end.events.len(), 2);
        assert_eq!(end.validator_updates.len(), 1);
        assert!(collector.finished_spans().is_empty());
    }

    #[test]
    fn test_end_block_tags_validator_updates() {
        let (tracer, collector, ctx) = setup(true);
        let manager = TraceModuleManager::new(tracer)
            .with_module(TestModule::new("bank"))
            .with_module(TestModule::with_updates("staking", 7));

        let resp = manager.end_block(&ctx).unwrap();
        assert_eq!(
            resp.validator_updates,
            vec![ValidatorUpdate {
                pub_key: vec![0xab, 0xcd],
                power: 7
            }]
        );

        let spans = collector.finished_spans();
        assert_eq!(spans[2].name, ABCI_END_BLOCK);
        assert!(spans[0].tag(tags::VALSET_UPDATE).is_none());
        assert_eq!(spans[1].tag(tags::VALSET_UPDATE), Some(&TagValue::Bool(true)));
        assert_eq!(
            spans[1].log(logs::VALSET_DIFF),
            Some("[{\"pub_key\":\"abcd\",\"power\":7}]")
        );
    }

    #[test]
    fn test_second_validator_update_conflicts() {
        let (tracer, collector, ctx) = setup(true);
        let manager = TraceModuleManager::new(tracer)
            .with_module(TestModule::with_updates("staking", 1))
            .with_module(TestModule::with_updates("poa", 2));

        let err = manager.end_block(&ctx).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::ValidatorSetConflict { ref module } if module == "poa"
        ));

        let spans = collector.finished_spans();
        assert!(!spans[0].is_errored());
        assert!(spans[1].is_errored());
        assert!(spans[2].is_errored());
    }
}
