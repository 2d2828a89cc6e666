//! # Traceability Policy
//!
//! | check-only | simulate | simulations disabled | traced |
//! |------------|----------|----------------------|--------|
//! | false      | any      | any                  | yes    |
//! | true       | false    | any                  | no     |
//! | true       | true     | false                | yes    |
//! | true       | true     | true                 | no     |

use std::sync::Arc;

use crate::config::TracingConfig;
use crate::domain::context::ExecutionContext;

/// Decides per execution whether tracing applies.
#[derive(Debug, Clone)]
pub struct TraceabilityPolicy {
    config: Arc<TracingConfig>,
}

impl TraceabilityPolicy {
    pub fn new(config: Arc<TracingConfig>) -> Self {
        Self { config }
    }

    /// Process-wide switch. Decorators are pass-through when off.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Policy decision using the simulation flag attached to the context.
    pub fn is_traceable(&self, ctx: &ExecutionContext) -> bool {
        self.is_traceable_with(ctx, ctx.is_simulation())
    }

    /// Policy decision for an explicit `simulate` flag.
    pub fn is_traceable_with(&self, ctx: &ExecutionContext, simulate: bool) -> bool {
        !ctx.is_check_only() || (simulate && !self.config.disable_simulations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_store::MemMultiStore;
    use crate::domain::context::BlockHeader;
    use chrono::Utc;

    fn ctx(check_only: bool, simulate: bool) -> ExecutionContext {
        let header = BlockHeader {
            height: 1,
            time: Utc::now(),
        };
        ExecutionContext::new(Arc::new(MemMultiStore::new(["testing"])), header, check_only)
            .with_simulation(simulate)
    }

    #[test]
    fn test_truth_table() {
        // (name, check_only, simulation, simulations disabled, traceable)
        let cases = [
            ("deliver", false, false, false, true),
            ("deliver - sim disabled", false, true, true, true),
            ("check", true, false, false, false),
            ("check - disabled", true, false, true, false),
            ("sim", true, true, false, true),
            ("sim - disabled", true, true, true, false),
        ];
        for (name, check, sim, disabled, expected) in cases {
            let policy = TraceabilityPolicy::new(Arc::new(TracingConfig {
                disable_simulations: disabled,
                ..TracingConfig::enabled()
            }));
            assert_eq!(policy.is_traceable(&ctx(check, sim)), expected, "{name}");
        }
    }

    #[test]
    fn test_explicit_flag_overrides_context_flag() {
        let policy = TraceabilityPolicy::new(Arc::new(TracingConfig::enabled()));
        let check_ctx = ctx(true, false);
        assert!(!policy.is_traceable(&check_ctx));
        assert!(policy.is_traceable_with(&check_ctx, true));
    }

    #[test]
    fn test_independent_policies() {
        let on = TraceabilityPolicy::new(Arc::new(TracingConfig::enabled()));
        let off = TraceabilityPolicy::new(Arc::new(TracingConfig::default()));
        assert!(on.is_enabled());
        assert!(!off.is_enabled());
    }
}
