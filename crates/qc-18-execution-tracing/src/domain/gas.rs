//! # Gas Metering and the Gas Shadow Meter
//!
//! [`GasMeter`] is the capability the observed state machine charges against.
//! [`TraceGasMeter`] decorates any meter and records every consume/refund in
//! call order without touching the numbers.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::GasError;

/// Gas units.
pub type Gas = u64;

/// A gas counter shared by everything executing within one context.
pub trait GasMeter: Send + Sync {
    fn gas_consumed(&self) -> Gas;

    /// Consumed gas, capped at the limit.
    fn gas_consumed_to_limit(&self) -> Gas;

    fn gas_remaining(&self) -> Gas;

    fn limit(&self) -> Gas;

    fn consume_gas(&self, amount: Gas, descriptor: &str) -> Result<(), GasError>;

    fn refund_gas(&self, amount: Gas, descriptor: &str) -> Result<(), GasError>;

    fn is_past_limit(&self) -> bool;

    fn is_out_of_gas(&self) -> bool;
}

/// Meter with a hard limit.
///
/// Consumption beyond the limit is still recorded before `OutOfGas` is
/// returned, so `gas_consumed` reports what was attempted.
#[derive(Debug)]
pub struct BasicGasMeter {
    limit: Gas,
    consumed: Mutex<Gas>,
}

impl BasicGasMeter {
    pub fn new(limit: Gas) -> Self {
        Self {
            limit,
            consumed: Mutex::new(0),
        }
    }
}

impl GasMeter for BasicGasMeter {
    fn gas_consumed(&self) -> Gas {
        *self.consumed.lock()
    }

    fn gas_consumed_to_limit(&self) -> Gas {
        self.gas_consumed().min(self.limit)
    }

    fn gas_remaining(&self) -> Gas {
        self.limit.saturating_sub(self.gas_consumed())
    }

    fn limit(&self) -> Gas {
        self.limit
    }

    fn consume_gas(&self, amount: Gas, descriptor: &str) -> Result<(), GasError> {
        let mut consumed = self.consumed.lock();
        let next = consumed.checked_add(amount).ok_or_else(|| GasError::Overflow {
            descriptor: descriptor.to_string(),
        })?;
        *consumed = next;
        if next > self.limit {
            return Err(GasError::OutOfGas {
                descriptor: descriptor.to_string(),
                consumed: next,
                limit: self.limit,
            });
        }
        Ok(())
    }

    fn refund_gas(&self, amount: Gas, descriptor: &str) -> Result<(), GasError> {
        let mut consumed = self.consumed.lock();
        if *consumed < amount {
            return Err(GasError::NegativeGas {
                descriptor: descriptor.to_string(),
                consumed: *consumed,
                refund: amount,
            });
        }
        *consumed -= amount;
        Ok(())
    }

    fn is_past_limit(&self) -> bool {
        self.gas_consumed() > self.limit
    }

    fn is_out_of_gas(&self) -> bool {
        self.gas_consumed() >= self.limit
    }
}

impl fmt::Display for BasicGasMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BasicGasMeter:\n  limit: {}\n  consumed: {}",
            self.limit,
            self.gas_consumed()
        )
    }
}

/// Meter without a limit. Only overflow can fail.
#[derive(Debug, Default)]
pub struct InfiniteGasMeter {
    consumed: Mutex<Gas>,
}

impl InfiniteGasMeter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GasMeter for InfiniteGasMeter {
    fn gas_consumed(&self) -> Gas {
        *self.consumed.lock()
    }

    fn gas_consumed_to_limit(&self) -> Gas {
        self.gas_consumed()
    }

    fn gas_remaining(&self) -> Gas {
        Gas::MAX
    }

    fn limit(&self) -> Gas {
        Gas::MAX
    }

    fn consume_gas(&self, amount: Gas, descriptor: &str) -> Result<(), GasError> {
        let mut consumed = self.consumed.lock();
        *consumed = consumed.checked_add(amount).ok_or_else(|| GasError::Overflow {
            descriptor: descriptor.to_string(),
        })?;
        Ok(())
    }

    fn refund_gas(&self, amount: Gas, descriptor: &str) -> Result<(), GasError> {
        let mut consumed = self.consumed.lock();
        if *consumed < amount {
            return Err(GasError::NegativeGas {
                descriptor: descriptor.to_string(),
                consumed: *consumed,
                refund: amount,
            });
        }
        *consumed -= amount;
        Ok(())
    }

    fn is_past_limit(&self) -> bool {
        false
    }

    fn is_out_of_gas(&self) -> bool {
        false
    }
}

/// One observed gas charge or refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasTrace {
    pub amount: Gas,
    pub descriptor: String,
    pub is_refund: bool,
    /// Total consumed on the wrapped meter right before this event.
    pub consumed_before: Gas,
}

impl GasTrace {
    pub fn new(amount: Gas, descriptor: &str, is_refund: bool, consumed_before: Gas) -> Self {
        Self {
            amount,
            descriptor: descriptor.to_string(),
            is_refund,
            consumed_before,
        }
    }
}

impl fmt::Display for GasTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, refund: {}",
            self.amount, self.descriptor, self.is_refund
        )
    }
}

/// Gas Shadow Meter: records consume/refund calls, then delegates.
pub struct TraceGasMeter {
    inner: Arc<dyn GasMeter>,
    traces: Mutex<Vec<GasTrace>>,
}

impl TraceGasMeter {
    pub fn new(inner: Arc<dyn GasMeter>) -> Self {
        Self {
            inner,
            traces: Mutex::new(Vec::new()),
        }
    }

    /// Recorded events in call order.
    pub fn traces(&self) -> Vec<GasTrace> {
        self.traces.lock().clone()
    }
}

impl GasMeter for TraceGasMeter {
    fn gas_consumed(&self) -> Gas {
        self.inner.gas_consumed()
    }

    fn gas_consumed_to_limit(&self) -> Gas {
        self.inner.gas_consumed_to_limit()
    }

    fn gas_remaining(&self) -> Gas {
        self.inner.gas_remaining()
    }

    fn limit(&self) -> Gas {
        self.inner.limit()
    }

    fn consume_gas(&self, amount: Gas, descriptor: &str) -> Result<(), GasError> {
        self.traces.lock().push(GasTrace::new(
            amount,
            descriptor,
            false,
            self.inner.gas_consumed(),
        ));
        self.inner.consume_gas(amount, descriptor)
    }

    fn refund_gas(&self, amount: Gas, descriptor: &str) -> Result<(), GasError> {
        self.traces.lock().push(GasTrace::new(
            amount,
            descriptor,
            true,
            self.inner.gas_consumed(),
        ));
        self.inner.refund_gas(amount, descriptor)
    }

    fn is_past_limit(&self) -> bool {
        self.inner.is_past_limit()
    }

    fn is_out_of_gas(&self) -> bool {
        self.inner.is_out_of_gas()
    }
}

/// Storage gas schedule applied by the gas accounting store wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KvGasConfig {
    pub has_cost: Gas,
    pub delete_cost: Gas,
    pub read_cost_flat: Gas,
    pub read_cost_per_byte: Gas,
    pub write_cost_flat: Gas,
    pub write_cost_per_byte: Gas,
    pub iter_next_cost_flat: Gas,
}

impl Default for KvGasConfig {
    fn default() -> Self {
        Self {
            has_cost: 1000,
            delete_cost: 1000,
            read_cost_flat: 1000,
            read_cost_per_byte: 3,
            write_cost_flat: 2000,
            write_cost_per_byte: 30,
            iter_next_cost_flat: 30,
        }
    }
}

/// Storage gas descriptors.
pub mod descriptors {
    pub const HAS: &str = "Has";
    pub const DELETE: &str = "Delete";
    pub const READ_FLAT: &str = "ReadFlat";
    pub const READ_PER_BYTE: &str = "ReadPerByte";
    pub const WRITE_FLAT: &str = "WriteFlat";
    pub const WRITE_PER_BYTE: &str = "WritePerByte";
    pub const ITER_NEXT_FLAT: &str = "IterNextFlat";
    pub const VALUE_PER_BYTE: &str = "ValuePerByte";
}
