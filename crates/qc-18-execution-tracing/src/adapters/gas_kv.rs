//! Storage gas accounting wrapper.
//!
//! Charges the [`KvGasConfig`] schedule against a gas meter, then forwards the
//! call. The engine points it at an infinite shadow meter, so storage costs are
//! attributed in the trace without reaching the application's gas meter.

use std::sync::Arc;

use crate::domain::gas::{descriptors, Gas, GasMeter, KvGasConfig};
use crate::errors::StoreError;
use crate::ports::{IterOrder, KvPair, KvStore};

pub struct GasKvStore {
    parent: Arc<dyn KvStore>,
    gas_meter: Arc<dyn GasMeter>,
    config: KvGasConfig,
}

impl GasKvStore {
    pub fn new(
        parent: Arc<dyn KvStore>,
        gas_meter: Arc<dyn GasMeter>,
        config: KvGasConfig,
    ) -> Self {
        Self {
            parent,
            gas_meter,
            config,
        }
    }

    fn per_byte(&self, cost: Gas, len: usize, descriptor: &str) -> Result<(), StoreError> {
        let amount = cost.saturating_mul(len as Gas);
        self.gas_meter.consume_gas(amount, descriptor)?;
        Ok(())
    }
}

impl KvStore for GasKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.gas_meter
            .consume_gas(self.config.read_cost_flat, descriptors::READ_FLAT)?;
        let value = self.parent.get(key)?;
        self.per_byte(self.config.read_cost_per_byte, key.len(), descriptors::READ_PER_BYTE)?;
        let value_len = value.as_ref().map_or(0, Vec::len);
        self.per_byte(self.config.read_cost_per_byte, value_len, descriptors::READ_PER_BYTE)?;
        Ok(value)
    }

    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        self.gas_meter
            .consume_gas(self.config.has_cost, descriptors::HAS)?;
        self.parent.has(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.gas_meter
            .consume_gas(self.config.write_cost_flat, descriptors::WRITE_FLAT)?;
        self.per_byte(self.config.write_cost_per_byte, key.len(), descriptors::WRITE_PER_BYTE)?;
        self.per_byte(self.config.write_cost_per_byte, value.len(), descriptors::WRITE_PER_BYTE)?;
        self.parent.set(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.gas_meter
            .consume_gas(self.config.delete_cost, descriptors::DELETE)?;
        self.parent.delete(key)
    }

    fn range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: IterOrder,
    ) -> Result<Vec<KvPair>, StoreError> {
        let entries = self.parent.range(start, end, order)?;
        for (key, value) in &entries {
            self.gas_meter
                .consume_gas(self.config.iter_next_cost_flat, descriptors::ITER_NEXT_FLAT)?;
            self.per_byte(self.config.read_cost_per_byte, key.len(), descriptors::VALUE_PER_BYTE)?;
            self.per_byte(
                self.config.read_cost_per_byte,
                value.len(),
                descriptors::VALUE_PER_BYTE,
            )?;
        }
        Ok(entries)
    }
}
