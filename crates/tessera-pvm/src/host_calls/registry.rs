//! Host-call handler registration.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;

use super::adapter::{HostCallMemory, HostCallRegisters};
use super::HostCallIndex;
use crate::gas_metering::{GasCost, GasCounter};

/// Termination requested by a host call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PvmExecution {
    Halt,
    Panic,
}

/// A host call implementation.
///
/// Usually implemented by an enum owning every host call of an embedder, so
/// dispatch through [`HostCallRegistry`] is static. Failures are reported to
/// the program through result registers; returning a [`PvmExecution`] ends
/// the execution instead.
pub trait HostCallHandler: Send + Sync {
    /// Index this handler answers to.
    fn index(&self) -> HostCallIndex;

    /// Gas charged before [`execute`](Self::execute) runs.
    fn gas_cost(&self, registers: &HostCallRegisters<'_>) -> GasCost;

    fn execute(
        &self,
        gas: &mut GasCounter,
        registers: &mut HostCallRegisters<'_>,
        memory: &mut HostCallMemory<'_>,
    ) -> impl Future<Output = Option<PvmExecution>> + Send;
}

/// Index to handler table.
#[derive(Debug)]
pub struct HostCallRegistry<H> {
    handlers: HashMap<HostCallIndex, H>,
}

impl<H: HostCallHandler> HostCallRegistry<H> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` under its own index.
    ///
    /// # Panics
    ///
    /// Panics if the index is already taken.
    pub fn register(&mut self, handler: H) {
        let index = handler.index();
        match self.handlers.entry(index) {
            Entry::Occupied(_) => {
                panic!("host call {index} registered twice")
            }
            Entry::Vacant(slot) => {
                slot.insert(handler);
            }
        }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, handler: H) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, index: HostCallIndex) -> Option<&H> {
        self.handlers.get(&index)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<H: HostCallHandler> Default for HostCallRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}
