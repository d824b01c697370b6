//! Gas accounting for a single execution.
//!
//! The counter is signed: a deduction is always applied, and a result below
//! zero is reported as [`GasError::OutOfGas`]. Callers turn that into the
//! `OutOfGas` terminal status, so the negative value is never observed by
//! guest code.

use crate::error::GasError;

/// Counter-valued gas amount.
pub type Gas = u64;

/// Largest gas allotment the signed counter can hold.
pub const MAX_GAS: Gas = i64::MAX as Gas;

/// Fixed literal cost of an instruction or host call.
pub type SmallGas = u32;

/// Gas cost of a host call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasCost {
    /// Constant price.
    Fixed(SmallGas),
    /// Price computed from the call's arguments (e.g. a length register).
    Variable(Gas),
}

impl GasCost {
    pub fn amount(self) -> Gas {
        match self {
            GasCost::Fixed(gas) => Gas::from(gas),
            GasCost::Variable(gas) => gas,
        }
    }
}

/// Gas tracking during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasCounter {
    /// Gas available when the execution started
    initial: Gas,
    /// Gas left; negative after an underflow
    remaining: i64,
}

impl GasCounter {
    /// Create a counter holding `initial` gas, capped at [`MAX_GAS`].
    pub fn new(initial: Gas) -> Self {
        let initial = initial.min(MAX_GAS);
        Self {
            initial,
            remaining: initial as i64,
        }
    }

    /// Get the initial allotment.
    pub fn initial(&self) -> Gas {
        self.initial
    }

    /// Get remaining gas, zero once exhausted.
    pub fn remaining(&self) -> Gas {
        self.remaining.max(0) as Gas
    }

    /// Get the raw signed counter.
    pub fn remaining_signed(&self) -> i64 {
        self.remaining
    }

    /// Get gas used, never more than the initial allotment.
    pub fn used(&self) -> Gas {
        let used = i128::from(self.initial) - i128::from(self.remaining);
        used.clamp(0, i128::from(self.initial)) as Gas
    }

    /// Charge a fixed cost.
    pub fn charge(&mut self, amount: SmallGas) -> Result<(), GasError> {
        self.charge_big(Gas::from(amount))
    }

    /// Charge a counter-valued cost.
    pub fn charge_big(&mut self, amount: Gas) -> Result<(), GasError> {
        let amount = i64::try_from(amount).unwrap_or(i64::MAX);
        self.remaining = self.remaining.saturating_sub(amount);

        if self.remaining < 0 {
            Err(GasError::OutOfGas {
                remaining: self.remaining,
            })
        } else {
            Ok(())
        }
    }

    /// Charge a host-call cost.
    pub fn charge_cost(&mut self, cost: GasCost) -> Result<(), GasError> {
        match cost {
            GasCost::Fixed(gas) => self.charge(gas),
            GasCost::Variable(gas) => self.charge_big(gas),
        }
    }
}

impl Default for GasCounter {
    fn default() -> Self {
        Self::new(0)
    }
}
