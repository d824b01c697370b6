//! PVM configuration.

use serde::{Deserialize, Serialize};

use crate::error::PvmError;
use crate::gas_metering::{Gas, SmallGas, MAX_GAS};
use crate::host_calls::UNKNOWN_HOST_CALL_GAS;
use crate::interpreter::INSTRUCTION_GAS;

/// Tunables of the execution core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvmConfig {
    /// Number of pooled interpreters
    pub pool_capacity: usize,
    /// Gas given to an execution when the caller does not choose
    pub default_gas: Gas,
    /// Gas charged per instruction
    pub instruction_gas: SmallGas,
    /// Gas charged for an unregistered host call
    pub unknown_host_call_gas: SmallGas,
    /// Largest accepted program, in bytes
    pub max_code_size: usize,
}

impl Default for PvmConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 8,
            default_gas: 10_000_000,
            instruction_gas: INSTRUCTION_GAS,
            unknown_host_call_gas: UNKNOWN_HOST_CALL_GAS,
            max_code_size: 4 * 1024 * 1024,
        }
    }
}

impl PvmConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), PvmError> {
        if self.pool_capacity == 0 {
            return Err(PvmError::InvalidConfig(
                "pool_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_code_size == 0 {
            return Err(PvmError::InvalidConfig(
                "max_code_size cannot be 0".to_string(),
            ));
        }
        if self.default_gas > MAX_GAS {
            return Err(PvmError::InvalidConfig(format!(
                "default_gas {} exceeds {}",
                self.default_gas, MAX_GAS
            )));
        }
        Ok(())
    }

    /// Reject programs larger than `max_code_size`.
    pub fn check_code_size(&self, code: &[u8]) -> Result<(), PvmError> {
        if code.len() > self.max_code_size {
            return Err(PvmError::CodeSizeExceeded {
                size: code.len(),
                limit: self.max_code_size,
            });
        }
        Ok(())
    }
}
