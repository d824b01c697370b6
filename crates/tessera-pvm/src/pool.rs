//! Pool of reusable interpreter instances.
//!
//! The pool owns a fixed number of interpreters. `acquire` hands out an idle
//! one or waits in FIFO order until one is released. Released instances are
//! given directly to the oldest waiter still interested; the pool never
//! resets them, callers do that through [`Interpreter::reset`].

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::PvmConfig;
use crate::error::PvmError;
use crate::interpreter::Interpreter;

/// Fixed-capacity interpreter pool.
#[derive(Debug)]
pub struct InterpreterPool {
    capacity: usize,
    state: Mutex<PoolState>,
}

#[derive(Debug)]
struct PoolState {
    idle: Vec<Interpreter>,
    /// Instances handed out and not yet released
    outstanding: usize,
    waiters: VecDeque<oneshot::Sender<Interpreter>>,
}

impl InterpreterPool {
    /// Create a pool holding `capacity` default interpreters.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_factory(capacity, Interpreter::new)
    }

    /// Create a pool of `capacity` interpreters built by `factory`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_factory(capacity: usize, factory: impl FnMut() -> Interpreter) -> Self {
        assert!(capacity > 0, "interpreter pool needs at least one instance");
        let idle = std::iter::repeat_with(factory).take(capacity).collect();
        Self {
            capacity,
            state: Mutex::new(PoolState {
                idle,
                outstanding: 0,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Create a pool sized and configured by `config`.
    pub fn from_config(config: &PvmConfig) -> Result<Self, PvmError> {
        config.validate()?;
        let instruction_gas = config.instruction_gas;
        Ok(Self::with_factory(config.pool_capacity, || {
            Interpreter::with_instruction_gas(instruction_gas)
        }))
    }

    /// Take an interpreter, waiting for a release if none is idle.
    pub async fn acquire(&self) -> Interpreter {
        loop {
            let receiver = {
                let mut state = self.state.lock();
                if let Some(interpreter) = state.idle.pop() {
                    state.outstanding += 1;
                    return interpreter;
                }
                state.waiters.retain(|waiter| !waiter.is_closed());
                let (sender, receiver) = oneshot::channel();
                state.waiters.push_back(sender);
                debug!(waiting = state.waiters.len(), "waiting for an interpreter");
                receiver
            };

            let mut pending = PendingAcquire {
                pool: self,
                receiver,
            };
            if let Ok(interpreter) = (&mut pending.receiver).await {
                return interpreter;
            }
        }
    }

    /// Return an interpreter to the pool.
    ///
    /// Releases beyond the number of instances handed out are dropped.
    pub fn release(&self, interpreter: Interpreter) {
        let mut interpreter = interpreter;
        let mut state = self.state.lock();

        if state.outstanding == 0 {
            warn!(capacity = self.capacity, "pool full, dropping released interpreter");
            return;
        }

        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(interpreter) {
                Ok(()) => {
                    debug!("interpreter handed to waiter");
                    return;
                }
                Err(returned) => interpreter = returned,
            }
        }

        state.outstanding -= 1;
        state.idle.push(interpreter);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Number of `acquire` calls still waiting.
    pub fn waiting_count(&self) -> usize {
        self.state
            .lock()
            .waiters
            .iter()
            .filter(|waiter| !waiter.is_closed())
            .count()
    }
}

/// Puts back an interpreter delivered to an `acquire` that was dropped
/// before it could take it.
struct PendingAcquire<'a> {
    pool: &'a InterpreterPool,
    receiver: oneshot::Receiver<Interpreter>,
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        self.receiver.close();
        if let Ok(interpreter) = self.receiver.try_recv() {
            self.pool.release(interpreter);
        }
    }
}
