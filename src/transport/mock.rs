//! Mock register readers.
//!
//! - [`ScriptedReader`] replays a fixed sequence of outcomes (tests).
//! - [`SimulatedReader`] produces a deterministic ramp (dry runs without a
//!   sensor attached).

use crate::error::ReadFailure;
use crate::reading::{RegisterBlock, CHANNEL_COUNT};
use crate::transport::RegisterReader;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Replays scripted read outcomes in order.
///
/// Once the script runs out, every further read returns the fallback block if
/// one was given, otherwise a `Malformed` failure.
#[derive(Default)]
pub struct ScriptedReader {
    script: Mutex<VecDeque<Result<RegisterBlock, ReadFailure>>>,
    fallback: Option<RegisterBlock>,
    calls: AtomicU64,
}

impl ScriptedReader {
    /// Replay `script` in order.
    pub fn new(script: impl IntoIterator<Item = Result<RegisterBlock, ReadFailure>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Always return `block`.
    pub fn constant(block: RegisterBlock) -> Self {
        Self::new([]).with_fallback(block)
    }

    /// Return `block` once the script runs out.
    pub fn with_fallback(mut self, block: RegisterBlock) -> Self {
        self.fallback = Some(block);
        self
    }

    /// Number of reads attempted so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegisterReader for ScriptedReader {
    async fn read(&self) -> Result<RegisterBlock, ReadFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .map_err(|_| ReadFailure::Malformed("script lock poisoned".to_string()))?
            .pop_front();
        match (next, self.fallback) {
            (Some(outcome), _) => outcome,
            (None, Some(block)) => Ok(block),
            (None, None) => Err(ReadFailure::Malformed("read script exhausted".to_string())),
        }
    }
}

/// Deterministic stand-in for a real sensor.
///
/// Channel `n` on tick `t` reads `(t * 37 + n * 500) % 4200`, so the ramp
/// occasionally crosses the saturation threshold.
#[derive(Default)]
pub struct SimulatedReader {
    tick: AtomicU64,
}

impl SimulatedReader {
    /// Ramp starting at zero.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegisterReader for SimulatedReader {
    async fn read(&self) -> Result<RegisterBlock, ReadFailure> {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        let mut block = [0u16; CHANNEL_COUNT];
        for (n, reg) in block.iter_mut().enumerate() {
            *reg = ((tick * 37 + n as u64 * 500) % 4200) as u16;
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_reader_replays_then_falls_back() {
        let reader = ScriptedReader::new([
            Ok([1; CHANNEL_COUNT]),
            Err(ReadFailure::Timeout { timeout_ms: 2000 }),
        ])
        .with_fallback([9; CHANNEL_COUNT]);

        assert_eq!(reader.read().await.unwrap(), [1; CHANNEL_COUNT]);
        assert!(reader.read().await.is_err());
        assert_eq!(reader.read().await.unwrap(), [9; CHANNEL_COUNT]);
        assert_eq!(reader.calls(), 3);
    }

    #[tokio::test]
    async fn simulated_reader_advances() {
        let reader = SimulatedReader::new();
        let first = reader.read().await.unwrap();
        let second = reader.read().await.unwrap();
        assert_ne!(first, second);
        assert!(first.iter().all(|&v| v < 4200));
    }
}
