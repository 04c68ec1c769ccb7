//! Seeded, probabilistic synthetic-failure injection.
//!
//! A policy's chaos config can convert `allow` verdicts into `block`s at a
//! configured rate and add fixed latency, for resilience testing. With a
//! seed, the injection stream is reproducible: the same seed and the same
//! intent stream yield the same yes/no sequence across daemon restarts.

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use warden_policy::ChaosConfig;

/// Outcome of one chaos roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChaosRoll {
    /// Convert the verdict to `block`.
    pub inject: bool,
    /// Extra latency to apply, regardless of `inject`.
    pub delay_ms: Option<u64>,
}

impl ChaosRoll {
    /// The no-op roll: chaos disabled or not applicable.
    #[must_use]
    pub fn pass() -> Self {
        Self {
            inject: false,
            delay_ms: None,
        }
    }
}

/// Counters for the chaos metrics surface.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaosStats {
    /// Rolls performed (eligible intents under enabled chaos).
    pub rolls: u64,
    /// Rolls that injected a block.
    pub injected: u64,
}

impl ChaosStats {
    /// Injections per roll, `0.0` when nothing rolled yet.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn injection_rate(&self) -> f64 {
        if self.rolls == 0 {
            0.0
        } else {
            self.injected as f64 / self.rolls as f64
        }
    }
}

/// The chaos injector.
///
/// Seeded configs draw from a per-seed `StdRng` stream, so every policy
/// sharing a seed sees the same sequence of draws. Unseeded configs draw
/// from the thread-local OS-seeded RNG.
#[derive(Debug, Default)]
pub struct ChaosInjector {
    streams: DashMap<u64, Mutex<StdRng>>,
    rolls: AtomicU64,
    injected: AtomicU64,
}

impl ChaosInjector {
    /// Create an injector with no seeded streams yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Roll against a policy's chaos config for one intent.
    ///
    /// Injection requires: chaos enabled, the intent in the target set (or
    /// an empty target set), the intent not exempt, and a draw strictly
    /// below `block_rate`. The delay applies whenever chaos is enabled.
    #[must_use]
    pub fn maybe_inject(&self, config: &ChaosConfig, intent: &str) -> ChaosRoll {
        if !config.enabled {
            return ChaosRoll::pass();
        }

        let delay_ms = config.delay_ms.filter(|&ms| ms > 0);

        let targeted = config.target_intents.is_empty()
            || config.target_intents.iter().any(|t| t == intent);
        let exempt = config.exempt_intents.iter().any(|e| e == intent);
        if !targeted || exempt {
            return ChaosRoll {
                inject: false,
                delay_ms,
            };
        }

        let draw: f64 = match config.seed {
            Some(seed) => {
                let stream = self
                    .streams
                    .entry(seed)
                    .or_insert_with(|| Mutex::new(StdRng::seed_from_u64(seed)));
                let mut rng = stream.lock().unwrap_or_else(|e| e.into_inner());
                rng.gen_range(0.0..1.0)
            },
            None => rand::thread_rng().gen_range(0.0..1.0),
        };

        let inject = draw < config.block_rate;
        self.rolls.fetch_add(1, Ordering::Relaxed);
        if inject {
            self.injected.fetch_add(1, Ordering::Relaxed);
        }
        ChaosRoll { inject, delay_ms }
    }

    /// Discard the stream for a seed, restarting its sequence.
    pub fn reset_seed(&self, seed: u64) {
        self.streams.remove(&seed);
    }

    /// Counters since startup.
    #[must_use]
    pub fn stats(&self) -> ChaosStats {
        ChaosStats {
            rolls: self.rolls.load(Ordering::Relaxed),
            injected: self.injected.load(Ordering::Relaxed),
        }
    }
}
