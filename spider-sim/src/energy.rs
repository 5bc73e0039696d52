//! Per-node battery and radio energy accounting.
//!
//! Each node carries a [`BasicEnergySource`] drained by a simple radio model:
//! a constant idle draw plus extra charge for every transmitted or received
//! payload, proportional to its airtime. Residual energy never increases and
//! stops at zero.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Battery and radio current parameters shared by all nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfiguration {
    /// Initial battery energy (joules)
    pub initial_energy_j: f64,
    /// Supply voltage (volts)
    pub supply_voltage_v: f64,
    /// Current drawn while idle/listening (amperes)
    pub idle_current_a: f64,
    /// Current drawn while transmitting (amperes)
    pub tx_current_a: f64,
    /// Current drawn while receiving (amperes)
    pub rx_current_a: f64,
}

impl Default for EnergyConfiguration {
    fn default() -> Self {
        Self {
            initial_energy_j: 1000.0,
            supply_voltage_v: 3.0,
            idle_current_a: 0.273,
            tx_current_a: 0.0174,
            rx_current_a: 0.0174,
        }
    }
}

/// A battery with lazily integrated idle drain.
#[derive(Debug, Clone)]
pub struct BasicEnergySource {
    initial_j: f64,
    consumed_j: f64,
    idle_power_w: f64,
    last_update: Duration,
}

impl BasicEnergySource {
    /// Creates a full battery as of time zero.
    pub fn new(config: &EnergyConfiguration) -> Self {
        Self {
            initial_j: config.initial_energy_j,
            consumed_j: 0.0,
            idle_power_w: config.idle_current_a * config.supply_voltage_v,
            last_update: Duration::ZERO,
        }
    }

    fn integrate_idle(&mut self, now: Duration) {
        if now > self.last_update {
            let elapsed = (now - self.last_update).as_secs_f64();
            self.consumed_j += self.idle_power_w * elapsed;
            self.last_update = now;
        }
    }

    /// Charges `joules` at time `now` on top of the idle drain.
    pub fn consume(&mut self, now: Duration, joules: f64) {
        self.integrate_idle(now);
        if joules > 0.0 {
            self.consumed_j += joules;
        }
    }

    /// Residual energy at time `now`, clamped at zero.
    pub fn remaining(&mut self, now: Duration) -> f64 {
        self.integrate_idle(now);
        (self.initial_j - self.consumed_j).max(0.0)
    }

    /// Whether the battery is empty at time `now`.
    pub fn is_depleted(&mut self, now: Duration) -> bool {
        self.remaining(now) <= 0.0
    }
}

/// Energy needed to keep the radio in `current_a` state for the airtime of
/// `bytes` at `phy_rate_bps`.
pub fn airtime_energy(
    config: &EnergyConfiguration,
    current_a: f64,
    bytes: u64,
    phy_rate_bps: f64,
) -> f64 {
    if phy_rate_bps <= 0.0 {
        return 0.0;
    }
    let airtime_s = bytes as f64 * 8.0 / phy_rate_bps;
    airtime_s * current_a * config.supply_voltage_v
}
