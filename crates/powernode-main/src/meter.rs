// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Simulated metering sensor for hosts without a meter attached

use crate::config::MeterConfig;
use chrono::{DateTime, Utc};
use powernode_core::MeteringSensor;

/// Produces a slowly wandering voltage and load around the configured
/// nominal values and integrates energy over wall-clock time.
#[derive(Debug)]
pub struct SimulatedMeter {
    config: MeterConfig,
    reads: u64,
    energy_kwh: f64,
    last_sample: Option<DateTime<Utc>>,
}

impl SimulatedMeter {
    pub fn new(config: &MeterConfig) -> Self {
        Self {
            config: config.clone(),
            reads: 0,
            energy_kwh: 0.0,
            last_sample: None,
        }
    }

    /// Count a read and report whether it is one of the injected faults
    fn next_read_faults(&mut self) -> bool {
        self.reads += 1;
        self.config.fault_every > 0 && self.reads % u64::from(self.config.fault_every) == 0
    }

    fn phase(&self) -> f64 {
        self.reads as f64 / 15.0
    }

    fn instant_voltage(&self) -> f32 {
        self.config.nominal_voltage + (2.0 * self.phase().sin()) as f32
    }

    fn instant_current(&self) -> f32 {
        self.config.nominal_current * (1.0 + 0.2 * (self.phase() / 3.0).cos()) as f32
    }

    fn instant_power(&self) -> f32 {
        self.instant_voltage() * self.instant_current() * self.config.pf
    }
}

impl MeteringSensor for SimulatedMeter {
    fn voltage(&mut self) -> f32 {
        if self.next_read_faults() {
            return f32::NAN;
        }
        self.instant_voltage()
    }

    fn current(&mut self) -> f32 {
        self.instant_current()
    }

    fn power(&mut self) -> f32 {
        self.instant_power()
    }

    fn energy(&mut self) -> f32 {
        let now = Utc::now();
        if let Some(last) = self.last_sample {
            let hours = (now - last).num_milliseconds().max(0) as f64 / 3_600_000.0;
            self.energy_kwh += f64::from(self.instant_power()) * hours / 1000.0;
        }
        self.last_sample = Some(now);
        self.energy_kwh as f32
    }

    fn frequency(&mut self) -> f32 {
        self.config.frequency
    }

    fn pf(&mut self) -> f32 {
        self.config.pf
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_stay_near_nominal() {
        let mut meter = SimulatedMeter::new(&MeterConfig::default());

        for _ in 0..100 {
            let voltage = meter.voltage();
            assert!((228.0..=232.0).contains(&voltage), "voltage {voltage}");
            let current = meter.current();
            assert!((1.2..=1.8).contains(&current), "current {current}");
            assert_eq!(meter.frequency(), 50.0);
        }
    }

    #[test]
    fn test_fault_injection() {
        let config = MeterConfig {
            fault_every: 3,
            ..MeterConfig::default()
        };
        let mut meter = SimulatedMeter::new(&config);

        let faults = (0..9).filter(|_| meter.voltage().is_nan()).count();
        assert_eq!(faults, 3);
    }

    #[test]
    fn test_energy_never_decreases() {
        let mut meter = SimulatedMeter::new(&MeterConfig::default());
        let first = meter.energy();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = meter.energy();

        assert_eq!(first, 0.0);
        assert!(second >= first);
    }
}
