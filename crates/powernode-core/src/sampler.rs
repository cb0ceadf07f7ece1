// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Sensor sampling task

use crate::config::PipelineConfig;
use crate::control::TaskGate;
use crate::queue::{Offer, ReadingProducer};
use crate::traits::MeteringSensor;
use chrono::Utc;
use powernode_shared::Reading;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Undefined sensor results become 0.0
pub fn sanitize(value: f32) -> f32 {
    if value.is_finite() { value } else { 0.0 }
}

/// Read all six quantities and sanitize every one of them
pub fn take_reading(sensor: &mut dyn MeteringSensor) -> Reading {
    Reading {
        voltage: sanitize(sensor.voltage()),
        current: sanitize(sensor.current()),
        power: sanitize(sensor.power()),
        energy: sanitize(sensor.energy()),
        frequency: sanitize(sensor.frequency()),
        pf: sanitize(sensor.pf()),
        sampled_at: Utc::now(),
    }
}

#[derive(Debug)]
pub struct Sampler<S> {
    sensor: S,
    producer: ReadingProducer,
    gate: TaskGate,
    interval: Duration,
    enqueue_wait: Duration,
}

impl<S: MeteringSensor> Sampler<S> {
    pub fn new(
        sensor: S,
        producer: ReadingProducer,
        gate: TaskGate,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            sensor,
            producer,
            gate,
            interval: config.sample_interval(),
            enqueue_wait: config.enqueue_wait(),
        }
    }

    /// One sampling cycle without the trailing sleep.
    /// A full queue drops the reading; freshness wins over completeness.
    pub async fn sample_once(&mut self) -> Offer {
        let reading = take_reading(&mut self.sensor);
        let offer = self.producer.offer(reading, self.enqueue_wait).await;

        match offer {
            Offer::Queued => debug!(
                voltage = reading.voltage,
                current = reading.current,
                power = reading.power,
                queued = self.producer.len(),
                "Reading queued"
            ),
            Offer::Dropped => debug!(
                dropped_total = self.producer.dropped(),
                "Queue full, reading dropped"
            ),
            Offer::Closed => warn!("Publisher is gone, reading discarded"),
        }

        offer
    }

    pub async fn run(mut self) {
        info!(
            sensor = self.sensor.name(),
            interval_ms = self.interval.as_millis(),
            "Sampler started"
        );

        loop {
            self.gate.checkpoint().await;
            self.sample_once().await;
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::task_control;
    use crate::queue::handoff_queue;

    /// Replays scripted values, one per read
    struct ScriptedMeter {
        values: [f32; 6],
    }

    impl MeteringSensor for ScriptedMeter {
        fn voltage(&mut self) -> f32 {
            self.values[0]
        }
        fn current(&mut self) -> f32 {
            self.values[1]
        }
        fn power(&mut self) -> f32 {
            self.values[2]
        }
        fn energy(&mut self) -> f32 {
            self.values[3]
        }
        fn frequency(&mut self) -> f32 {
            self.values[4]
        }
        fn pf(&mut self) -> f32 {
            self.values[5]
        }
    }

    /// Voltage counts up so readings can be told apart
    struct CountingMeter {
        next: f32,
    }

    impl MeteringSensor for CountingMeter {
        fn voltage(&mut self) -> f32 {
            self.next += 1.0;
            self.next
        }
        fn current(&mut self) -> f32 {
            1.0
        }
        fn power(&mut self) -> f32 {
            1.0
        }
        fn energy(&mut self) -> f32 {
            1.0
        }
        fn frequency(&mut self) -> f32 {
            50.0
        }
        fn pf(&mut self) -> f32 {
            1.0
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            sample_interval_ms: 20,
            enqueue_wait_ms: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize(230.5), 230.5);
        assert_eq!(sanitize(0.0), 0.0);
        assert_eq!(sanitize(-1.5), -1.5);
        assert_eq!(sanitize(f32::NAN), 0.0);
        assert_eq!(sanitize(f32::INFINITY), 0.0);
        assert_eq!(sanitize(f32::NEG_INFINITY), 0.0);
    }

    #[test]
    fn test_core_fields_nan_become_zero() {
        let mut meter = ScriptedMeter {
            values: [f32::NAN, f32::NAN, f32::NAN, f32::NAN, 50.0, 0.98],
        };
        let reading = take_reading(&mut meter);
        assert_eq!(reading.voltage, 0.0);
        assert_eq!(reading.current, 0.0);
        assert_eq!(reading.power, 0.0);
        assert_eq!(reading.energy, 0.0);
        assert_eq!(reading.frequency, 50.0);
        assert_eq!(reading.pf, 0.98);
    }

    #[test]
    fn test_frequency_and_pf_nan_become_zero() {
        let mut meter = ScriptedMeter {
            values: [220.1, 1.5, 330.0, 12.3, f32::NAN, f32::NAN],
        };
        let reading = take_reading(&mut meter);
        assert_eq!(reading.voltage, 220.1);
        assert_eq!(reading.frequency, 0.0);
        assert_eq!(reading.pf, 0.0);
        assert!(reading.to_wire().unwrap().contains(r#""frequency":0.0,"pf":0.0"#));
    }

    #[tokio::test]
    async fn test_sample_once_queues_sanitized_reading() {
        let (producer, mut consumer) = handoff_queue(10).unwrap();
        let (_handle, gate) = task_control("sampler");
        let meter = ScriptedMeter {
            values: [f32::NAN, 1.5, 330.0, 12.3, 50.0, 0.98],
        };
        let mut sampler = Sampler::new(meter, producer, gate, &fast_config());

        assert_eq!(sampler.sample_once().await, Offer::Queued);
        let reading = consumer.take(Duration::from_millis(10)).await.unwrap();
        assert_eq!(reading.voltage, 0.0);
        assert_eq!(reading.current, 1.5);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_reordering() {
        let (producer, mut consumer) = handoff_queue(2).unwrap();
        let (_handle, gate) = task_control("sampler");
        let mut sampler = Sampler::new(CountingMeter { next: 0.0 }, producer, gate, &fast_config());

        assert_eq!(sampler.sample_once().await, Offer::Queued);
        assert_eq!(sampler.sample_once().await, Offer::Queued);
        assert_eq!(sampler.sample_once().await, Offer::Dropped);

        let wait = Duration::from_millis(5);
        assert_eq!(consumer.take(wait).await.unwrap().voltage, 1.0);
        assert_eq!(sampler.sample_once().await, Offer::Queued);
        assert_eq!(consumer.take(wait).await.unwrap().voltage, 2.0);
        assert_eq!(consumer.take(wait).await.unwrap().voltage, 4.0);
        assert_eq!(consumer.dropped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_produces_one_reading_per_interval() {
        let (producer, mut consumer) = handoff_queue(10).unwrap();
        let (_handle, gate) = task_control("sampler");
        let config = PipelineConfig::default();
        let sampler = Sampler::new(CountingMeter { next: 0.0 }, producer, gate, &config);
        tokio::spawn(sampler.run());

        tokio::time::sleep(Duration::from_millis(6100)).await;
        // t = 0, 2000, 4000, 6000
        assert_eq!(consumer.len(), 4);
        for expected in 1..=4 {
            let r = consumer.take(Duration::from_millis(1)).await.unwrap();
            assert_eq!(r.voltage, expected as f32);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspended_sampler_stops_producing() {
        let (producer, mut consumer) = handoff_queue(10).unwrap();
        let (handle, gate) = task_control("sampler");
        let config = PipelineConfig::default();
        let sampler = Sampler::new(CountingMeter { next: 0.0 }, producer, gate, &config);
        tokio::spawn(sampler.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.suspend().unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        // only the reading taken before suspension
        assert_eq!(consumer.len(), 1);

        handle.resume().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(consumer.len(), 2);
        assert_eq!(consumer.take(Duration::from_millis(1)).await.unwrap().voltage, 1.0);
        assert_eq!(consumer.take(Duration::from_millis(1)).await.unwrap().voltage, 2.0);
    }
}
