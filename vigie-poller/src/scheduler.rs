//! Poll scheduler: the unbounded cycle loop over the configured fleet.
//!
//! Each cycle walks the devices in configuration order, gates every attempt
//! through its circuit breaker, forwards the outcome to the sink's real-time
//! path, and every `value_historic_interval` cycles flushes the reading
//! buffers into historic aggregates. One device failing never aborts the
//! cycle for the others.

use crate::breaker::{Circuit, FailureTracker, PollDecision};
use crate::config::{DeviceAddr, EndpointMap, PollConfig, PollerConfig};
use crate::reader::DeviceReader;
use crate::reading::{MetricSet, ReadingBuffer};
use crate::sink::Sink;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Below this many connected devices a cycle is followed by a pause; at or
/// above it the reads themselves dominate the cycle and the loop proceeds
/// immediately.
pub const PACING_THRESHOLD: usize = 3;
pub const PACING_PAUSE: Duration = Duration::from_secs(1);

/// Mutable per-device registry entry, created once at startup.
#[derive(Debug)]
pub struct DeviceState {
    pub addr: DeviceAddr,
    /// 1-based ordinal, configuration order.
    pub index: usize,
    pub tracker: FailureTracker,
    /// Outcome of the most recent attempted read; all-unavailable until the
    /// first attempt.
    pub current: MetricSet,
    pub buffer: ReadingBuffer,
}

pub struct PollScheduler<R, S> {
    poll: PollConfig,
    endpoints: EndpointMap,
    devices: Vec<DeviceState>,
    reader: R,
    sink: S,
    cycle: u64,
}

impl<R: DeviceReader, S: Sink> PollScheduler<R, S> {
    pub fn new(config: &PollerConfig, reader: R, sink: S) -> Self {
        let devices = config
            .devices
            .iter()
            .enumerate()
            .map(|(i, addr)| DeviceState {
                addr: addr.clone(),
                index: i + 1,
                tracker: FailureTracker::new(config.poll.max_failures),
                current: MetricSet::unavailable(config.endpoints.keys()),
                buffer: ReadingBuffer::default(),
            })
            .collect();

        PollScheduler {
            poll: config.poll.clone(),
            endpoints: config.endpoints.clone(),
            devices,
            reader,
            sink,
            cycle: 0,
        }
    }

    pub fn devices(&self) -> &[DeviceState] {
        &self.devices
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Run cycles until cancelled from the outside (shutdown signal).
    pub async fn run(&mut self) {
        info!(
            "Starting poll loop over {} devices ({} metrics each)",
            self.devices.len(),
            self.endpoints.len()
        );
        loop {
            let connected = self.run_cycle().await;
            if needs_pacing_pause(connected) {
                tokio::time::sleep(PACING_PAUSE).await;
            }
        }
    }

    /// One full pass over the fleet. Returns the connected-device count,
    /// which drives the pacing decision between cycles.
    pub async fn run_cycle(&mut self) -> usize {
        self.cycle += 1;
        let mut connected = 0;

        for i in 0..self.devices.len() {
            let device = &mut self.devices[i];
            debug!(
                "Checking device {} ({}), failure count: {}",
                device.index,
                device.addr,
                device.tracker.failures()
            );

            match device.tracker.decide(self.cycle, self.poll.retry_interval) {
                PollDecision::Skip => {
                    debug!(
                        "Device {} ({}) circuit open, skipping attempts",
                        device.index, device.addr
                    );
                    continue;
                }
                PollDecision::Probe => {
                    info!("Retrying connection for device {} ({})", device.index, device.addr);
                }
                PollDecision::Read => {}
            }

            match self.reader.read(&device.addr, &self.endpoints).await {
                Ok(values) => {
                    connected += 1;
                    device.tracker.record_success();
                    device.current = values;
                    device.buffer.record(&device.current);

                    if let Err(e) = self.sink.write_realtime(&device.current, device.index).await {
                        error!(
                            "Real-time write failed for device {}: {e}",
                            device.index
                        );
                    }
                    self.sink.notify(&device.current, device.index).await;
                }
                Err(e) => {
                    warn!(
                        "Error handling device {} ({}): {e}",
                        device.index, device.addr
                    );

                    // Downstream consumers see the outage, not stale values.
                    device.current = MetricSet::unavailable(self.endpoints.keys());
                    if let Err(e) = self.sink.write_realtime(&device.current, device.index).await {
                        error!(
                            "Real-time write failed for device {}: {e}",
                            device.index
                        );
                    }
                    self.sink.notify(&device.current, device.index).await;

                    device.tracker.record_failure();
                    if device.tracker.circuit() == Circuit::Open {
                        info!(
                            "Device {} ({}) exceeded {} consecutive failures, circuit open",
                            device.index,
                            device.addr,
                            self.poll.max_failures
                        );
                    }
                }
            }
        }

        if self.cycle % self.poll.value_historic_interval == 0 {
            self.flush_historics().await;
        }

        connected
    }

    /// Aggregate and flush every device with buffered data, whether or not
    /// it was read this cycle.
    async fn flush_historics(&mut self) {
        for device in &mut self.devices {
            let Some(aggregate) = device.buffer.flush() else {
                continue;
            };
            debug!("Flushing historic aggregate for device {}", device.index);
            if let Err(e) = self.sink.write_historic(&aggregate, device.index).await {
                error!("Historic write failed for device {}: {e}", device.index);
            }
        }
    }

    /// Hand back the reader and sink for the shutdown sequence.
    pub fn into_parts(self) -> (R, S) {
        (self.reader, self.sink)
    }
}

fn needs_pacing_pause(connected: usize) -> bool {
    connected < PACING_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacing_pause_kicks_in_below_three_connected() {
        assert!(needs_pacing_pause(0));
        assert!(needs_pacing_pause(2));
        assert!(!needs_pacing_pause(3));
        assert!(!needs_pacing_pause(5));
    }
}
