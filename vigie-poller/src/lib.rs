//! Vigie poller - polling-and-aggregation core for a fleet of radio
//! air-quality sensors.
//!
//! The daemon cycles over a fixed, configuration-ordered fleet, reads each
//! device through the radio gateway, forwards every outcome to the sink's
//! real-time path, and periodically compacts buffered readings into
//! historic averages. Per-device circuit breakers bound the I/O wasted on
//! unreachable devices without stalling the rest of the fleet.

pub mod breaker;
pub mod config;
pub mod reader;
pub mod reading;
pub mod scheduler;
pub mod sink;

pub use breaker::{Circuit, FailureTracker, PollDecision};
pub use config::{DeviceAddr, EndpointMap, PollerConfig};
pub use reader::{CoordinatorClient, DeviceReader, ReadError};
pub use reading::{MetricSet, ReadingBuffer, Sample, SENTINEL};
pub use scheduler::PollScheduler;
pub use sink::{MqttSink, SensorRecord, Sink, SinkError};
