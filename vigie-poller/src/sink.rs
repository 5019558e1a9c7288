//! Persistence/notification sink.
//!
//! Real-time and historic records are published as JSON contracts on
//! versioned MQTT topics over one shared client whose connection is
//! established lazily and reused for the whole run. The notification path
//! is an HTTP POST fired on a detached task: best-effort by contract, its
//! failures are logged and swallowed, never surfaced to the poll loop.

use crate::config::SinkConfig;
use crate::reading::MetricSet;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

const REALTIME_TOPIC: &str = "vigie/sensors/realtime@v1";
const HISTORIC_TOPIC: &str = "vigie/sensors/historic@v1";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("mqtt publish failed: {0}")]
    Publish(#[from] rumqttc::ClientError),
    #[error("record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("sink connection closed")]
    Closed,
}

/// Sensor record published on the persistence topics; the notification
/// payload has the same shape.
#[derive(Debug, Clone, Serialize)]
pub struct SensorRecord {
    pub device: usize,
    pub values: MetricSet,
    pub timestamp: DateTime<Utc>,
}

/// Persistence + notification seam for the scheduler.
///
/// The two write paths report their failures; `notify` is infallible by
/// signature because the contract is fire-and-forget.
#[allow(async_fn_in_trait)]
pub trait Sink {
    async fn write_realtime(&self, values: &MetricSet, device: usize) -> Result<(), SinkError>;
    async fn write_historic(&self, values: &MetricSet, device: usize) -> Result<(), SinkError>;
    async fn notify(&self, values: &MetricSet, device: usize);
}

pub struct MqttSink {
    client: AsyncClient,
    http: reqwest::Client,
    notify_url: String,
}

impl MqttSink {
    /// Set up the shared MQTT client and the notification HTTP client.
    ///
    /// The broker connection itself is established lazily by the event
    /// loop; publishes queue until it is up.
    pub fn connect(config: &SinkConfig) -> Result<Self> {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| "vigie-poller".to_string());

        let mut mqtt_options =
            MqttOptions::new(&client_id, &config.broker_host, config.broker_port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));
        mqtt_options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);

        // Drive the connection in the background for the whole run.
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT connection error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .context("failed to build notification HTTP client")?;

        Ok(MqttSink {
            client,
            http,
            notify_url: config.notify_url.clone(),
        })
    }

    /// Release the broker connection during graceful shutdown.
    pub async fn close(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("MQTT disconnect failed: {e}");
        }
    }

    async fn publish(
        &self,
        topic_base: &str,
        values: &MetricSet,
        device: usize,
    ) -> Result<(), SinkError> {
        let record = SensorRecord {
            device,
            values: values.clone(),
            timestamp: Utc::now(),
        };
        let payload = serde_json::to_string(&record)?;

        self.client
            .publish(
                format!("{topic_base}/{device}"),
                QoS::AtLeastOnce,
                false,
                payload,
            )
            .await?;
        Ok(())
    }
}

impl Sink for MqttSink {
    async fn write_realtime(&self, values: &MetricSet, device: usize) -> Result<(), SinkError> {
        self.publish(REALTIME_TOPIC, values, device).await
    }

    async fn write_historic(&self, values: &MetricSet, device: usize) -> Result<(), SinkError> {
        self.publish(HISTORIC_TOPIC, values, device).await
    }

    async fn notify(&self, values: &MetricSet, device: usize) {
        let payload = SensorRecord {
            device,
            values: values.clone(),
            timestamp: Utc::now(),
        };
        let http = self.http.clone();
        let url = self.notify_url.clone();

        // Detached on purpose: the poll loop never waits on the outcome.
        tokio::spawn(async move {
            match http.post(&url).json(&payload).send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(_) => debug!("Notification sent for device {}", payload.device),
                    Err(e) => error!("HTTP POST request failed: {e}"),
                },
                Err(e) => error!("HTTP POST request failed: {e}"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Sample;

    #[test]
    fn record_serializes_with_sentinel_values() {
        let values: MetricSet = [
            ("temperature".to_string(), Sample::Value(21.0)),
            ("co2".to_string(), Sample::Unavailable),
        ]
        .into_iter()
        .collect();

        let record = SensorRecord {
            device: 2,
            values,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["device"], 2);
        assert_eq!(json["values"]["temperature"], 21.0);
        assert_eq!(json["values"]["co2"], -1.0);
        assert!(json["timestamp"].is_string());
    }
}
