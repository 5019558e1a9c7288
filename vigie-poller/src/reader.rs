//! Device reader seam and the radio gateway client behind it.
//!
//! The radio stack itself lives in a separate gateway daemon; this module
//! only speaks its line-delimited JSON protocol over TCP. One request line
//! per read, one reply line back, under a per-read timeout. The serial
//! settings from the config are forwarded verbatim in the `open` handshake
//! and are otherwise opaque to the poller.

use crate::config::{DeviceAddr, EndpointMap, TransportConfig};
use crate::reading::{MetricSet, Sample};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ReadError {
    /// The gateway reports the device as unreachable.
    #[error("device not connected")]
    NotConnected,
    #[error("device read timed out")]
    Timeout,
    #[error("gateway i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("gateway protocol error: {0}")]
    Protocol(String),
}

/// Capability of reading one device's current metric samples.
#[allow(async_fn_in_trait)]
pub trait DeviceReader {
    async fn read(
        &mut self,
        device: &DeviceAddr,
        endpoints: &EndpointMap,
    ) -> Result<MetricSet, ReadError>;
}

#[derive(Debug, Serialize)]
struct OpenRequest<'a> {
    op: &'static str,
    path: &'a str,
    baud: u32,
}

#[derive(Debug, Serialize)]
struct ReadRequest<'a> {
    op: &'static str,
    device: &'a DeviceAddr,
    endpoints: &'a EndpointMap,
}

#[derive(Debug, Serialize)]
struct CloseRequest {
    op: &'static str,
}

#[derive(Debug, Deserialize)]
struct GatewayReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    values: Option<BTreeMap<String, Sample>>,
}

/// TCP client for the radio gateway daemon.
pub struct CoordinatorClient {
    stream: BufReader<TcpStream>,
    read_timeout: Duration,
}

impl CoordinatorClient {
    /// Connect to the gateway and open the radio transport.
    ///
    /// Any error here is fatal for the process: without the controller
    /// resource the poll loop is never entered.
    pub async fn connect(config: &TransportConfig) -> Result<Self> {
        info!("Connecting to radio gateway at {}", config.gateway_addr);

        let stream = TcpStream::connect(&config.gateway_addr)
            .await
            .with_context(|| format!("failed to reach gateway at {}", config.gateway_addr))?;

        let mut client = CoordinatorClient {
            stream: BufReader::new(stream),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
        };

        let reply = client
            .round_trip(&OpenRequest {
                op: "open",
                path: &config.serial_path,
                baud: config.baud_rate,
            })
            .await
            .context("gateway open handshake failed")?;
        if !reply.ok {
            anyhow::bail!(
                "gateway refused to open transport: {}",
                reply.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        info!(
            "Radio transport open ({} @ {} baud)",
            config.serial_path, config.baud_rate
        );
        Ok(client)
    }

    /// Close the radio transport and drop the connection.
    ///
    /// Part of the graceful-shutdown path; failures here are logged and
    /// ignored so shutdown still exits cleanly.
    pub async fn close(mut self) {
        if let Err(e) = self.round_trip(&CloseRequest { op: "close" }).await {
            debug!("Gateway close request failed: {e}");
        }
        if let Err(e) = self.stream.get_mut().shutdown().await {
            debug!("Gateway socket shutdown failed: {e}");
        }
        info!("Radio gateway connection closed");
    }

    /// Send one request line and await one reply line under the timeout.
    async fn round_trip<T: Serialize>(&mut self, request: &T) -> Result<GatewayReply, ReadError> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| ReadError::Protocol(format!("request encoding failed: {e}")))?;
        line.push('\n');
        self.stream.write_all(line.as_bytes()).await?;

        let mut reply_line = String::new();
        let n = tokio::time::timeout(self.read_timeout, self.stream.read_line(&mut reply_line))
            .await
            .map_err(|_| ReadError::Timeout)??;
        if n == 0 {
            return Err(ReadError::Protocol("gateway closed the connection".into()));
        }

        serde_json::from_str(reply_line.trim_end())
            .map_err(|e| ReadError::Protocol(format!("malformed reply: {e}")))
    }
}

impl DeviceReader for CoordinatorClient {
    async fn read(
        &mut self,
        device: &DeviceAddr,
        endpoints: &EndpointMap,
    ) -> Result<MetricSet, ReadError> {
        let reply = self
            .round_trip(&ReadRequest {
                op: "read",
                device,
                endpoints,
            })
            .await?;

        if !reply.ok {
            return match reply.error.as_deref() {
                Some("not_connected") => Err(ReadError::NotConnected),
                Some(other) => Err(ReadError::Protocol(other.to_string())),
                None => Err(ReadError::Protocol("gateway reported failure".into())),
            };
        }

        let values = reply
            .values
            .ok_or_else(|| ReadError::Protocol("reply carries no values".into()))?;

        // The metric key set is closed: overlay the reply onto the schema so
        // missing metrics come back as the sentinel, and anything the
        // gateway sends outside the schema is dropped.
        let mut set = MetricSet::unavailable(endpoints.keys());
        for (name, sample) in values {
            if endpoints.contains_key(&name) {
                set.insert(name, sample);
            } else {
                warn!("Gateway returned unknown metric {name} for {device}, ignoring");
            }
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn fake_gateway(replies: Vec<String>) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut stream = BufReader::new(stream);
            for reply in replies {
                let mut request = String::new();
                if stream.read_line(&mut request).await.unwrap() == 0 {
                    break;
                }
                stream.write_all(reply.as_bytes()).await.unwrap();
                stream.write_all(b"\n").await.unwrap();
            }
        });
        addr
    }

    fn transport_config(addr: std::net::SocketAddr) -> TransportConfig {
        TransportConfig {
            gateway_addr: addr.to_string(),
            serial_path: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 1_000,
        }
    }

    fn schema() -> EndpointMap {
        [("temperature".to_string(), 1u8), ("co2".to_string(), 4u8)]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn connect_then_read_overlays_the_schema() {
        let addr = fake_gateway(vec![
            r#"{"ok":true}"#.to_string(),
            r#"{"ok":true,"values":{"temperature":21.5,"co2":-1}}"#.to_string(),
        ])
        .await;

        let mut client = CoordinatorClient::connect(&transport_config(addr)).await.unwrap();
        let device: DeviceAddr = "74:4d:bd:ff:fe:60:1e:ba".parse().unwrap();
        let set = client.read(&device, &schema()).await.unwrap();

        assert_eq!(set.get("temperature"), Some(Sample::Value(21.5)));
        assert_eq!(set.get("co2"), Some(Sample::Unavailable));
    }

    #[tokio::test]
    async fn partial_reply_fills_missing_metrics_with_sentinel() {
        let addr = fake_gateway(vec![
            r#"{"ok":true}"#.to_string(),
            r#"{"ok":true,"values":{"temperature":18.0}}"#.to_string(),
        ])
        .await;

        let mut client = CoordinatorClient::connect(&transport_config(addr)).await.unwrap();
        let device: DeviceAddr = "74:4d:bd:ff:fe:60:1e:ba".parse().unwrap();
        let set = client.read(&device, &schema()).await.unwrap();

        assert_eq!(set.get("temperature"), Some(Sample::Value(18.0)));
        assert_eq!(set.get("co2"), Some(Sample::Unavailable));
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn not_connected_reply_maps_to_read_error() {
        let addr = fake_gateway(vec![
            r#"{"ok":true}"#.to_string(),
            r#"{"ok":false,"error":"not_connected"}"#.to_string(),
        ])
        .await;

        let mut client = CoordinatorClient::connect(&transport_config(addr)).await.unwrap();
        let device: DeviceAddr = "74:4d:bd:ff:fe:60:1e:ba".parse().unwrap();
        let err = client.read(&device, &schema()).await.unwrap_err();
        assert!(matches!(err, ReadError::NotConnected));
    }

    #[tokio::test]
    async fn refused_open_is_a_fatal_connect_error() {
        let addr = fake_gateway(vec![
            r#"{"ok":false,"error":"port busy"}"#.to_string(),
        ])
        .await;

        let result = CoordinatorClient::connect(&transport_config(addr)).await;
        assert!(result.is_err());
    }
}
