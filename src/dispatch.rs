//! # Telemetry Dispatcher
//!
//! Wraps forwarded samples in a typed JSON envelope and sends them to the
//! downstream consumer as UDP datagrams. Delivery is best-effort: no retry
//! and no acknowledgment.

use serde::Serialize;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::error::Result;
use crate::telemetry::DataType;

/// Default downstream consumer address
pub const DEFAULT_FORWARD_TARGET: &str = "127.0.0.1:14552";

/// Outbound envelope: `{"type": "...", "data": {...}}`
#[derive(Debug, Serialize)]
pub struct Envelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    pub kind: DataType,
    pub data: &'a T,
}

/// Serialize a payload into an envelope datagram
pub fn encode_envelope<T: Serialize>(kind: DataType, data: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&Envelope { kind, data })?)
}

/// Fire-and-forget sender to the downstream consumer
#[derive(Debug)]
pub struct Dispatcher {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Dispatcher {
    /// Bind an ephemeral local socket for sending to `target`
    ///
    /// # Errors
    ///
    /// Returns error if no local socket can be bound
    pub async fn bind(target: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local).await?;
        debug!("Dispatcher bound to {} forwarding to {}", socket.local_addr()?, target);

        Ok(Self { socket, target })
    }

    /// Downstream consumer address
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send one envelope downstream
    ///
    /// Returns `false` if the payload could not be serialized or sent; the
    /// failure is logged and never propagated.
    pub async fn forward<T: Serialize>(&self, kind: DataType, payload: &T) -> bool {
        let bytes = match encode_envelope(kind, payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode {} envelope: {}", kind, e);
                return false;
            }
        };

        match self.socket.send_to(&bytes, self.target).await {
            Ok(_) => {
                debug!("Forwarded {} ({} bytes)", kind, bytes.len());
                true
            }
            Err(e) => {
                warn!("Failed to forward {} to {}: {}", kind, self.target, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{AttitudeData, GatedSample};
    use std::time::Duration;

    fn attitude() -> GatedSample {
        GatedSample::Attitude(AttitudeData {
            roll: 1.5,
            pitch: -2.0,
            yaw: 90.0,
            rollspeed: 0.0,
            pitchspeed: 0.0,
            yawspeed: 0.0,
            timestamp: 1_700_000_000_123,
        })
    }

    #[test]
    fn test_envelope_shape() {
        let bytes = encode_envelope(DataType::Attitude, &attitude()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["type"], "ATTITUDE");
        assert_eq!(value["data"]["roll"], 1.5);
        assert_eq!(value["data"]["yaw"], 90.0);
        assert_eq!(value["data"]["timestamp"], 1_700_000_000_123i64);
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_forward_delivers_datagram() {
        let consumer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dispatcher = Dispatcher::bind(consumer.local_addr().unwrap()).await.unwrap();

        assert!(dispatcher.forward(DataType::Attitude, &attitude()).await);

        let mut buf = [0u8; 2048];
        let (n, _) = tokio::time::timeout(Duration::from_secs(1), consumer.recv_from(&mut buf))
            .await
            .expect("datagram within 1s")
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(value["type"], "ATTITUDE");
    }

    #[tokio::test]
    async fn test_forward_failure_reports_false() {
        // IPv4 socket cannot send to an IPv6 destination
        let dispatcher = Dispatcher::bind("127.0.0.1:9".parse().unwrap()).await.unwrap();
        let unreachable = Dispatcher {
            socket: dispatcher.socket,
            target: "[::1]:9".parse().unwrap(),
        };

        assert!(!unreachable.forward(DataType::Gps, &attitude()).await);
    }
}
