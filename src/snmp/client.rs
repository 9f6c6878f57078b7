//! UDP implementation of [`SnmpSession`].

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use super::{CounterReading, Message, Oid, PduType, SnmpError, SnmpSession, SnmpTarget};

/// Default timeout of a single GET.
pub const DEFAULT_SNMP_TIMEOUT: Duration = Duration::from_secs(2);

const MAX_DATAGRAM: usize = 65_535;

/// SNMPv2c session that opens a fresh UDP socket per request.
///
/// There are no retries: a lost datagram surfaces as [`SnmpError::Timeout`]
/// and the caller simply tries again on its next tick.
#[derive(Debug, Clone)]
pub struct UdpSnmpSession {
    timeout: Duration,
}

impl Default for UdpSnmpSession {
    fn default() -> Self {
        Self::new(DEFAULT_SNMP_TIMEOUT)
    }
}

impl UdpSnmpSession {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn exchange(&self, target: &SnmpTarget, oid: &Oid) -> Result<Message, SnmpError> {
        let addr = resolve(target).await?;
        let bind_addr = if addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };

        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| SnmpError::Network(format!("failed to bind socket: {}", e)))?;
        socket
            .connect(addr)
            .await
            .map_err(|e| SnmpError::Network(format!("failed to connect: {}", e)))?;

        let request_id = rand::random::<i32>() & 0x7fff_ffff;
        let request = Message::get_request(&target.community, request_id, oid.clone());
        socket
            .send(&request.encode())
            .await
            .map_err(|e| SnmpError::Network(format!("failed to send: {}", e)))?;

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let n = socket
                .recv(&mut buf)
                .await
                .map_err(|e| SnmpError::Network(format!("failed to recv: {}", e)))?;

            let response = match Message::decode(&buf[..n]) {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!("SNMP: discarding undecodable datagram from {}: {}", addr, e);
                    continue;
                }
            };

            // Late replies to an earlier request on a reused port are ignored.
            if response.pdu.kind == PduType::GetResponse && response.pdu.request_id == request_id {
                return Ok(response);
            }
        }
    }
}

#[async_trait]
impl SnmpSession for UdpSnmpSession {
    async fn get(&self, target: &SnmpTarget, oid: &Oid) -> Result<CounterReading, SnmpError> {
        let response = tokio::time::timeout(self.timeout, self.exchange(target, oid))
            .await
            .map_err(|_| SnmpError::Timeout(self.timeout))??;

        extract_reading(&response, oid)
    }
}

async fn resolve(target: &SnmpTarget) -> Result<SocketAddr, SnmpError> {
    tokio::net::lookup_host((target.host.as_str(), target.port))
        .await
        .map_err(|e| SnmpError::Network(format!("failed to resolve {}: {}", target.host, e)))?
        .next()
        .ok_or_else(|| SnmpError::Network(format!("no addresses found for {}", target.host)))
}

/// Validate a GetResponse and pull the counter for `oid` out of it.
fn extract_reading(response: &Message, oid: &Oid) -> Result<CounterReading, SnmpError> {
    let pdu = &response.pdu;
    if pdu.error_status != 0 {
        return Err(SnmpError::Agent {
            status: pdu.error_status,
            index: pdu.error_index,
        });
    }

    let vb = pdu
        .varbinds
        .iter()
        .find(|vb| &vb.oid == oid)
        .ok_or_else(|| SnmpError::NoSuchObject(oid.clone()))?;

    if vb.value.is_exception() {
        return Err(SnmpError::NoSuchObject(oid.clone()));
    }

    vb.value
        .as_counter()
        .ok_or_else(|| SnmpError::NonNumeric(oid.clone()))
}
