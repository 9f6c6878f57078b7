//! SNMP support for the counter poller.
//!
//! Provides an SNMPv2c GET client built on raw UDP packets.

mod client;
mod codec;
mod oid;

pub use client::*;
pub use codec::*;
pub use oid::*;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// SNMP error types.
#[derive(Error, Debug)]
pub enum SnmpError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed packet: {0}")]
    Malformed(String),
    #[error("agent returned error-status {status} (index {index})")]
    Agent { status: i64, index: i64 },
    #[error("no such object: {0}")]
    NoSuchObject(Oid),
    #[error("value of {0} is not a counter")]
    NonNumeric(Oid),
}

/// Where to send a GET.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnmpTarget {
    pub host: String,
    pub port: u16,
    pub community: String,
}

/// A session able to fetch one counter value per call.
///
/// Injected into the SNMP poller so that tests can script readings.
#[async_trait]
pub trait SnmpSession: Send + Sync {
    async fn get(&self, target: &SnmpTarget, oid: &Oid) -> Result<CounterReading, SnmpError>;
}
