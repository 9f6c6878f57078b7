//! Minimal BER codec for SNMPv2c GET exchanges.
//!
//! Only the subset needed for a single GetRequest/GetResponse round trip is
//! implemented: the message envelope, the two PDU types and the value types
//! agents commonly return for interface counters.

use super::{Oid, SnmpError};

/// SNMP version field value for v2c.
pub const VERSION_2C: i64 = 1;

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_COUNTER64: u8 = 0x46;
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;

/// PDU types used by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    GetRequest,
    GetResponse,
}

impl PduType {
    fn tag(self) -> u8 {
        match self {
            PduType::GetRequest => 0xa0,
            PduType::GetResponse => 0xa2,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xa0 => Some(PduType::GetRequest),
            0xa2 => Some(PduType::GetResponse),
            _ => None,
        }
    }
}

/// A variable binding value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    ObjectId(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

/// Numeric reading extracted from a variable binding, with the width of the
/// counter it came from.
///
/// `bits` is 32 for every numeric type except Counter64, which wraps at 2^64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterReading {
    pub value: u64,
    pub bits: u32,
}

impl Value {
    /// Interpret the value as a counter reading.
    pub fn as_counter(&self) -> Option<CounterReading> {
        let (value, bits) = match self {
            Value::Counter64(v) => (*v, 64),
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => (u64::from(*v), 32),
            Value::Integer(v) if *v >= 0 => (*v as u64, 32),
            _ => return None,
        };
        Some(CounterReading { value, bits })
    }

    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView
        )
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Value::Integer(v) => push_tlv(out, TAG_INTEGER, &encode_integer(*v)),
            Value::OctetString(bytes) => push_tlv(out, TAG_OCTET_STRING, bytes),
            Value::Null => push_tlv(out, TAG_NULL, &[]),
            Value::ObjectId(oid) => push_tlv(out, TAG_OID, &oid.encode_ber()),
            Value::IpAddress(addr) => push_tlv(out, TAG_IP_ADDRESS, addr),
            Value::Counter32(v) => push_tlv(out, TAG_COUNTER32, &encode_unsigned(u64::from(*v))),
            Value::Gauge32(v) => push_tlv(out, TAG_GAUGE32, &encode_unsigned(u64::from(*v))),
            Value::TimeTicks(v) => push_tlv(out, TAG_TIMETICKS, &encode_unsigned(u64::from(*v))),
            Value::Counter64(v) => push_tlv(out, TAG_COUNTER64, &encode_unsigned(*v)),
            Value::NoSuchObject => push_tlv(out, TAG_NO_SUCH_OBJECT, &[]),
            Value::NoSuchInstance => push_tlv(out, TAG_NO_SUCH_INSTANCE, &[]),
            Value::EndOfMibView => push_tlv(out, TAG_END_OF_MIB_VIEW, &[]),
        }
    }

    fn decode(tag: u8, content: &[u8]) -> Result<Self, SnmpError> {
        let value = match tag {
            TAG_INTEGER => Value::Integer(decode_integer(content)?),
            TAG_OCTET_STRING => Value::OctetString(content.to_vec()),
            TAG_NULL => Value::Null,
            TAG_OID => Value::ObjectId(decode_oid(content)?),
            TAG_IP_ADDRESS => {
                let addr: [u8; 4] = content
                    .try_into()
                    .map_err(|_| malformed("IpAddress must be 4 bytes"))?;
                Value::IpAddress(addr)
            }
            TAG_COUNTER32 => Value::Counter32(decode_u32(content)?),
            TAG_GAUGE32 => Value::Gauge32(decode_u32(content)?),
            TAG_TIMETICKS => Value::TimeTicks(decode_u32(content)?),
            TAG_COUNTER64 => Value::Counter64(decode_unsigned(content)?),
            TAG_NO_SUCH_OBJECT => Value::NoSuchObject,
            TAG_NO_SUCH_INSTANCE => Value::NoSuchInstance,
            TAG_END_OF_MIB_VIEW => Value::EndOfMibView,
            other => return Err(malformed(format!("unsupported value tag 0x{:02x}", other))),
        };
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    pub kind: PduType,
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<VarBind>,
}

/// A complete SNMP message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub version: i64,
    pub community: Vec<u8>,
    pub pdu: Pdu,
}

impl Message {
    /// Build a v2c GetRequest for a single OID.
    pub fn get_request(community: &str, request_id: i32, oid: Oid) -> Self {
        Self {
            version: VERSION_2C,
            community: community.as_bytes().to_vec(),
            pdu: Pdu {
                kind: PduType::GetRequest,
                request_id,
                error_status: 0,
                error_index: 0,
                varbinds: vec![VarBind {
                    oid,
                    value: Value::Null,
                }],
            },
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut varbinds = Vec::new();
        for vb in &self.pdu.varbinds {
            let mut entry = Vec::new();
            push_tlv(&mut entry, TAG_OID, &vb.oid.encode_ber());
            vb.value.encode(&mut entry);
            push_tlv(&mut varbinds, TAG_SEQUENCE, &entry);
        }

        let mut pdu = Vec::new();
        push_tlv(&mut pdu, TAG_INTEGER, &encode_integer(i64::from(self.pdu.request_id)));
        push_tlv(&mut pdu, TAG_INTEGER, &encode_integer(self.pdu.error_status));
        push_tlv(&mut pdu, TAG_INTEGER, &encode_integer(self.pdu.error_index));
        push_tlv(&mut pdu, TAG_SEQUENCE, &varbinds);

        let mut body = Vec::new();
        push_tlv(&mut body, TAG_INTEGER, &encode_integer(self.version));
        push_tlv(&mut body, TAG_OCTET_STRING, &self.community);
        push_tlv(&mut body, self.pdu.kind.tag(), &pdu);

        let mut out = Vec::with_capacity(body.len() + 4);
        push_tlv(&mut out, TAG_SEQUENCE, &body);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, SnmpError> {
        let mut outer = Reader::new(buf);
        let body = outer.expect(TAG_SEQUENCE)?;

        let mut r = Reader::new(body);
        let version = decode_integer(r.expect(TAG_INTEGER)?)?;
        let community = r.expect(TAG_OCTET_STRING)?.to_vec();

        let (tag, pdu_body) = r.read_tlv()?;
        let kind = PduType::from_tag(tag)
            .ok_or_else(|| malformed(format!("unexpected PDU type 0x{:02x}", tag)))?;

        let mut p = Reader::new(pdu_body);
        let request_id = decode_integer(p.expect(TAG_INTEGER)?)?;
        let request_id =
            i32::try_from(request_id).map_err(|_| malformed("request-id out of range"))?;
        let error_status = decode_integer(p.expect(TAG_INTEGER)?)?;
        let error_index = decode_integer(p.expect(TAG_INTEGER)?)?;

        let mut list = Reader::new(p.expect(TAG_SEQUENCE)?);
        let mut varbinds = Vec::new();
        while !list.is_empty() {
            let mut entry = Reader::new(list.expect(TAG_SEQUENCE)?);
            let oid = decode_oid(entry.expect(TAG_OID)?)?;
            let (vtag, vcontent) = entry.read_tlv()?;
            varbinds.push(VarBind {
                oid,
                value: Value::decode(vtag, vcontent)?,
            });
        }

        Ok(Self {
            version,
            community,
            pdu: Pdu {
                kind,
                request_id,
                error_status,
                error_index,
                varbinds,
            },
        })
    }
}

fn malformed(msg: impl Into<String>) -> SnmpError {
    SnmpError::Malformed(msg.into())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn byte(&mut self) -> Result<u8, SnmpError> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| malformed("unexpected end of data"))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), SnmpError> {
        let tag = self.byte()?;
        let first = self.byte()?;
        let len = if first < 0x80 {
            usize::from(first)
        } else {
            let n = usize::from(first & 0x7f);
            if n == 0 || n > 4 {
                return Err(malformed(format!("unsupported length form 0x{:02x}", first)));
            }
            let mut len = 0usize;
            for _ in 0..n {
                len = (len << 8) | usize::from(self.byte()?);
            }
            len
        };

        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| malformed(format!("length {} exceeds available data", len)))?;
        let content = &self.buf[self.pos..end];
        self.pos = end;
        Ok((tag, content))
    }

    fn expect(&mut self, tag: u8) -> Result<&'a [u8], SnmpError> {
        let (got, content) = self.read_tlv()?;
        if got != tag {
            return Err(malformed(format!(
                "expected tag 0x{:02x}, got 0x{:02x}",
                tag, got
            )));
        }
        Ok(content)
    }
}

fn push_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    push_length(out, content.len());
    out.extend_from_slice(content);
}

fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

fn encode_integer(v: i64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let mut start = 0;
    // Drop redundant sign octets, keeping the two's complement minimal.
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

fn encode_unsigned(v: u64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let skip = bytes
        .iter()
        .take(bytes.len() - 1)
        .take_while(|b| **b == 0)
        .count();
    let mut out = Vec::with_capacity(9);
    if bytes[skip] & 0x80 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&bytes[skip..]);
    out
}

fn decode_integer(content: &[u8]) -> Result<i64, SnmpError> {
    if content.is_empty() || content.len() > 8 {
        return Err(malformed(format!("invalid INTEGER length {}", content.len())));
    }
    let mut v: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in content {
        v = (v << 8) | i64::from(b);
    }
    Ok(v)
}

fn decode_unsigned(content: &[u8]) -> Result<u64, SnmpError> {
    if content.is_empty() || content.len() > 9 || (content.len() == 9 && content[0] != 0) {
        return Err(malformed(format!("invalid unsigned length {}", content.len())));
    }
    Ok(content.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn decode_u32(content: &[u8]) -> Result<u32, SnmpError> {
    u32::try_from(decode_unsigned(content)?).map_err(|_| malformed("32-bit value out of range"))
}

fn decode_oid(content: &[u8]) -> Result<Oid, SnmpError> {
    Oid::decode_ber(content).ok_or_else(|| malformed("invalid OBJECT IDENTIFIER"))
}
