//! `IPv4` and `IPv6` columns.
//!
//! `IPv4` is a UInt32 in host order (little-endian on the wire, so
//! `1.2.3.4` serializes as `04 03 02 01`). `IPv6` is the 16 address bytes
//! exactly as they appear in the address.

use super::{
    conversion_error,
    Column,
    ColumnRef,
};
use crate::{
    types::Type,
    value::Value,
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    BytesMut,
};
use std::net::{
    Ipv4Addr,
    Ipv6Addr,
};

/// IPv4 column.
pub struct ColumnIpv4 {
    type_: Type,
    data: Vec<u32>,
}

impl ColumnIpv4 {
    pub fn new() -> Self {
        Self { type_: Type::ipv4(), data: Vec::new() }
    }

    pub fn append(&mut self, addr: Ipv4Addr) {
        self.data.push(u32::from(addr));
    }

    pub fn at(&self, index: usize) -> Ipv4Addr {
        Ipv4Addr::from(self.data[index])
    }
}

impl Default for ColumnIpv4 {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnIpv4 {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        let addr = match value {
            Value::Ipv4(v) => Some(*v),
            Value::String(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<Ipv4Addr>().ok())
                .map(u32::from),
            other => other.as_uint().and_then(|v| u32::try_from(v).ok()),
        }
        .ok_or_else(|| conversion_error(&self.type_, value))?;
        self.data.push(addr);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        self.data.get(index).map(|&v| Value::Ipv4(v)).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Row {} out of bounds (size: {})",
                index,
                self.data.len()
            ))
        })
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        if buffer.len() < rows * 4 {
            return Err(Error::ShortRead {
                needed: rows * 4,
                available: buffer.len(),
            });
        }
        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(buffer.get_u32_le());
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for &addr in &self.data {
            buffer.put_u32_le(addr);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnIpv4::new())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// IPv6 column.
pub struct ColumnIpv6 {
    type_: Type,
    data: Vec<[u8; 16]>,
}

impl ColumnIpv6 {
    pub fn new() -> Self {
        Self { type_: Type::ipv6(), data: Vec::new() }
    }

    pub fn append(&mut self, addr: Ipv6Addr) {
        self.data.push(addr.octets());
    }

    pub fn at(&self, index: usize) -> Ipv6Addr {
        Ipv6Addr::from(self.data[index])
    }
}

impl Default for ColumnIpv6 {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnIpv6 {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        let octets = match value {
            Value::Ipv6(octets) => Some(*octets),
            Value::String(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<Ipv6Addr>().ok())
                .map(|addr| addr.octets()),
            _ => None,
        }
        .ok_or_else(|| conversion_error(&self.type_, value))?;
        self.data.push(octets);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        self.data.get(index).map(|&v| Value::Ipv6(v)).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Row {} out of bounds (size: {})",
                index,
                self.data.len()
            ))
        })
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        if buffer.len() < rows * 16 {
            return Err(Error::ShortRead {
                needed: rows * 16,
                available: buffer.len(),
            });
        }
        self.data.reserve(rows);
        for _ in 0..rows {
            let mut octets = [0u8; 16];
            buffer.copy_to_slice(&mut octets);
            self.data.push(octets);
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for octets in &self.data {
            buffer.put_slice(octets);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnIpv6::new())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_wire_layout() {
        let mut col = ColumnIpv4::new();
        col.append("1.2.3.4".parse().unwrap());

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();
        assert_eq!(&buf[..], &[4, 3, 2, 1]);

        let mut col2 = ColumnIpv4::new();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 1).unwrap();
        assert_eq!(col2.at(0), "1.2.3.4".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn test_ipv6_roundtrip() {
        let addr: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let mut col = ColumnIpv6::new();
        col.append(addr);

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[..], &addr.octets());

        let mut col2 = ColumnIpv6::new();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 1).unwrap();
        assert_eq!(col2.at(0), addr);
    }

    #[test]
    fn test_append_value_from_string() {
        let mut v4 = ColumnIpv4::new();
        v4.append_value(&Value::from("127.0.0.1")).unwrap();
        assert_eq!(v4.at(0), Ipv4Addr::LOCALHOST);

        let mut v6 = ColumnIpv6::new();
        v6.append_value(&Value::from("::1")).unwrap();
        assert_eq!(v6.at(0), Ipv6Addr::LOCALHOST);

        assert!(v4.append_value(&Value::from("not an ip")).is_err());
    }
}
