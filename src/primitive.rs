//! Immutable scalar element (spec §3.3).

use crate::error::{Error, Result};
use crate::ticket::TimeTicket;

#[derive(Clone, Debug, PartialEq)]
pub enum PrimitiveValue {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Milliseconds since the Unix epoch, truncated (no sub-ms precision).
    Date(i64),
}

impl PrimitiveValue {
    /// Byte size used for document-size accounting: a fixed tag byte plus
    /// the payload's own footprint.
    pub fn data_size(&self) -> usize {
        1 + match self {
            PrimitiveValue::Null => 0,
            PrimitiveValue::Bool(_) => 1,
            PrimitiveValue::I32(_) => 4,
            PrimitiveValue::I64(_) => 8,
            PrimitiveValue::F64(_) => 8,
            PrimitiveValue::String(s) => s.len(),
            PrimitiveValue::Bytes(b) => b.len(),
            PrimitiveValue::Date(_) => 8,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CRDTPrimitive {
    created_at: TimeTicket,
    value: PrimitiveValue,
}

impl CRDTPrimitive {
    pub fn new(created_at: TimeTicket, value: PrimitiveValue) -> Result<Self> {
        if let PrimitiveValue::F64(f) = value {
            if !f.is_finite() {
                return Err(Error::invalid_argument("primitive f64 must be finite"));
            }
        }
        Ok(Self { created_at, value })
    }

    pub fn created_at(&self) -> TimeTicket {
        self.created_at
    }

    pub fn value(&self) -> &PrimitiveValue {
        &self.value
    }

    pub fn data_size(&self) -> usize {
        self.value.data_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::ActorId;

    fn t() -> TimeTicket {
        TimeTicket::new(1, 0, ActorId(1))
    }

    #[test]
    fn rejects_non_finite_f64() {
        assert!(CRDTPrimitive::new(t(), PrimitiveValue::F64(f64::NAN)).is_err());
    }

    #[test]
    fn data_size_accounts_for_payload() {
        let p = CRDTPrimitive::new(t(), PrimitiveValue::String("abc".into())).unwrap();
        assert_eq!(p.data_size(), 1 + 3);
    }
}
