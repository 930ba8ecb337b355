//! Numeric counter element with monotonic, two's-complement `increase`
//! (spec §3.3, S6).

use crate::error::{Error, Result};
use crate::ticket::TimeTicket;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterValue {
    I32(i32),
    I64(i64),
}

impl CounterValue {
    fn type_name(&self) -> &'static str {
        match self {
            CounterValue::I32(_) => "i32",
            CounterValue::I64(_) => "i64",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CRDTCounter {
    created_at: TimeTicket,
    value: CounterValue,
}

impl CRDTCounter {
    pub fn new(created_at: TimeTicket, value: CounterValue) -> Self {
        Self { created_at, value }
    }

    pub fn created_at(&self) -> TimeTicket {
        self.created_at
    }

    pub fn value(&self) -> CounterValue {
        self.value
    }

    /// Add `delta` to the running value, wrapping on overflow (two's
    /// complement, no error) exactly like the underlying integer type.
    /// `delta` must match the counter's own numeric type.
    pub fn increase(&mut self, delta: CounterValue) -> Result<()> {
        self.value = match (self.value, delta) {
            (CounterValue::I32(cur), CounterValue::I32(d)) => CounterValue::I32(cur.wrapping_add(d)),
            (CounterValue::I64(cur), CounterValue::I64(d)) => CounterValue::I64(cur.wrapping_add(d)),
            (cur, d) => {
                return Err(Error::type_error(format!(
                    "cannot increase {} counter by {} value",
                    cur.type_name(),
                    d.type_name()
                )))
            }
        };
        Ok(())
    }

    pub fn data_size(&self) -> usize {
        1 + match self.value {
            CounterValue::I32(_) => 4,
            CounterValue::I64(_) => 8,
        }
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
    fn increase_wraps_on_i32_overflow() {
        // S6 from spec: i32 counter at i32::MAX, increase by 1 wraps to i32::MIN.
        let mut counter = CRDTCounter::new(t(), CounterValue::I32(i32::MAX));
        counter.increase(CounterValue::I32(1)).unwrap();
        assert_eq!(counter.value(), CounterValue::I32(i32::MIN));
    }

    #[test]
    fn increase_rejects_mismatched_type() {
        let mut counter = CRDTCounter::new(t(), CounterValue::I32(1));
        assert!(counter.increase(CounterValue::I64(1)).is_err());
    }
}
