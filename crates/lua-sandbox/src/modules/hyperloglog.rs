//! `hyperloglog` extension — §4.6 registration contract only.
//!
//! A simplified fixed-precision HyperLogLog cardinality estimator exposed
//! as `mlua` userdata. As with [`super::bloom_filter`], §1 scopes this down
//! to "beyond their registration contract" — a working `new`/`add`/`count`
//! is owed, not a harmonic-mean bias-correction table tuned against Google's
//! published constants.

use mlua::{Lua, Table, UserData, UserDataMethods};

const PRECISION: u32 = 14; // 2^14 = 16384 registers, ~0.8% standard error.
const NUM_REGISTERS: usize = 1 << PRECISION;

struct HyperLogLog {
    registers: Vec<u8>,
}

fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

impl HyperLogLog {
    fn new() -> Self {
        Self {
            registers: vec![0u8; NUM_REGISTERS],
        }
    }

    fn add(&mut self, item: &[u8]) {
        let hash = fnv1a_64(item);
        let index = (hash >> (64 - PRECISION)) as usize;
        let rest = (hash << PRECISION) | (1 << (PRECISION - 1));
        let rank = rest.leading_zeros() as u8 + 1;
        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    fn count(&self) -> f64 {
        let m = NUM_REGISTERS as f64;
        let alpha = 0.7213 / (1.0 + 1.079 / m);
        let sum: f64 = self.registers.iter().map(|&r| 2f64.powi(-(i32::from(r)))).sum();
        let raw = alpha * m * m / sum;

        if raw <= 2.5 * m {
            let zeros = self.registers.iter().filter(|&&r| r == 0).count();
            if zeros > 0 {
                return m * (m / zeros as f64).ln();
            }
        }
        raw
    }
}

impl UserData for HyperLogLog {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method_mut("add", |_, this, item: mlua::String| {
            this.add(&item.as_bytes());
            Ok(())
        });
        methods.add_method("count", |_, this, ()| Ok(this.count()));
    }
}

/// Builds the guest-visible `hyperloglog` table: `new()`.
pub fn build(lua: &Lua) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("new", lua.create_function(|_, ()| Ok(HyperLogLog::new()))?)?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_counts_near_zero() {
        let hll = HyperLogLog::new();
        assert!(hll.count() < 1.0);
    }

    #[test]
    fn distinct_items_estimate_within_tolerance() {
        let mut hll = HyperLogLog::new();
        for i in 0..10_000 {
            hll.add(format!("item-{i}").as_bytes());
        }
        let estimate = hll.count();
        let error = (estimate - 10_000.0).abs() / 10_000.0;
        assert!(error < 0.1, "estimate {estimate} too far from 10000");
    }

    #[test]
    fn repeated_adds_do_not_inflate_count() {
        let mut hll = HyperLogLog::new();
        for _ in 0..1000 {
            hll.add(b"same-value");
        }
        assert!(hll.count() < 5.0);
    }
}
