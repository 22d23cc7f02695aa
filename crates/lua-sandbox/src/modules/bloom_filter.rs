//! `bloom_filter` extension — §4.6 registration contract only.
//!
//! A fixed-size bit-vector Bloom filter exposed as an `mlua` userdata.
//! Out of scope per §1 ("specific data-structure extensions... beyond
//! their registration contract") means this crate owes guest code a
//! working `require("bloom_filter").new(...)` with `add`/`check`/`clear`,
//! not a particular hash family or false-positive-rate tuning API.

use mlua::{Lua, Table, UserData, UserDataMethods};

/// Two independent 64-bit hashes (double hashing) derived from FNV-1a, the
/// same technique the reference `lua_bloom_filter` extension uses to avoid
/// needing `k` distinct hash functions.
struct BloomFilter {
    bits: Vec<u64>,
    n_bits: usize,
    n_hashes: u32,
}

fn fnv1a(seed: u64, data: &[u8]) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

impl BloomFilter {
    fn new(n_bits: usize, n_hashes: u32) -> Self {
        let words = n_bits.div_ceil(64).max(1);
        Self {
            bits: vec![0u64; words],
            n_bits: n_bits.max(1),
            n_hashes: n_hashes.max(1),
        }
    }

    fn positions(&self, item: &[u8]) -> impl Iterator<Item = usize> + '_ {
        let h1 = fnv1a(0, item);
        let h2 = fnv1a(0x9e3779b97f4a7c15, item);
        (0..self.n_hashes).map(move |i| {
            (h1.wrapping_add(u64::from(i).wrapping_mul(h2)) as usize) % self.n_bits
        })
    }

    fn add(&mut self, item: &[u8]) {
        for pos in self.positions(item) {
            self.bits[pos / 64] |= 1 << (pos % 64);
        }
    }

    fn check(&self, item: &[u8]) -> bool {
        self.positions(item).all(|pos| self.bits[pos / 64] & (1 << (pos % 64)) != 0)
    }

    fn clear(&mut self) {
        for word in &mut self.bits {
            *word = 0;
        }
    }
}

impl UserData for BloomFilter {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method_mut("add", |_, this, item: mlua::String| {
            this.add(&item.as_bytes());
            Ok(())
        });
        methods.add_method("check", |_, this, item: mlua::String| Ok(this.check(&item.as_bytes())));
        methods.add_method_mut("clear", |_, this, ()| {
            this.clear();
            Ok(())
        });
    }
}

/// Builds the guest-visible `bloom_filter` table: `new(n_bits, n_hashes)`.
pub fn build(lua: &Lua) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set(
        "new",
        lua.create_function(|_, (n_bits, n_hashes): (usize, Option<u32>)| {
            Ok(BloomFilter::new(n_bits, n_hashes.unwrap_or(4)))
        })?,
    )?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_item_checks_positive() {
        let mut filter = BloomFilter::new(1024, 4);
        filter.add(b"hello");
        assert!(filter.check(b"hello"));
    }

    #[test]
    fn clear_resets_membership() {
        let mut filter = BloomFilter::new(1024, 4);
        filter.add(b"hello");
        filter.clear();
        assert!(!filter.check(b"hello"));
    }

    #[test]
    fn unrelated_items_usually_check_negative() {
        let mut filter = BloomFilter::new(4096, 4);
        filter.add(b"a");
        assert!(!filter.check(b"completely-different-value"));
    }
}
