//! `circular_buffer` extension — §4.5 and §4.6.
//!
//! A fixed-size rows×columns ring of numeric time-series samples, exposed
//! as `mlua` userdata. This is the one extension type the serializer
//! dispatch table (§4.5) names directly ("extension (circular buffer) →
//! type-specific dump into the output buffer"), so unlike `lpeg`/`pb` it
//! gets a real, fully working implementation rather than a stub: `set`,
//! `get`, `add`, and the dump routine `serializer.rs` calls when `output`
//! is handed one of these as an argument.

use mlua::{Lua, Table, UserData, UserDataMethods};

/// A single row's worth of (column) samples plus the row's timestamp,
/// stored with `rows` as a ring indexed by `(time / ns_per_row) % rows`.
pub struct CircularBuffer {
    rows: usize,
    columns: usize,
    ns_per_row: i64,
    data: Vec<f64>,
    row_times: Vec<i64>,
}

impl CircularBuffer {
    fn new(rows: usize, columns: usize, ns_per_row: i64) -> Self {
        Self {
            rows: rows.max(1),
            columns: columns.max(1),
            ns_per_row: ns_per_row.max(1),
            data: vec![f64::NAN; rows.max(1) * columns.max(1)],
            row_times: vec![i64::MIN; rows.max(1)],
        }
    }

    fn row_for_time(&mut self, time: i64) -> Option<usize> {
        let slot = ((time / self.ns_per_row).rem_euclid(self.rows as i64)) as usize;
        let row_time = time - (time % self.ns_per_row);
        if self.row_times[slot] != row_time {
            // A new row rotates into this slot; clear its previous contents.
            for col in 0..self.columns {
                self.data[slot * self.columns + col] = f64::NAN;
            }
            self.row_times[slot] = row_time;
        }
        Some(slot)
    }

    fn set(&mut self, time: i64, column: usize, value: f64) -> Option<f64> {
        if column == 0 || column > self.columns {
            return None;
        }
        let slot = self.row_for_time(time)?;
        let idx = slot * self.columns + (column - 1);
        let previous = self.data[idx];
        self.data[idx] = value;
        Some(previous)
    }

    fn add(&mut self, time: i64, column: usize, value: f64) -> Option<f64> {
        if column == 0 || column > self.columns {
            return None;
        }
        let slot = self.row_for_time(time)?;
        let idx = slot * self.columns + (column - 1);
        let updated = if self.data[idx].is_nan() {
            value
        } else {
            self.data[idx] + value
        };
        self.data[idx] = updated;
        Some(updated)
    }

    fn get(&self, time: i64, column: usize) -> Option<f64> {
        if column == 0 || column > self.columns {
            return None;
        }
        let slot = ((time / self.ns_per_row).rem_euclid(self.rows as i64)) as usize;
        let row_time = time - (time % self.ns_per_row);
        if self.row_times[slot] != row_time {
            return Some(f64::NAN);
        }
        Some(self.data[slot * self.columns + (column - 1)])
    }

    /// Dumps the buffer as a compact binary blob: a little-endian header
    /// (`rows`, `columns`, `ns_per_row` as `u32`/`u32`/`i64`) followed by
    /// `rows * columns` little-endian `f64` samples in row-major order, the
    /// row-order rotated so the oldest row comes first. This is what
    /// `serializer.rs` writes into the output buffer for an `output(cb)`
    /// call on a circular buffer value.
    pub fn dump(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.rows * self.columns * 8);
        out.extend_from_slice(&(self.rows as u32).to_le_bytes());
        out.extend_from_slice(&(self.columns as u32).to_le_bytes());
        out.extend_from_slice(&self.ns_per_row.to_le_bytes());

        let oldest = self
            .row_times
            .iter()
            .enumerate()
            .filter(|(_, &t)| t != i64::MIN)
            .min_by_key(|(_, &t)| t)
            .map(|(i, _)| i)
            .unwrap_or(0);

        for offset in 0..self.rows {
            let slot = (oldest + offset) % self.rows;
            for col in 0..self.columns {
                out.extend_from_slice(&self.data[slot * self.columns + col].to_le_bytes());
            }
        }
        out
    }
}

impl UserData for CircularBuffer {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method_mut("set", |_, this, (time, column, value): (i64, usize, f64)| {
            Ok(this.set(time, column, value))
        });
        methods.add_method_mut("add", |_, this, (time, column, value): (i64, usize, f64)| {
            Ok(this.add(time, column, value))
        });
        methods.add_method("get", |_, this, (time, column): (i64, usize)| Ok(this.get(time, column)));
    }
}

/// Builds the guest-visible `circular_buffer` table: `new(rows, columns, ns_per_row)`.
pub fn build(lua: &Lua) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set(
        "new",
        lua.create_function(|_, (rows, columns, ns_per_row): (usize, usize, i64)| {
            Ok(CircularBuffer::new(rows, columns, ns_per_row))
        })?,
    )?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut cb = CircularBuffer::new(10, 2, 1000);
        cb.set(5000, 1, 42.0);
        assert_eq!(cb.get(5000, 1), Some(42.0));
    }

    #[test]
    fn add_accumulates_within_a_row() {
        let mut cb = CircularBuffer::new(10, 1, 1000);
        cb.add(1000, 1, 1.0);
        cb.add(1500, 1, 2.0);
        assert_eq!(cb.get(1000, 1), Some(3.0));
    }

    #[test]
    fn rotating_past_a_row_clears_it() {
        let mut cb = CircularBuffer::new(3, 1, 1000);
        cb.set(0, 1, 10.0);
        cb.set(3000, 1, 20.0); // same slot as time 0 (3 rows), different row_time
        assert!(cb.get(0, 1).unwrap().is_nan());
        assert_eq!(cb.get(3000, 1), Some(20.0));
    }

    #[test]
    fn dump_has_expected_header_and_length() {
        let mut cb = CircularBuffer::new(4, 3, 60_000);
        cb.set(0, 1, 1.0);
        let blob = cb.dump();
        assert_eq!(blob.len(), 16 + 4 * 3 * 8);
        assert_eq!(u32::from_le_bytes(blob[0..4].try_into().unwrap()), 4);
        assert_eq!(u32::from_le_bytes(blob[4..8].try_into().unwrap()), 3);
    }

    #[test]
    fn out_of_range_column_is_rejected() {
        let mut cb = CircularBuffer::new(10, 2, 1000);
        assert_eq!(cb.set(0, 3, 1.0), None);
        assert_eq!(cb.get(0, 0), None);
    }
}
