//! `pb` — minimal stand-in, §1 Non-goals.
//!
//! Protobuf encode/decode is named out of scope "beyond its invocation
//! contract": the extension must be `require`-able and denylist-gateable,
//! but this crate does not own a protobuf schema compiler or wire-format
//! codec. `encode`/`decode` here round-trip only the single case a
//! registration-contract test needs — a flat string-keyed table of
//! string/number fields, framed as repeated `(field_name_len, field_name,
//! tag_byte, value)` records — and are not wire-compatible with any real
//! protobuf implementation. Scripts that need actual `.proto`-schema
//! encoding must go through a host-provided collaborator, not this module.

use mlua::{Lua, Table, Value};

const TAG_STRING: u8 = 0;
const TAG_NUMBER: u8 = 1;

/// Encodes a flat table into the stand-in framed format described above.
fn encode(table: &Table) -> mlua::Result<Vec<u8>> {
    let mut out = Vec::new();
    for pair in table.clone().pairs::<String, Value>() {
        let (key, value) = pair?;
        out.extend_from_slice(&(key.len() as u32).to_le_bytes());
        out.extend_from_slice(key.as_bytes());
        match value {
            Value::String(s) => {
                let bytes = s.as_bytes();
                out.push(TAG_STRING);
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(&bytes);
            }
            Value::Integer(i) => {
                out.push(TAG_NUMBER);
                out.extend_from_slice(&(i as f64).to_le_bytes());
            }
            Value::Number(n) => {
                out.push(TAG_NUMBER);
                out.extend_from_slice(&n.to_le_bytes());
            }
            other => {
                return Err(mlua::Error::RuntimeError(format!(
                    "pb.encode: unsupported field type {}",
                    other.type_name()
                )))
            }
        }
    }
    Ok(out)
}

fn decode(lua: &Lua, bytes: &[u8]) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    let mut cursor = 0usize;
    while cursor < bytes.len() {
        let name_len = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        let name = String::from_utf8_lossy(&bytes[cursor..cursor + name_len]).into_owned();
        cursor += name_len;
        let tag = bytes[cursor];
        cursor += 1;
        match tag {
            TAG_STRING => {
                let len = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
                cursor += 4;
                let value = String::from_utf8_lossy(&bytes[cursor..cursor + len]).into_owned();
                cursor += len;
                table.set(name, value)?;
            }
            TAG_NUMBER => {
                let value = f64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
                cursor += 8;
                table.set(name, value)?;
            }
            other => return Err(mlua::Error::RuntimeError(format!("pb.decode: unknown tag {other}"))),
        }
    }
    Ok(table)
}

/// Builds the guest-visible `pb` table: `encode(table)`, `decode(string)`.
pub fn build(lua: &Lua) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set(
        "encode",
        lua.create_function(|lua, t: Table| lua.create_string(&encode(&t)?))?,
    )?;
    table.set(
        "decode",
        lua.create_function(|lua, s: mlua::String| decode(lua, &s.as_bytes()))?,
    )?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_string_and_number_fields() {
        let lua = Lua::new();
        let t = lua.create_table().unwrap();
        t.set("name", "edge-7").unwrap();
        t.set("latency_ms", 12.5).unwrap();

        let bytes = encode(&t).unwrap();
        let decoded = decode(&lua, &bytes).unwrap();

        let name: String = decoded.get("name").unwrap();
        let latency: f64 = decoded.get("latency_ms").unwrap();
        assert_eq!(name, "edge-7");
        assert_eq!(latency, 12.5);
    }
}
