//! `cjson` (safe variant) — §4.6.
//!
//! The JSON serializer is named out of scope in §1 "beyond their invocation
//! contract"; this module implements exactly that contract: a recursive
//! Lua-value-to-JSON encoder the serializer dispatch (§4.5) calls as its
//! "JSON encoder collaborator", plus a `decode` a guest script can call
//! directly. The denylist in §4.6 removes the raw `encode*` family from
//! guest reach (table serialization is meant to flow through `output(...)`,
//! not a bare `cjson.encode` call with attacker-tunable options) — those
//! functions still have to exist on the table for the library gate to strip
//! them, so they're implemented here as real (if simple) functionality.

use std::collections::HashSet;

use mlua::{Lua, Table, Value};

/// Errors produced while encoding a Lua value to JSON.
#[derive(Debug, thiserror::Error)]
pub enum CjsonError {
    #[error("cannot serialise a cyclic table")]
    Cycle,
    #[error("cannot serialise a {0} value to JSON")]
    Unsupported(&'static str),
}

/// Recursively encodes `value` as JSON, writing into `out`.
///
/// `visited` is the caller-owned cycle-detection scratch set (§4.5: "an
/// initial capacity of 64 already-visited tables is adequate; it grows by
/// doubling" — a `HashSet` built with `with_capacity(64)` has exactly that
/// growth policy). Table identity is taken from [`Table::to_pointer`].
pub fn encode_into(value: &Value, visited: &mut HashSet<usize>, out: &mut String) -> Result<(), CjsonError> {
    match value {
        Value::Nil => out.push_str("null"),
        Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Integer(i) => out.push_str(&i.to_string()),
        Value::Number(n) => {
            if n.is_finite() {
                out.push_str(&format!("{n}"));
            } else {
                // §4.5: numbers get "canonical double serialization
                // (full precision, round-trippable)"; NaN/Inf have no JSON
                // representation, so fall back to `null` rather than
                // emitting invalid JSON.
                out.push_str("null");
            }
        }
        Value::String(s) => {
            out.push('"');
            for byte in s.as_bytes() {
                match *byte {
                    b'"' => out.push_str("\\\""),
                    b'\\' => out.push_str("\\\\"),
                    b'\n' => out.push_str("\\n"),
                    b'\r' => out.push_str("\\r"),
                    b'\t' => out.push_str("\\t"),
                    c if c < 0x20 => out.push_str(&format!("\\u{:04x}", c)),
                    c => out.push(c as char),
                }
            }
            out.push('"');
        }
        Value::Table(t) => {
            let ptr = t.to_pointer() as usize;
            if !visited.insert(ptr) {
                return Err(CjsonError::Cycle);
            }
            let len = t.raw_len();
            if len > 0 && is_array_like(t, len) {
                out.push('[');
                for i in 1..=len {
                    if i > 1 {
                        out.push(',');
                    }
                    let v: Value = t.get(i).unwrap_or(Value::Nil);
                    encode_into(&v, visited, out)?;
                }
                out.push(']');
            } else {
                out.push('{');
                let mut first = true;
                for pair in t.clone().pairs::<Value, Value>() {
                    let (k, v) = pair.map_err(|_| CjsonError::Unsupported("table"))?;
                    let key = match k {
                        Value::String(s) => s.to_str().map(|s| s.to_string()).unwrap_or_default(),
                        Value::Integer(i) => i.to_string(),
                        Value::Number(n) => n.to_string(),
                        _ => return Err(CjsonError::Unsupported("table key")),
                    };
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    out.push_str(&format!("\"{}\":", escape(&key)));
                    encode_into(&v, visited, out)?;
                }
                out.push('}');
            }
            visited.remove(&ptr);
        }
        Value::Function(_)
        | Value::Thread(_)
        | Value::UserData(_)
        | Value::LightUserData(_)
        | Value::Error(_) => {
            // §4.5: "other: silently ignored" at the scalar dispatch layer;
            // inside a nested table this is a hard encode error instead,
            // matching cjson's own behaviour.
            return Err(CjsonError::Unsupported("non-serialisable"));
        }
        _ => return Err(CjsonError::Unsupported("unknown")),
    }
    Ok(())
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.as_bytes() {
        match *byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            c if c < 0x20 => out.push_str(&format!("\\u{:04x}", c)),
            c => out.push(c as char),
        }
    }
    out
}

fn is_array_like(t: &Table, len: usize) -> bool {
    // A table is array-like if its only keys are the contiguous integers
    // 1..=len (cjson's own heuristic for distinguishing JSON arrays from
    // objects).
    t.clone().pairs::<Value, Value>().count() == len
}

/// Parses `json` into an `mlua::Value` owned by `lua`.
pub fn decode(lua: &Lua, json: &str) -> mlua::Result<Value> {
    let parsed: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| mlua::Error::RuntimeError(format!("invalid JSON: {e}")))?;
    json_to_lua(lua, &parsed)
}

fn json_to_lua(lua: &Lua, v: &serde_json::Value) -> mlua::Result<Value> {
    Ok(match v {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Number(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::String(lua.create_string(s)?),
        serde_json::Value::Array(items) => {
            let t = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                t.set(i + 1, json_to_lua(lua, item)?)?;
            }
            Value::Table(t)
        }
        serde_json::Value::Object(map) => {
            let t = lua.create_table()?;
            for (k, val) in map {
                t.set(k.as_str(), json_to_lua(lua, val)?)?;
            }
            Value::Table(t)
        }
    })
}

/// Builds the guest-visible `cjson` table.
///
/// `encode` and the `encode_*` configuration setters are present (so the
/// library gate's denylist has real symbols to blank out) but are denied by
/// default per §4.6; only `decode` survives gating.
pub fn build(lua: &Lua) -> mlua::Result<Table> {
    let table = lua.create_table()?;

    table.set(
        "encode",
        lua.create_function(|lua, value: Value| {
            let mut visited = HashSet::with_capacity(64);
            let mut out = String::new();
            encode_into(&value, &mut visited, &mut out)
                .map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;
            lua.create_string(&out)
        })?,
    )?;
    table.set(
        "decode",
        lua.create_function(|lua, json: mlua::String| decode(lua, &json.to_string_lossy()))?,
    )?;
    table.set("encode_sparse_array", lua.create_function(|_, _: mlua::Variadic<Value>| Ok(()))?)?;
    table.set("encode_max_depth", lua.create_function(|_, _: i64| Ok(()))?)?;
    table.set("encode_number_precision", lua.create_function(|_, _: i64| Ok(()))?)?;
    table.set("encode_keep_buffer", lua.create_function(|_, _: bool| Ok(()))?)?;
    table.set("encode_invalid_numbers", lua.create_function(|_, _: bool| Ok(()))?)?;

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_scalars() {
        let mut visited = HashSet::new();
        let mut out = String::new();
        encode_into(&Value::Integer(23), &mut visited, &mut out).unwrap();
        assert_eq!(out, "23");
    }

    #[test]
    fn decode_round_trips_object() {
        let lua = Lua::new();
        let value = decode(&lua, r#"{"a":1,"b":[1,2,3]}"#).unwrap();
        let table = match value {
            Value::Table(t) => t,
            other => panic!("expected table, got {other:?}"),
        };
        let a: i64 = table.get("a").unwrap();
        assert_eq!(a, 1);
    }

    #[test]
    fn detects_cycles() {
        let lua = Lua::new();
        let t = lua.create_table().unwrap();
        t.set("self", t.clone()).unwrap();
        let mut visited = HashSet::new();
        let mut out = String::new();
        let err = encode_into(&Value::Table(t), &mut visited, &mut out).unwrap_err();
        assert!(matches!(err, CjsonError::Cycle));
    }

    #[test]
    fn gated_table_strips_encode_family() {
        let lua = Lua::new();
        let table = build(&lua).unwrap();
        crate::library::strip_denylist(&table, crate::library::CJSON_DENYLIST).unwrap();
        assert!(table.get::<Value>("encode").unwrap().is_nil());
        assert!(!table.get::<Value>("decode").unwrap().is_nil());
    }
}
