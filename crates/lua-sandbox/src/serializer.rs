//! `output(...)` dispatch — §4.5.
//!
//! Installs the guest-visible `output` function: each argument is encoded
//! according to its Lua type and appended to the sandbox's
//! [`OutputBuffer`]. Scalars get a direct textual encoding; tables are
//! delegated to the `cjson` encoder (the "JSON encoder collaborator") with
//! a cycle-detection scratch set owned here; the one extension type named
//! in the dispatch table, [`CircularBuffer`](crate::modules::circular_buffer::CircularBuffer),
//! gets its binary dump written raw; everything else is silently ignored.

use std::collections::HashSet;

use mlua::{Lua, Value, Variadic};

use crate::modules::{cjson, circular_buffer::CircularBuffer};
use crate::output::OutputBuffer;

/// Raised when an `output(...)` call would push the buffer past its ceiling
/// — symmetric with [`crate::instruction::LIMIT_EXCEEDED_MESSAGE`].
pub const OUTPUT_LIMIT_EXCEEDED_MESSAGE: &str = "output_limit exceeded";

/// Encodes a single scalar/table/extension value, appending to `output`.
/// Returns `Ok(false)` for the "other: silently ignored" case (functions,
/// threads, light userdata, and any userdata that isn't a circular buffer).
fn encode_value(output: &OutputBuffer, value: &Value) -> mlua::Result<bool> {
    match value {
        Value::Nil => {
            output.append_str("nil");
        }
        Value::Boolean(b) => {
            output.append_str(if *b { "true" } else { "false" });
        }
        Value::Integer(i) => {
            output.append_str(&i.to_string());
        }
        Value::Number(n) => {
            // Canonical double serialization: full precision, round-trippable.
            output.append_str(&format!("{n}"));
        }
        Value::String(s) => {
            output.append_bytes(&s.as_bytes());
        }
        Value::Table(_) => {
            let mut visited = HashSet::with_capacity(64);
            let mut rendered = String::new();
            cjson::encode_into(value, &mut visited, &mut rendered)
                .map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;
            // §4.5: "table -> JSON-encoded followed by a single \n terminator".
            rendered.push('\n');
            output.append_str(&rendered);
        }
        Value::UserData(ud) => {
            if let Ok(cb) = ud.borrow::<CircularBuffer>() {
                output.append_bytes(&cb.dump());
            } else {
                return Ok(false);
            }
        }
        _ => return Ok(false),
    }
    Ok(true)
}

/// Installs the `output` global, closing over a clone of `output_buffer`.
pub fn install(lua: &Lua, output_buffer: OutputBuffer) -> mlua::Result<()> {
    let function = lua.create_function(move |_lua, args: Variadic<Value>| {
        for value in args.iter() {
            encode_value(&output_buffer, value)?;
            if output_buffer.is_limit_exceeded() {
                tracing::warn!(pos = output_buffer.pos(), "output quota exceeded");
                return Err(mlua::Error::RuntimeError(OUTPUT_LIMIT_EXCEEDED_MESSAGE.to_string()));
            }
        }
        Ok(())
    })?;
    lua.globals().set("output", function)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_encode_directly() {
        let lua = Lua::new();
        let buf = OutputBuffer::new(0);
        install(&lua, buf.clone()).unwrap();
        lua.load(r#"output(1, " ", "two", " ", true, " ", nil)"#).exec().unwrap();
        assert_eq!(buf.snapshot(), b"1 two true nil");
    }

    #[test]
    fn table_encodes_as_json_with_trailing_newline() {
        let lua = Lua::new();
        let buf = OutputBuffer::new(0);
        install(&lua, buf.clone()).unwrap();
        lua.load(r#"output({1, 2, 3})"#).exec().unwrap();
        assert_eq!(buf.snapshot(), b"[1,2,3]\n");
    }

    #[test]
    fn cyclic_table_raises_guest_error() {
        let lua = Lua::new();
        let buf = OutputBuffer::new(0);
        install(&lua, buf.clone()).unwrap();
        let result = lua.load(r#"local t = {} t.self = t output(t)"#).exec();
        assert!(result.is_err());
    }

    #[test]
    fn functions_are_silently_ignored() {
        let lua = Lua::new();
        let buf = OutputBuffer::new(0);
        install(&lua, buf.clone()).unwrap();
        lua.load(r#"output(print, "after")"#).exec().unwrap();
        assert_eq!(buf.snapshot(), b"after");
    }

    #[test]
    fn output_past_ceiling_raises_limit_error() {
        let lua = Lua::new();
        let buf = OutputBuffer::new(4);
        install(&lua, buf.clone()).unwrap();
        let result = lua.load(r#"output("way too long for four bytes")"#).exec();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains(OUTPUT_LIMIT_EXCEEDED_MESSAGE));
    }
}
