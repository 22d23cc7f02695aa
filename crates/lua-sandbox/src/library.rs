//! Library gate — §4.6.
//!
//! Two things happen here: stripping dangerous symbols from the engine's own
//! standard libraries (the base global environment plus `os`), and assembling
//! the extension modules (`cjson`, `lpeg`, `pb`, `circular_buffer`,
//! `bloom_filter`, `hyperloglog`) that `require.rs` dispatches built-in module
//! names to. Every safe table — stdlib or extension — gets an empty marker
//! metatable attached afterward so a later preservation/serialization pass
//! can recognize "this is a library table, not guest data" by metatable
//! identity rather than by name.

use mlua::{Lua, Table, Value};

use crate::modules;

/// Global functions removed from `_G` regardless of which libraries are
/// otherwise enabled (§6): process control, bytecode loading, filesystem
/// reads, and unstructured stdout — guest code reports structured results
/// through `output(...)` instead of `print`.
pub const BASE_DENYLIST: &[&str] = &[
    "collectgarbage",
    "coroutine",
    "dofile",
    "load",
    "loadfile",
    "loadstring",
    "newproxy",
    "print",
];

/// `os` table members removed (§4.6): process control and filesystem
/// mutation. `date`, `time`, `difftime`, `clock`, and `getenv` survive —
/// guest scripts commonly need wall-clock reads for the log lines they're
/// formatting.
pub const OS_DENYLIST: &[&str] = &["execute", "exit", "remove", "rename", "setlocale", "tmpname"];

/// `cjson`'s denylist: the encoder family is present (so there is something
/// to strip) but denied by default — guest code serializes via `output(...)`
/// instead of a bare `cjson.encode` call.
pub const CJSON_DENYLIST: &[&str] = &[
    "encode",
    "encode_sparse_array",
    "encode_max_depth",
    "encode_number_precision",
    "encode_keep_buffer",
    "encode_invalid_numbers",
];

/// Key set on the empty marker metatable every gated library table receives.
/// Its presence (not its value) is the signal the preservation layer and the
/// serializer's "other: silently ignored" dispatch branch (§4.5) use to
/// distinguish a library table from guest-constructed data.
pub const MARKER_KEY: &str = "__sandbox_library__";

/// Strips every name in `denylist` from `table` by setting it to `nil`.
pub fn strip_denylist(table: &Table, denylist: &[&str]) -> mlua::Result<()> {
    for &name in denylist {
        table.set(name, Value::Nil)?;
    }
    Ok(())
}

/// Attaches the empty marker metatable to `table`.
pub fn attach_marker(lua: &Lua, table: &Table) -> mlua::Result<()> {
    let meta = lua.create_table()?;
    meta.set(MARKER_KEY, true)?;
    table.set_metatable(Some(meta));
    Ok(())
}

/// One built-in, `require`-able extension module: its module name, the
/// denylist applied to its table after construction, and the function that
/// builds the table itself.
pub struct LibraryDescriptor {
    pub name: &'static str,
    pub denylist: &'static [&'static str],
    pub builder: fn(&Lua) -> mlua::Result<Table>,
}

/// The built-in library set §4.6 names beyond the engine's own stdlib:
/// `require.rs` consults this list before ever touching the filesystem.
pub const BUILTIN_LIBRARIES: &[LibraryDescriptor] = &[
    LibraryDescriptor {
        name: "cjson",
        denylist: CJSON_DENYLIST,
        builder: modules::cjson::build,
    },
    LibraryDescriptor {
        name: "lpeg",
        denylist: &[],
        builder: modules::lpeg::build,
    },
    LibraryDescriptor {
        name: "pb",
        denylist: &[],
        builder: modules::pb::build,
    },
    LibraryDescriptor {
        name: "circular_buffer",
        denylist: &[],
        builder: modules::circular_buffer::build,
    },
    LibraryDescriptor {
        name: "bloom_filter",
        denylist: &[],
        builder: modules::bloom_filter::build,
    },
    LibraryDescriptor {
        name: "hyperloglog",
        denylist: &[],
        builder: modules::hyperloglog::build,
    },
];

/// Looks up a built-in module by the name guest code passed to `require`.
pub fn find_builtin(name: &str) -> Option<&'static LibraryDescriptor> {
    BUILTIN_LIBRARIES.iter().find(|lib| lib.name == name)
}

/// Applies the base gate to a freshly constructed `Lua` instance: strips
/// [`BASE_DENYLIST`] from the globals table, restricts `os` to its
/// allowlisted members, and marks both `os` and the other always-loaded
/// stdlib tables (`string`, `math`, `table`) with the preservation marker.
pub fn gate_base_environment(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();
    strip_denylist(&globals, BASE_DENYLIST)?;

    if let Ok(Value::Table(os)) = globals.get::<Value>("os") {
        strip_denylist(&os, OS_DENYLIST)?;
        attach_marker(lua, &os)?;
    }
    for name in ["string", "math", "table"] {
        if let Ok(Value::Table(lib)) = globals.get::<Value>(name) {
            attach_marker(lua, &lib)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_gate_removes_dofile_and_load() {
        let lua = Lua::new();
        gate_base_environment(&lua).unwrap();
        let globals = lua.globals();
        assert!(globals.get::<Value>("dofile").unwrap().is_nil());
        assert!(globals.get::<Value>("load").unwrap().is_nil());
    }

    #[test]
    fn os_keeps_date_and_time_loses_execute() {
        let lua = Lua::new();
        gate_base_environment(&lua).unwrap();
        let os: Table = lua.globals().get("os").unwrap();
        assert!(!os.get::<Value>("date").unwrap().is_nil());
        assert!(os.get::<Value>("execute").unwrap().is_nil());
    }

    #[test]
    fn marked_tables_carry_marker_key() {
        let lua = Lua::new();
        gate_base_environment(&lua).unwrap();
        let string_lib: Table = lua.globals().get("string").unwrap();
        let meta = string_lib.get_metatable().expect("marker metatable present");
        let marked: bool = meta.get(MARKER_KEY).unwrap();
        assert!(marked);
    }

    #[test]
    fn find_builtin_resolves_known_names() {
        assert!(find_builtin("cjson").is_some());
        assert!(find_builtin("nonexistent").is_none());
    }

    #[test]
    fn builtin_tables_respect_their_own_denylist() {
        let lua = Lua::new();
        let lib = find_builtin("cjson").unwrap();
        let table = (lib.builder)(&lua).unwrap();
        strip_denylist(&table, lib.denylist).unwrap();
        assert!(table.get::<Value>("encode").unwrap().is_nil());
    }
}
