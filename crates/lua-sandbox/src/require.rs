//! `require` resolver — §4.7.
//!
//! Overrides the engine's own `require` with one that: validates the
//! requested name against `[A-Za-z0-9_]+` (this alone rules out `..` and
//! path separators, so there is no separate traversal check to get wrong),
//! consults a `package.loaded` cache using the sentinel value `true` to
//! break circular requires, dispatches built-in names to the [library
//! gate](crate::library), and otherwise resolves external modules from a
//! configured, read-only `module_root` — capped at a 255-byte resolved path
//! and read through the process-wide [bytecode cache](crate::cache).

use std::path::{Path, PathBuf};

use mlua::{Lua, Value, Variadic};

use crate::library;

/// Ceiling on a resolved module path's byte length (§4.7).
const MAX_PATH_LEN: usize = 255;

/// Engine standard libraries that are already loaded (and gated, see
/// [`library::gate_base_environment`]) into the globals table by the time
/// `require` is installed. `require("os")` et al. must resolve to the same,
/// already-gated table rather than re-run a builder (§4.6's library set
/// includes `string`/`math`/`table`/`os` alongside the extension modules,
/// but those four are base-library globals, not `package.loaded`-only
/// extensions).
const STDLIB_GLOBAL_NAMES: &[&str] = &["string", "math", "table", "os"];

fn is_valid_module_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn loaded_table(lua: &Lua) -> mlua::Result<mlua::Table> {
    let package: mlua::Table = match lua.globals().get("package")? {
        Value::Table(t) => t,
        _ => {
            let t = lua.create_table()?;
            lua.globals().set("package", t.clone())?;
            t
        }
    };
    match package.get("loaded")? {
        Value::Table(t) => Ok(t),
        _ => {
            let t = lua.create_table()?;
            package.set("loaded", t.clone())?;
            Ok(t)
        }
    }
}

fn resolve_external_path(module_root: &Path, name: &str) -> mlua::Result<PathBuf> {
    let path = module_root.join(format!("{name}.lua"));
    let len = path.as_os_str().len();
    if len > MAX_PATH_LEN {
        return Err(mlua::Error::RuntimeError(format!(
            "require_path exceeded {MAX_PATH_LEN}"
        )));
    }
    Ok(path)
}

/// Installs the sandbox's `require` as the global `require`, replacing the
/// engine's own filesystem-walking implementation.
///
/// `module_root` is `None` when §4.7's external-module feature is disabled
/// entirely for this sandbox (only built-ins resolve).
pub fn install(lua: &Lua, module_root: Option<PathBuf>) -> mlua::Result<()> {
    let root = module_root;
    let require = lua.create_function(move |lua, args: Variadic<Value>| {
        let name = match args.first() {
            Some(Value::String(s)) => s.to_string_lossy().into_owned(),
            _ => return Err(mlua::Error::RuntimeError("require expects a module name string".into())),
        };
        do_require(lua, &name, root.as_deref())
    })?;
    lua.globals().set("require", require)?;
    loaded_table(lua)?;
    Ok(())
}

/// Builds `cjson`, gates it, and binds it both as a bare global and under
/// `package.loaded["cjson"]` (§4.6: "`cjson` additionally must be bound as a
/// global ... so guest code can name it bare"). Must run after
/// [`install`] so `package.loaded` exists. Idempotent cache entry: a
/// subsequent `require("cjson")` hits the cache instead of rebuilding.
pub fn preload_global_cjson(lua: &Lua) -> mlua::Result<()> {
    let builtin = library::find_builtin("cjson").expect("cjson is a registered builtin");
    let table = (builtin.builder)(lua)?;
    library::strip_denylist(&table, builtin.denylist)?;
    library::attach_marker(lua, &table)?;
    lua.globals().set("cjson", table.clone())?;
    loaded_table(lua)?.set("cjson", table)?;
    Ok(())
}

fn do_require(lua: &Lua, name: &str, module_root: Option<&Path>) -> mlua::Result<Value> {
    if !is_valid_module_name(name) {
        return Err(mlua::Error::RuntimeError(format!("invalid module name '{name}'")));
    }

    let loaded = loaded_table(lua)?;
    let existing: Value = loaded.get(name.to_string())?;
    if !matches!(existing, Value::Nil) {
        // Already loaded, or the `true` sentinel left by an in-progress
        // (circular) require of the same module further up the call stack.
        return Ok(existing);
    }

    if STDLIB_GLOBAL_NAMES.contains(&name) {
        // Already loaded and gated at sandbox creation time; require just
        // needs to surface the existing global and cache it.
        let table: Value = lua.globals().get(name)?;
        loaded.set(name, table.clone())?;
        return Ok(table);
    }

    if let Some(builtin) = library::find_builtin(name) {
        loaded.set(name, true)?; // sentinel, in case the builder itself requires `name`
        let table = (builtin.builder)(lua)?;
        library::strip_denylist(&table, builtin.denylist)?;
        library::attach_marker(lua, &table)?;
        loaded.set(name, table.clone())?;
        return Ok(Value::Table(table));
    }

    let Some(root) = module_root else {
        tracing::debug!(module = name, "require denied: external modules are disabled");
        return Err(mlua::Error::RuntimeError("external modules are disabled".to_string()));
    };

    let path = resolve_external_path(root, name)?;
    let source = std::fs::read(&path)
        .map_err(|e| mlua::Error::RuntimeError(format!("cannot read module {name:?}: {e}")))?;

    loaded.set(name, true)?;
    let function = crate::cache::global().load_or_compile(lua, name, &source)?;
    let result: Value = function.call(())?;
    let stored = if matches!(result, Value::Nil) { Value::Boolean(true) } else { result };
    loaded.set(name, stored.clone())?;
    Ok(stored)
}
