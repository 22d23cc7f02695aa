//! Bytecode cache for `require`d external modules.
//!
//! A sandbox compiles its own top-level script exactly once at `init` and
//! keeps the resulting `Function` alive for the sandbox's whole lifetime,
//! so there is nothing to re-fetch across `invoke` calls. What *does* repeat
//! across many sandboxes is loading the same on-disk Lua module from a
//! shared, read-only `module_root` (§4.7) — so this module keeps a
//! SHA-256-keyed, LRU-evicted cache of dumped bytecode for required
//! modules, shared process-wide via [`global`].

use std::sync::{Mutex, OnceLock};

use lru::LruCache;
use mlua::Lua;
use sha2::{Digest, Sha256};

/// Default capacity for the process-wide cache, overridable via the
/// `LUA_SANDBOX_MODULE_CACHE_CAPACITY` environment variable.
const DEFAULT_CAPACITY: usize = 256;

fn configured_capacity() -> std::num::NonZeroUsize {
    std::env::var("LUA_SANDBOX_MODULE_CACHE_CAPACITY")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .and_then(std::num::NonZeroUsize::new)
        .unwrap_or_else(|| std::num::NonZeroUsize::new(DEFAULT_CAPACITY).unwrap())
}

/// Process-wide bytecode cache, keyed by SHA-256(module name || source).
pub struct ModuleCache {
    entries: Mutex<LruCache<[u8; 32], Vec<u8>>>,
}

impl ModuleCache {
    fn new() -> Self {
        Self {
            entries: Mutex::new(LruCache::new(configured_capacity())),
        }
    }

    fn key(module_name: &str, source: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(module_name.as_bytes());
        hasher.update([0u8]); // separator: avoids "ab" + "c" colliding with "a" + "bc"
        hasher.update(source);
        hasher.finalize().into()
    }

    /// Looks up previously dumped bytecode for `module_name`/`source`, and
    /// loads it into `lua` as a `Function` if present.
    pub fn get(&self, lua: &Lua, module_name: &str, source: &[u8]) -> Option<mlua::Function> {
        let key = Self::key(module_name, source);
        let dumped = {
            let mut entries = self.entries.lock().expect("module cache mutex poisoned");
            entries.get(&key).cloned()?
        };
        lua.load(dumped).into_function().ok()
    }

    /// Compiles `source` as `module_name`, stores its dumped bytecode, and
    /// returns the loaded function.
    pub fn compile_and_store(
        &self,
        lua: &Lua,
        module_name: &str,
        source: &[u8],
    ) -> mlua::Result<mlua::Function> {
        let function = lua
            .load(source)
            .set_name(module_name)
            .into_function()?;
        let dumped = function.dump(true);
        let key = Self::key(module_name, source);
        self.entries
            .lock()
            .expect("module cache mutex poisoned")
            .put(key, dumped);
        Ok(function)
    }

    /// Fetches from cache if present, otherwise compiles, caches, and
    /// returns the freshly compiled function.
    pub fn load_or_compile(
        &self,
        lua: &Lua,
        module_name: &str,
        source: &[u8],
    ) -> mlua::Result<mlua::Function> {
        if let Some(cached) = self.get(lua, module_name, source) {
            return Ok(cached);
        }
        self.compile_and_store(lua, module_name, source)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("module cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static GLOBAL: OnceLock<ModuleCache> = OnceLock::new();

/// The process-wide cache instance, shared across every sandbox that shares
/// a `module_root` (§4.7: the root is read-only for the lifetime of the
/// process, so its bytecode is safe to share across sandbox boundaries).
pub fn global() -> &'static ModuleCache {
    GLOBAL.get_or_init(ModuleCache::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_and_reuses_from_cache() {
        let cache = ModuleCache::new();
        let lua = Lua::new();
        let source = b"return 1 + 1";

        assert!(cache.is_empty());
        let first = cache.load_or_compile(&lua, "mod_a", source).unwrap();
        assert_eq!(cache.len(), 1);
        let value: i64 = first.call(()).unwrap();
        assert_eq!(value, 2);

        let second = cache.load_or_compile(&lua, "mod_a", source).unwrap();
        let value: i64 = second.call(()).unwrap();
        assert_eq!(value, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn different_module_names_do_not_collide() {
        let cache = ModuleCache::new();
        let lua = Lua::new();
        cache.load_or_compile(&lua, "mod_a", b"return 1").unwrap();
        cache.load_or_compile(&lua, "mod_b", b"return 1").unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn changed_source_recompiles_under_same_name() {
        let cache = ModuleCache::new();
        let lua = Lua::new();
        let first = cache.load_or_compile(&lua, "mod_a", b"return 1").unwrap();
        let second = cache.load_or_compile(&lua, "mod_a", b"return 2").unwrap();
        let v1: i64 = first.call(()).unwrap();
        let v2: i64 = second.call(()).unwrap();
        assert_eq!(v1, 1);
        assert_eq!(v2, 2);
        assert_eq!(cache.len(), 2);
    }
}
