//! Allocation interposer — §4.2.
//!
//! A classic allocator-hook interposer wraps a raw
//! `(ctx, old_ptr, old_size, new_size) -> new_ptr|null` callback, charging
//! the quota accountant before each allocation and refusing via a null
//! return when it would exceed the limit. `mlua` does not expose that raw
//! hook — it exposes an aggregate pair instead: [`mlua::Lua::set_memory_limit`]
//! installs a ceiling enforced by Lua's own allocator (an allocation past it
//! makes the *engine itself* raise an out-of-memory error and unwind, the
//! same observable behavior as a null-return), and [`mlua::Lua::used_memory`]
//! reports the aggregate count.
//!
//! This module is the thin adapter between that aggregate interface and the
//! [`QuotaAccountant`]: `install` sets the ceiling once at sandbox creation,
//! and `sync` (called from the instruction interposer tick and after every
//! `invoke`) refreshes `CURRENT`/`MAXIMUM[MEMORY]` from `used_memory()`.

use mlua::Lua;

use crate::quota::{QuotaAccountant, Resource};

/// Installs the memory ceiling on `lua` per `limit` (`0` = unbounded).
///
/// Mirrors §4.2: "`LIMIT = 0` means unbounded and short-circuits the check."
/// `mlua::Lua::set_memory_limit(0)` would install a ceiling of zero bytes
/// (i.e. reject everything), which is not what "unbounded" means here, so a
/// zero limit instead clears any previously installed ceiling.
pub fn install(lua: &Lua, limit: u64) {
    if limit == 0 {
        lua.remove_memory_limit();
    } else {
        // mlua's limit is a usize; clamp defensively on 32-bit targets.
        let _ = lua.set_memory_limit(limit.min(usize::MAX as u64) as usize);
    }
}

/// Refreshes `CURRENT`/`MAXIMUM[MEMORY]` in `accountant` from `lua`'s live
/// allocator-reported usage.
pub fn sync(lua: &Lua, accountant: &mut QuotaAccountant) {
    let used = lua.used_memory() as u64;
    accountant.observe_current(Resource::Memory, used);
}
