//! Instruction interposer — §4.3.
//!
//! Installs a periodic callback on the engine's bytecode dispatcher via
//! `mlua`'s debug hook (`Lua::set_hook` with
//! `HookTriggers::every_nth_instruction`), firing every `k` instructions.
//! When it fires, if the cumulative count since the last reset exceeds
//! `LIMIT[INSTRUCTIONS]`, it raises a guest-level error with the literal
//! message `"instruction_limit exceeded"` and unwinds.
//!
//! §9 Open Question 1 resolves the instruction quantum `k` to `1000`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mlua::{HookTriggers, Lua};

/// Fixed bytecode-tick quantum the hook is installed at (§9 resolution).
pub const QUANTUM: u32 = 1000;

/// Literal error message raised when the instruction ceiling is exceeded.
pub const LIMIT_EXCEEDED_MESSAGE: &str = "instruction_limit exceeded";

/// Shared, thread-local-free counter the hook increments and `invoke` resets.
///
/// `Arc<AtomicU64>` rather than a plain `u64` because the hook closure must
/// be `'static` and is invoked by `mlua` from inside the engine; the
/// sandbox controller keeps its own handle to read/reset it between calls.
#[derive(Clone, Default)]
pub struct InstructionCounter(Arc<AtomicU64>);

impl InstructionCounter {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0)))
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Resets the counter to zero. Called between `init` and each `invoke`.
    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    fn add(&self, delta: u64) -> u64 {
        self.0.fetch_add(delta, Ordering::Relaxed) + delta
    }
}

/// Installs the instruction hook on `lua`, bounding execution to `limit`
/// instructions (`0` = unbounded, hook is not installed at all).
///
/// Returns the [`InstructionCounter`] the sandbox controller uses to reset
/// and read `CURRENT[INSTRUCTIONS]` between calls.
pub fn install(lua: &Lua, limit: u64) -> InstructionCounter {
    let counter = InstructionCounter::new();
    if limit == 0 {
        return counter;
    }

    let hook_counter = counter.clone();
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(QUANTUM),
        move |_lua, _debug| {
            let total = hook_counter.add(u64::from(QUANTUM));
            if total > limit {
                tracing::warn!(total, limit, "instruction quota exceeded");
                return Err(mlua::Error::RuntimeError(LIMIT_EXCEEDED_MESSAGE.to_string()));
            }
            Ok(mlua::VmState::Continue)
        },
    );

    counter
}
