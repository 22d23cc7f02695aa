//! Sandbox controller — §4.8.
//!
//! The top-level object tying every other module together: it owns the
//! `mlua::Lua` engine instance, installs the allocation and instruction
//! interposers, runs the library gate over the base environment, installs
//! `require` and `output`, and drives the §3 lifecycle state machine
//! (`UNINITIALIZED -> RUNNING -> TERMINATED`).
//!
//! Shaped around an explicit state machine rather than a stateless one-shot
//! call, since a sandbox persists across many `invoke`s between one `init`
//! and one `terminate` rather than recreating an interpreter per call.

use std::path::PathBuf;

use mlua::{Lua, Value};

use crate::config::SandboxConfig;
use crate::error::SandboxFault;
use crate::quota::{Metric, QuotaAccountant, Resource};
use crate::{alloc, instruction, library, output::OutputBuffer, require, serializer};

/// §3 lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Uninitialized,
    Running,
    Terminated,
}

/// The host-facing result of one `invoke` call (§6).
#[derive(Debug, Clone)]
pub struct InvokeOutcome {
    /// The guest `process` function's integer return (0 = success), or a
    /// nonzero sentinel chosen by `invoke` itself when the guest call raised
    /// and never returned a value.
    pub status: i64,
    /// Output appended during this call, drained from the output buffer.
    pub output: Vec<u8>,
}

/// Status used when a guest error unwound `invoke` before `process` could
/// return its own status.
const STATUS_GUEST_ERROR: i64 = 1;

/// A single sandbox instance: one owned engine, one quota table, one output
/// buffer, one bounded error slot. Exclusively owned by the host thread that
/// created it (§5).
pub struct Sandbox {
    lua: Option<Lua>,
    state: SandboxState,
    quota: QuotaAccountant,
    output: OutputBuffer,
    instructions: instruction::InstructionCounter,
    error: Option<String>,
    config: SandboxConfig,
    id: u64,
}

/// Process-wide monotonically increasing id, used only to tag log lines so
/// multiple sandboxes in one process can be told apart (§4.9's "tagged with
/// the sandbox's identity").
static NEXT_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

impl Sandbox {
    /// `create(config)` (§4.8): allocates the engine with both interposers
    /// attached, installs the library gate over the base environment, and
    /// installs `require`/`output`. No guest code runs yet.
    pub fn create(config: SandboxConfig) -> Result<Sandbox, SandboxFault> {
        let id = NEXT_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        if let Some(root) = &config.module_root {
            if !root.is_dir() {
                return Err(SandboxFault::InvalidConfig(format!(
                    "module_root {} is not a directory",
                    root.display()
                )));
            }
        }

        let lua = Lua::new();

        let mut quota = QuotaAccountant::new();
        quota.set_limit(Resource::Memory, config.memory_limit);
        quota.set_limit(Resource::Instructions, config.instruction_limit);
        quota.set_limit(Resource::Output, config.output_limit);

        alloc::install(&lua, config.memory_limit);
        let instructions = instruction::install(&lua, config.instruction_limit);

        library::gate_base_environment(&lua).map_err(|e| SandboxFault::EngineInit(e.to_string()))?;

        let output = OutputBuffer::new(usize_from_u64(config.output_limit));
        serializer::install(&lua, output.clone()).map_err(|e| SandboxFault::EngineInit(e.to_string()))?;
        require::install(&lua, config.module_root.clone())
            .map_err(|e| SandboxFault::EngineInit(e.to_string()))?;
        require::preload_global_cjson(&lua).map_err(|e| SandboxFault::EngineInit(e.to_string()))?;

        tracing::debug!(sandbox_id = id, "sandbox created");

        Ok(Sandbox {
            lua: Some(lua),
            state: SandboxState::Uninitialized,
            quota,
            output,
            instructions,
            error: None,
            config,
            id,
        })
    }

    /// `init(source)` (§4.8): loads and runs guest source under all three
    /// limits. `UNINITIALIZED -> RUNNING` on success; `-> TERMINATED` with
    /// the error recorded on failure.
    pub fn init(&mut self, source: &str) -> Result<(), SandboxFault> {
        if self.state != SandboxState::Uninitialized {
            return Err(SandboxFault::WrongState("init requires an UNINITIALIZED sandbox"));
        }
        let lua = self.lua.as_ref().expect("lua present while not TERMINATED");

        self.instructions.reset();
        let result = lua.load(source).set_name("<sandbox init>").exec();
        self.sync_memory();
        self.quota
            .observe_current(Resource::Instructions, self.instructions.get());

        match result {
            Ok(()) => {
                self.state = SandboxState::Running;
                tracing::debug!(sandbox_id = self.id, "sandbox initialized");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(sandbox_id = self.id, error = %message, "init failed");
                self.fail(message.clone());
                Err(SandboxFault::Guest(message))
            }
        }
    }

    /// `invoke(arg)` (§4.8): resets the instruction counter, calls the
    /// host-agreed `process` entry point with `arg`, and drains the output
    /// buffer. An uncaught guest error is fatal (§7 default) and transitions
    /// the sandbox to `TERMINATED`; a guest-returned status, including a
    /// nonzero one the guest computed itself (e.g. after `pcall`-catching a
    /// denied call), leaves the sandbox `RUNNING`.
    pub fn invoke(&mut self, arg: i64) -> Result<InvokeOutcome, SandboxFault> {
        if self.state != SandboxState::Running {
            return Err(SandboxFault::WrongState("invoke requires a RUNNING sandbox"));
        }
        let lua = self.lua.as_ref().expect("lua present while RUNNING");

        self.instructions.reset();
        self.quota.reset_current(Resource::Instructions);

        let process: mlua::Function = match lua.globals().get("process") {
            Ok(Value::Function(f)) => f,
            _ => {
                let message = "guest source does not define a global 'process' function".to_string();
                self.fail(message.clone());
                return Err(SandboxFault::Guest(message));
            }
        };

        let result: mlua::Result<i64> = process.call(arg);
        self.sync_memory();
        self.quota
            .observe_current(Resource::Instructions, self.instructions.get());

        self.quota.observe_current(Resource::Output, self.output.pos());
        let output = self.output.drain();
        self.quota.reset_current(Resource::Output);

        match result {
            Ok(status) => {
                tracing::debug!(sandbox_id = self.id, status, "invoke completed");
                Ok(InvokeOutcome { status, output })
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(sandbox_id = self.id, error = %message, "invoke raised, terminating sandbox");
                self.fail(message.clone());
                Ok(InvokeOutcome {
                    status: STATUS_GUEST_ERROR,
                    output,
                })
            }
        }
    }

    /// `terminate()` (§4.8): closes the engine and zeroes
    /// `CURRENT[MEMORY]`; `MAXIMUM` is preserved (§3: "TERMINATED is
    /// absorbing"). Idempotent.
    pub fn terminate(&mut self) {
        if self.state == SandboxState::Terminated && self.lua.is_none() {
            return;
        }
        self.lua = None;
        self.quota.reset_current(Resource::Memory);
        self.state = SandboxState::Terminated;
        tracing::debug!(sandbox_id = self.id, "sandbox terminated");
    }

    /// Reads a single cell of the quota table (§4.8 introspection).
    pub fn usage(&self, resource: Resource, metric: Metric) -> u64 {
        self.quota.peek(resource, metric)
    }

    /// The bounded error message recorded at the last fatal transition, if
    /// any.
    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Drains output accumulated since the last drain (§5 ordering: the host
    /// owns when the buffer is logically reset).
    pub fn take_output(&mut self) -> Vec<u8> {
        self.quota.observe_current(Resource::Output, self.output.pos());
        let bytes = self.output.drain();
        self.quota.reset_current(Resource::Output);
        bytes
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SandboxState {
        self.state
    }

    /// The configuration this sandbox was created with.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn fail(&mut self, message: String) {
        // Bounded error slot (§3): keep only the last, reasonably sized
        // message rather than growing unboundedly across repeated failures.
        const MAX_ERROR_LEN: usize = 4096;
        let mut bounded = message;
        bounded.truncate(MAX_ERROR_LEN);
        self.error = Some(bounded);
        self.terminate();
    }

    fn sync_memory(&mut self) {
        if let Some(lua) = &self.lua {
            alloc::sync(lua, &mut self.quota);
        }
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn usize_from_u64(v: u64) -> usize {
    v.min(usize::MAX as u64) as usize
}
