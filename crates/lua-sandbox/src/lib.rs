//! `lua-sandbox`: a quota-enforcing embedded Lua sandbox with module gating.
//!
//! Embeds an `mlua` Lua 5.4 VM inside the host process and bounds untrusted
//! or semi-trusted guest scripts on three axes — memory, instructions, and
//! output bytes — while trimming the standard library surface and
//! `require` resolution guests can reach. [`Sandbox`] is the entry point
//! host code uses.
//!
//! ```no_run
//! use lua_sandbox::{Sandbox, SandboxConfig};
//!
//! let mut sandbox = Sandbox::create(SandboxConfig::default()).unwrap();
//! sandbox.init("function process(n) return n + 1 end").unwrap();
//! let outcome = sandbox.invoke(41).unwrap();
//! assert_eq!(outcome.status, 42);
//! ```

pub mod alloc;
pub mod cache;
pub mod config;
pub mod error;
pub mod instruction;
pub mod library;
pub mod modules;
pub mod output;
pub mod quota;
pub mod require;
pub mod sandbox;
pub mod serializer;

pub use config::SandboxConfig;
pub use error::SandboxFault;
pub use output::OutputBuffer;
pub use quota::{ChargeOutcome, Metric, QuotaAccountant, Resource};
pub use sandbox::{InvokeOutcome, Sandbox, SandboxState};
