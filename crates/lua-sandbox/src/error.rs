//! Internal error taxonomy for the lua-sandbox library.
//!
//! [`SandboxFault`] is the typed `Result` error used for host-facing Rust
//! calls (`create`, `init`, `invoke`). It is distinct from the *guest-visible*
//! error message stored in [`crate::sandbox::Sandbox`]'s bounded error slot:
//! that slot is a plain `String` per the data model, since the original
//! engine this sandbox wraps surfaces guest errors as opaque messages, not
//! structured values. `SandboxFault` exists so a host driver gets a typed
//! `Result` instead of having to parse the message string for non-guest
//! failures (bad config, engine construction failure).

use thiserror::Error;

/// Errors a host can receive from [`crate::sandbox::Sandbox`] entry points.
#[derive(Debug, Error)]
pub enum SandboxFault {
    /// The underlying Lua engine could not be constructed.
    #[error("failed to initialize Lua engine: {0}")]
    EngineInit(String),

    /// `SandboxConfig` was rejected before any guest code ran (e.g. an
    /// unreadable `module_root`, or flagged at construction time).
    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),

    /// `init`/`invoke` were called on a sandbox that is not in the state
    /// required for that operation (see §3 lifecycle).
    #[error("sandbox is not in the required state: {0}")]
    WrongState(&'static str),

    /// A guest-level failure occurred (compile error, uncaught exception,
    /// quota exceeded). The human-readable message is also recorded in the
    /// sandbox's bounded error slot; this variant lets `Result`-based
    /// callers pattern-match a single type.
    #[error("{0}")]
    Guest(String),
}
