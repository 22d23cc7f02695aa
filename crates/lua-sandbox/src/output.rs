//! Output buffer — §3 and §4.4.
//!
//! A growable byte buffer with a hard ceiling (`maxsize`). `size` doubles on
//! demand until it reaches `maxsize`; every guest-visible write funnels
//! through [`append_str`](OutputBuffer::append_str) or
//! [`append_char`](OutputBuffer::append_char). There is no C-string reader on
//! this target, so the trailing-NUL convention from the original engine is
//! dropped (§9 Open Question 2) — callers read back a plain `&[u8]`.
//!
//! `Arc<Mutex<_>>` interior mutability keeps `Clone` cheap so a closure
//! registered as the guest-visible `output(...)` function can hold one
//! independently of the sandbox that drains it afterward.

use std::sync::{Arc, Mutex};

/// Initial capacity before any growth, chosen to avoid a reallocation for
/// the common case of small scalar output.
const INITIAL_CAPACITY: usize = 256;

struct Inner {
    data: Vec<u8>,
    pos: usize,
    size: usize,
    maxsize: usize,
    limit_exceeded: bool,
}

impl Inner {
    fn new(maxsize: usize) -> Self {
        let initial = if maxsize == 0 {
            INITIAL_CAPACITY
        } else {
            INITIAL_CAPACITY.min(maxsize)
        };
        Self {
            data: vec![0u8; initial],
            pos: 0,
            size: initial,
            maxsize,
            limit_exceeded: false,
        }
    }

    /// Grows `size` by doubling until either `needed` fits or `maxsize` is
    /// hit. Returns `false` if `needed` cannot fit even at `maxsize`.
    fn grow_to_fit(&mut self, needed: usize) -> bool {
        if self.maxsize != 0 && needed > self.maxsize {
            return false;
        }
        let mut new_size = self.size;
        while new_size < needed {
            new_size = if new_size == 0 { 1 } else { new_size * 2 };
            if self.maxsize != 0 && new_size > self.maxsize {
                new_size = self.maxsize;
            }
        }
        if new_size > self.data.len() {
            self.data.resize(new_size, 0);
        }
        self.size = new_size;
        true
    }

    fn append_bytes(&mut self, bytes: &[u8]) -> bool {
        let needed = self.pos + bytes.len();
        if !self.grow_to_fit(needed) {
            self.limit_exceeded = true;
            return false;
        }
        self.data[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        true
    }
}

/// A growable, quota-bounded output byte buffer.
///
/// Cheap to clone — clones share the same underlying data via
/// `Arc<Mutex<Inner>>`, so a closure registered as the guest-visible
/// `output(...)` function can hold one independently of the sandbox that
/// drains it afterward.
#[derive(Clone)]
pub struct OutputBuffer {
    inner: Arc<Mutex<Inner>>,
}

impl OutputBuffer {
    /// Creates a buffer with ceiling `maxsize` (`0` = unbounded).
    pub fn new(maxsize: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new(maxsize))),
        }
    }

    /// Formatted write (`output(...)`'s numeric/string scalar encodings all
    /// funnel here). Grows by doubling until the formatted text fits or the
    /// ceiling is hit, matching §4.4's "tolerate short-count formatters"
    /// recovery policy — in safe Rust `write!` either fully succeeds or the
    /// buffer rejects it outright, so there is no partial-write case to
    /// retry, but the growth loop is shared with `append_str`.
    pub fn append_fmt(&self, args: std::fmt::Arguments<'_>) -> bool {
        let rendered = args.to_string();
        self.append_str(&rendered)
    }

    /// Byte copy of `s`. `pos` advances by `len(s)`.
    pub fn append_str(&self, s: &str) -> bool {
        self.append_bytes(s.as_bytes())
    }

    /// Byte copy of raw bytes — used by extension-type dumpers (§4.5) whose
    /// output is not valid UTF-8 text.
    pub fn append_bytes(&self, bytes: &[u8]) -> bool {
        let mut inner = self.inner.lock().expect("OutputBuffer mutex poisoned");
        inner.append_bytes(bytes)
    }

    /// Single byte append.
    pub fn append_char(&self, c: u8) -> bool {
        self.append_bytes(&[c])
    }

    /// `true` once any append has been rejected by the ceiling.
    pub fn is_limit_exceeded(&self) -> bool {
        self.inner.lock().expect("OutputBuffer mutex poisoned").limit_exceeded
    }

    /// Current write position (`CURRENT[OUTPUT]`).
    pub fn pos(&self) -> usize {
        self.inner.lock().expect("OutputBuffer mutex poisoned").pos
    }

    /// Returns a copy of the bytes written so far (`data[0..pos]`).
    pub fn snapshot(&self) -> Vec<u8> {
        let inner = self.inner.lock().expect("OutputBuffer mutex poisoned");
        inner.data[..inner.pos].to_vec()
    }

    /// Drains the buffer: returns the written bytes and resets `pos` to zero
    /// (§5: "the host clears `pos` ... the core exposes the primitive;
    /// policy is the host's").
    pub fn drain(&self) -> Vec<u8> {
        let mut inner = self.inner.lock().expect("OutputBuffer mutex poisoned");
        let out = inner.data[..inner.pos].to_vec();
        inner.pos = 0;
        inner.limit_exceeded = false;
        out
    }
}
