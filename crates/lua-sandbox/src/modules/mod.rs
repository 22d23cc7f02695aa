//! Guest-visible library modules — §4.6 built-in library set.
//!
//! `string`, `math`, `table`, and `os` are the engine's own standard
//! libraries, loaded via `mlua`'s `StdLib` flags and then handed to the
//! library gate for denylist application. `cjson`, `lpeg`, `pb`,
//! `circular_buffer`, `bloom_filter`, and `hyperloglog` are modules this
//! crate provides directly (the JSON/protobuf serializers and the
//! data-structure extensions are named out of scope in §1 "beyond their
//! registration contract" / "beyond their invocation contract" — the
//! implementations here satisfy exactly that registration/invocation
//! contract and no more).

pub mod bloom_filter;
pub mod circular_buffer;
pub mod cjson;
pub mod hyperloglog;
pub mod lpeg;
pub mod pb;
