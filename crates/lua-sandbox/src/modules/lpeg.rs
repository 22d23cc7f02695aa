//! `lpeg` — minimal stand-in, §1 Non-goals.
//!
//! The parsing-expression-grammar engine that backs the log-grammar
//! collaborator module is explicitly a black-box dependency this crate does
//! not own (§1: "Common Log Format and combined log format parsing grammars
//! ... are a black-box collaborator"). Guest scripts that `require("lpeg")`
//! still need the module to exist and be denylist-gateable, so this is a
//! small, honestly-partial surface: pattern construction primitives that
//! build a tiny match-only automaton, not a full PEG compiler. Scripts
//! relying on captures, back-references, or grammar recursion (`lpeg.V`)
//! beyond a literal/character-class/sequence/repetition subset will not
//! work against this stand-in.

use mlua::{Lua, Table, UserData, UserDataMethods, Value};

#[derive(Clone)]
enum Pattern {
    Literal(String),
    Class(Vec<(u8, u8)>),
    Seq(Box<Pattern>, Box<Pattern>),
    Star(Box<Pattern>),
}

fn matches_at(pattern: &Pattern, input: &[u8], pos: usize) -> Option<usize> {
    match pattern {
        Pattern::Literal(lit) => {
            let bytes = lit.as_bytes();
            if input[pos..].starts_with(bytes) {
                Some(pos + bytes.len())
            } else {
                None
            }
        }
        Pattern::Class(ranges) => {
            let byte = *input.get(pos)?;
            if ranges.iter().any(|&(lo, hi)| byte >= lo && byte <= hi) {
                Some(pos + 1)
            } else {
                None
            }
        }
        Pattern::Seq(first, second) => {
            let mid = matches_at(first, input, pos)?;
            matches_at(second, input, mid)
        }
        Pattern::Star(inner) => {
            let mut cursor = pos;
            while let Some(next) = matches_at(inner, input, cursor) {
                if next == cursor {
                    break;
                }
                cursor = next;
            }
            Some(cursor)
        }
    }
}

struct LuaPattern(Pattern);

impl UserData for LuaPattern {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("match", |_, this, subject: mlua::String| {
            let bytes = subject.as_bytes();
            Ok(matches_at(&this.0, &bytes, 0).map(|end| end as i64 + 1))
        });
    }
}

/// Builds the guest-visible `lpeg` table with `P`, `R`, `S`, and a
/// sequence/star operator surface sufficient for simple field-splitting
/// grammars; `C`, `Ct`, `V`, and grammar recursion are not implemented.
pub fn build(lua: &Lua) -> mlua::Result<Table> {
    let table = lua.create_table()?;

    table.set(
        "P",
        lua.create_function(|_, literal: mlua::String| Ok(LuaPattern(Pattern::Literal(literal.to_string_lossy().into_owned()))))?,
    )?;
    table.set(
        "R",
        lua.create_function(|_, range: mlua::String| {
            let bytes = range.as_bytes();
            if bytes.len() != 2 {
                return Err(mlua::Error::RuntimeError("lpeg.R expects a 2-byte range".into()));
            }
            Ok(LuaPattern(Pattern::Class(vec![(bytes[0], bytes[1])])))
        })?,
    )?;
    table.set(
        "S",
        lua.create_function(|_, set: mlua::String| {
            let ranges = set.as_bytes().iter().map(|&b| (b, b)).collect();
            Ok(LuaPattern(Pattern::Class(ranges)))
        })?,
    )?;
    table.set(
        "seq",
        lua.create_function(|_, (a, b): (Value, Value)| {
            let (Value::UserData(a), Value::UserData(b)) = (a, b) else {
                return Err(mlua::Error::RuntimeError("lpeg.seq expects two patterns".into()));
            };
            let a = a.borrow::<LuaPattern>()?.0.clone();
            let b = b.borrow::<LuaPattern>()?.0.clone();
            Ok(LuaPattern(Pattern::Seq(Box::new(a), Box::new(b))))
        })?,
    )?;
    table.set(
        "star",
        lua.create_function(|_, p: mlua::AnyUserData| {
            let inner = p.borrow::<LuaPattern>()?.0.clone();
            Ok(LuaPattern(Pattern::Star(Box::new(inner))))
        })?,
    )?;

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_matches_prefix() {
        let pattern = Pattern::Literal("GET".into());
        assert_eq!(matches_at(&pattern, b"GET /x HTTP/1.1", 0), Some(3));
    }

    #[test]
    fn class_matches_digit_range() {
        let pattern = Pattern::Class(vec![(b'0', b'9')]);
        assert_eq!(matches_at(&pattern, b"9x", 0), Some(1));
        assert_eq!(matches_at(&pattern, b"x9", 0), None);
    }

    #[test]
    fn star_matches_zero_or_more() {
        let digits = Pattern::Star(Box::new(Pattern::Class(vec![(b'0', b'9')])));
        assert_eq!(matches_at(&digits, b"123abc", 0), Some(3));
        assert_eq!(matches_at(&digits, b"abc", 0), Some(0));
    }
}
