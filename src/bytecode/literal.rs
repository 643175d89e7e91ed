/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! Literal buffers.
//!
//! A literal buffer is a flat list of tagged values that the backend turns
//! into a constant array. Array and object literals, class descriptions and
//! the debugger's scope descriptions are all encoded this way.

use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};

use crate::u32_from_usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LiteralTag {
    Boolean = 1,
    Integer = 2,
    Double = 4,
    String = 5,
    Method = 6,
    Generator = 7,
    Accessor = 8,
    MethodAffiliate = 9,
    Getter = 26,
    Setter = 27,
    NullValue = 255,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Integer(i32),
    Double(f64),
    String(String),
    /// Internal name of a method's compilation unit.
    Method(String),
    Generator(String),
    Accessor,
    /// Parameter length of the preceding method.
    MethodAffiliate(u16),
    Getter(String),
    Setter(String),
    Null,
}

impl Literal {
    pub fn tag(&self) -> LiteralTag {
        match self {
            Literal::Boolean(_) => LiteralTag::Boolean,
            Literal::Integer(_) => LiteralTag::Integer,
            Literal::Double(_) => LiteralTag::Double,
            Literal::String(_) => LiteralTag::String,
            Literal::Method(_) => LiteralTag::Method,
            Literal::Generator(_) => LiteralTag::Generator,
            Literal::Accessor => LiteralTag::Accessor,
            Literal::MethodAffiliate(_) => LiteralTag::MethodAffiliate,
            Literal::Getter(_) => LiteralTag::Getter,
            Literal::Setter(_) => LiteralTag::Setter,
            Literal::Null => LiteralTag::NullValue,
        }
    }

    /// Number literals that fit an i32 exactly become integers.
    pub fn number(value: f64) -> Self {
        if value.fract() == 0.0 && value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX) && !is_negative_zero(value)
        {
            Literal::Integer(value as i32)
        } else {
            Literal::Double(value)
        }
    }
}

fn is_negative_zero(value: f64) -> bool {
    value == 0.0 && value.is_sign_negative()
}

impl Serialize for Literal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Literal", 2)?;
        state.serialize_field("t", &(self.tag() as u8))?;
        match self {
            Literal::Boolean(value) => state.serialize_field("v", value)?,
            Literal::Integer(value) => state.serialize_field("v", value)?,
            Literal::Double(value) => state.serialize_field("v", value)?,
            Literal::String(value)
            | Literal::Method(value)
            | Literal::Generator(value)
            | Literal::Getter(value)
            | Literal::Setter(value) => state.serialize_field("v", value)?,
            Literal::MethodAffiliate(value) => state.serialize_field("v", value)?,
            Literal::Accessor | Literal::Null => state.serialize_field("v", &0)?,
        }
        state.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiteralBuffer {
    #[serde(rename = "lb")]
    pub literals: Vec<Literal>,
}

impl LiteralBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, literal: Literal) {
        self.literals.push(literal);
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// Scope description for the debugger: the slot count, then one
    /// `(name, slot)` pair per captured variable.
    pub fn scope_info(slot_names: &[String]) -> Self {
        let mut buffer = Self::new();
        buffer.push(Literal::Integer(slot_count(slot_names)));
        for (slot, name) in slot_names.iter().enumerate() {
            buffer.push(Literal::String(name.clone()));
            buffer.push(Literal::Integer(slot_count(&slot_names[..slot])));
        }
        buffer
    }
}

fn slot_count(names: &[String]) -> i32 {
    i32::try_from(names.len()).expect("slot count exceeds i32::MAX")
}

/// Every literal buffer of one program, addressed by index.
#[derive(Debug, Clone, Default)]
pub struct LiteralPool {
    buffers: Vec<LiteralBuffer>,
}

impl LiteralPool {
    pub fn add(&mut self, buffer: LiteralBuffer) -> u32 {
        let index = u32_from_usize(self.buffers.len());
        self.buffers.push(buffer);
        index
    }

    pub fn get(&self, index: u32) -> Option<&LiteralBuffer> {
        self.buffers.get(index as usize)
    }

    pub fn buffers(&self) -> &[LiteralBuffer] {
        &self.buffers
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_info_lists_slots_in_order() {
        let names = vec!["a".to_string(), "b".to_string()];
        let buffer = LiteralBuffer::scope_info(&names);
        assert_eq!(
            buffer.literals,
            vec![
                Literal::Integer(2),
                Literal::String("a".into()),
                Literal::Integer(0),
                Literal::String("b".into()),
                Literal::Integer(1),
            ]
        );
    }

    #[test]
    fn numbers_prefer_integers() {
        assert_eq!(Literal::number(3.0), Literal::Integer(3));
        assert_eq!(Literal::number(0.5), Literal::Double(0.5));
        assert_eq!(Literal::number(-0.0), Literal::Double(-0.0));
        assert_eq!(Literal::number(4294967296.0), Literal::Double(4294967296.0));
    }

    #[test]
    fn literals_serialize_with_numeric_tags() {
        let json = serde_json::to_string(&Literal::MethodAffiliate(2)).unwrap();
        assert_eq!(json, r#"{"t":9,"v":2}"#);
        let json = serde_json::to_string(&Literal::String("x".into())).unwrap();
        assert_eq!(json, r#"{"t":5,"v":"x"}"#);
    }

    #[test]
    fn buffers_serialize_under_their_short_key() {
        let mut buffer = LiteralBuffer::new();
        buffer.push(Literal::Boolean(true));
        let json = serde_json::to_string(&buffer).unwrap();
        assert_eq!(json, r#"{"lb":[{"t":1,"v":true}]}"#);
    }

    #[test]
    fn pool_hands_out_sequential_ids() {
        let mut pool = LiteralPool::default();
        assert_eq!(pool.add(LiteralBuffer::new()), 0);
        assert_eq!(pool.add(LiteralBuffer::new()), 1);
        assert_eq!(pool.len(), 2);
    }
}
