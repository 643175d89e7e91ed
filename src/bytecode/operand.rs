/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// A virtual register of one function.
///
/// Parameters occupy the lowest registers, in parameter order. Locals and
/// temporaries are numbered after them. The downstream register allocator
/// maps these onto machine registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(pub u32);

impl Register {
    /// Registers below this index encode in one byte.
    pub const SHORT_LIMIT: u32 = 256;

    pub fn is_wide(self) -> bool {
        self.0 >= Self::SHORT_LIMIT
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A jump target.
///
/// Ids are unique across the whole process, so labels from different
/// functions never collide. They are turned into names only when the
/// function is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

static NEXT_LABEL_ID: AtomicU32 = AtomicU32::new(0);

impl Label {
    pub fn fresh() -> Self {
        Label(NEXT_LABEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn name(self) -> String {
        format!("LABEL_{}", self.0)
    }
}

/// Index into the program string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringId(pub u32);

/// An immediate operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    Int(i32),
    Float(f64),
}

/// Every operand an instruction can carry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Register(Register),
    Immediate(Immediate),
    Label(Label),
    StringId(StringId),
}

impl Operand {
    /// Encoded size in bytes, not counting a wide prefix.
    pub fn encoded_size(self) -> u32 {
        match self {
            Operand::Register(register) if register.is_wide() => 2,
            Operand::Register(_) => 1,
            Operand::Immediate(Immediate::Int(_)) => 4,
            Operand::Immediate(Immediate::Float(_)) => 8,
            Operand::Label(_) => 2,
            Operand::StringId(_) => 2,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(register) => write!(f, "{register}"),
            Operand::Immediate(Immediate::Int(value)) => write!(f, "{value}"),
            Operand::Immediate(Immediate::Float(value)) => write!(f, "{value:?}"),
            Operand::Label(label) => write!(f, "{}", label.name()),
            Operand::StringId(id) => write!(f, "str:{}", id.0),
        }
    }
}

/// Field types an instruction may hold, flattened into operands.
pub trait PushOperands {
    fn push_operands(&self, out: &mut Vec<Operand>);
}

impl PushOperands for Register {
    fn push_operands(&self, out: &mut Vec<Operand>) {
        out.push(Operand::Register(*self));
    }
}

impl PushOperands for Label {
    fn push_operands(&self, out: &mut Vec<Operand>) {
        out.push(Operand::Label(*self));
    }
}

impl PushOperands for StringId {
    fn push_operands(&self, out: &mut Vec<Operand>) {
        out.push(Operand::StringId(*self));
    }
}

impl PushOperands for i32 {
    fn push_operands(&self, out: &mut Vec<Operand>) {
        out.push(Operand::Immediate(Immediate::Int(*self)));
    }
}

impl PushOperands for u32 {
    fn push_operands(&self, out: &mut Vec<Operand>) {
        let value = i32::try_from(*self).expect("immediate exceeds i32::MAX");
        out.push(Operand::Immediate(Immediate::Int(value)));
    }
}

impl PushOperands for f64 {
    fn push_operands(&self, out: &mut Vec<Operand>) {
        out.push(Operand::Immediate(Immediate::Float(*self)));
    }
}

impl PushOperands for Vec<Register> {
    fn push_operands(&self, out: &mut Vec<Operand>) {
        out.extend(self.iter().map(|register| Operand::Register(*register)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operand_sizes() {
        assert_eq!(Operand::Register(Register(255)).encoded_size(), 1);
        assert_eq!(Operand::Register(Register(256)).encoded_size(), 2);
        assert_eq!(Operand::Immediate(Immediate::Int(-1)).encoded_size(), 4);
        assert_eq!(Operand::Immediate(Immediate::Float(0.5)).encoded_size(), 8);
        assert_eq!(Operand::Label(Label(3)).encoded_size(), 2);
        assert_eq!(Operand::StringId(StringId(3)).encoded_size(), 2);
    }

    #[test]
    fn labels_are_unique() {
        let a = Label::fresh();
        let b = Label::fresh();
        assert_ne!(a, b);
        assert_eq!(Label(7).name(), "LABEL_7");
    }
}
