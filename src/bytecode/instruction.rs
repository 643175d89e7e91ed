/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! Instruction set.
//!
//! The instructions are accumulator-centric: most read an operand from the
//! accumulator (`acc`) and leave their result there. The enum, mnemonics and
//! operand lists are generated from a single table by `define_instructions!`.

use super::operand::{Label, Operand, PushOperands, Register, StringId};

macro_rules! define_instructions {
    (
        $(
            $(#[$meta:meta])*
            $name:ident $mnemonic:literal { $($field:ident : $ty:ty),* $(,)? }
        ),* $(,)?
    ) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum Instruction {
            $(
                $(#[$meta])*
                $name { $($field: $ty),* },
            )*
        }

        /// Every mnemonic, in opcode order.
        pub const MNEMONICS: &[&str] = &[$($mnemonic),*];

        impl Instruction {
            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $(Instruction::$name { .. } => $mnemonic,)*
                }
            }

            /// Operands in encoding order.
            #[allow(unused_variables)]
            pub fn operands(&self) -> Vec<Operand> {
                let mut out = Vec::new();
                match self {
                    $(
                        Instruction::$name { $($field),* } => {
                            $( PushOperands::push_operands($field, &mut out); )*
                        }
                    )*
                }
                out
            }
        }
    };
}

define_instructions! {
    /// Pseudo-instruction marking a jump target.
    Label "label" { label: Label },

    // Accumulator and register moves
    Lda "lda" { src: Register },
    Sta "sta" { dst: Register },
    Mov "mov" { dst: Register, src: Register },
    Ldai "ldai" { value: i32 },
    Fldai "fldai" { value: f64 },
    LdaStr "lda.str" { string: StringId },
    LdBigInt "ldbigint" { value: StringId },

    // Constants
    LdUndefined "ldundefined" {},
    LdNull "ldnull" {},
    LdTrue "ldtrue" {},
    LdFalse "ldfalse" {},
    LdHole "ldhole" {},
    LdNan "ldnan" {},
    LdInfinity "ldinfinity" {},
    LdGlobal "ldglobal" {},
    LdFunction "ldfunction" {},
    LdNewTarget "ldnewtarget" {},
    LdThis "ldthis" {},

    // Globals
    TryLdGlobalByName "tryldglobalbyname" { name: StringId },
    TryStGlobalByName "trystglobalbyname" { name: StringId },
    LdGlobalVar "ldglobalvar" { name: StringId },
    StGlobalVar "stglobalvar" { name: StringId },
    StLetToGlobalRecord "stlettoglobalrecord" { name: StringId },
    StConstToGlobalRecord "stconsttoglobalrecord" { name: StringId },
    StClassToGlobalRecord "stclasstoglobalrecord" { name: StringId },

    // Lexical environments
    NewLexEnv "newlexenv" { slots: u32 },
    /// Environment carrying a scope-info literal for the debugger.
    NewLexEnvWithName "newlexenvwithname" { slots: u32, scope_info: u32 },
    PopLexEnv "poplexenv" {},
    LdLexVar "ldlexvar" { level: u32, slot: u32 },
    /// Stores `acc` into a slot.
    StLexVar "stlexvar" { level: u32, slot: u32 },

    // Module variables
    LdLocalModuleVar "ldlocalmodulevar" { index: u32 },
    LdExternalModuleVar "ldexternalmodulevar" { index: u32 },
    StModuleVar "stmodulevar" { index: u32 },
    GetModuleNamespace "getmodulenamespace" { index: u32 },

    // Guards
    /// Throws a ReferenceError naming `name` if `acc` is the hole.
    ThrowUndefinedIfHole "throw.undefinedifhole" { name: StringId },
    /// Throws a TypeError for assigning to the constant named by the register.
    ThrowConstAssignment "throw.constassignment" { name: Register },
    /// `0`: `this` must be initialized; `1`: `super()` must not have been called yet.
    ThrowIfSuperNotCorrectCall "throw.ifsupernotcorrectcall" { kind: i32 },
    ThrowDeleteSuperProperty "throw.deletesuperproperty" {},
    ThrowIfNotObject "throw.ifnotobject" { value: Register },
    Throw "throw" {},

    // Property access. Loads by name or index read the object from `acc`;
    // every other access takes the object in a register and the key or value
    // in `acc`.
    LdObjByName "ldobjbyname" { name: StringId },
    StObjByName "stobjbyname" { name: StringId, object: Register },
    LdObjByValue "ldobjbyvalue" { object: Register },
    StObjByValue "stobjbyvalue" { object: Register, key: Register },
    LdObjByIndex "ldobjbyindex" { index: u32 },
    StObjByIndex "stobjbyindex" { object: Register, index: u32 },
    StOwnByName "stownbyname" { name: StringId, object: Register },
    StOwnByValue "stownbyvalue" { object: Register, key: Register },
    StOwnByIndex "stownbyindex" { object: Register, index: u32 },
    DelObjProp "delobjprop" { object: Register },
    LdSuperByName "ldsuperbyname" { name: StringId },
    LdSuperByValue "ldsuperbyvalue" { object: Register },
    StSuperByName "stsuperbyname" { name: StringId, object: Register },
    StSuperByValue "stsuperbyvalue" { object: Register, key: Register },

    // Object creation
    CreateEmptyObject "createemptyobject" {},
    CreateEmptyArray "createemptyarray" {},
    CreateArrayWithBuffer "createarraywithbuffer" { literal: u32 },
    CreateObjectWithBuffer "createobjectwithbuffer" { literal: u32 },
    CreateRegExpWithLiteral "createregexpwithliteral" { pattern: StringId, flags: u32 },
    /// Spreads `acc` into `array` starting at the index held in `index`;
    /// leaves the next index in `acc`.
    StArraySpread "starrayspread" { array: Register, index: Register },
    CopyDataProperties "copydataproperties" { target: Register },
    DefineGetterSetterByValue "definegettersetterbyvalue" {
        object: Register,
        key: Register,
        getter: Register,
        setter: Register,
    },
    DefineFunc "definefunc" { function: StringId, length: u32 },
    DefineMethod "definemethod" { function: StringId, length: u32 },
    DefineClassWithBuffer "defineclasswithbuffer" {
        constructor: StringId,
        literal: u32,
        length: u32,
        base: Register,
    },
    GetTemplateObject "gettemplateobject" {},

    // Calls; the callee is in `acc`
    CallArgs "callargs" { args: Vec<Register> },
    CallThis "callthis" { this: Register, args: Vec<Register> },
    CallSpread "callspread" { function: Register, this: Register, args: Register },
    NewObjRange "newobjrange" { callee: Register, args: Vec<Register> },
    SuperCallThisRange "supercallthisrange" { args: Vec<Register> },
    SuperCallSpread "supercallspread" { args: Register },

    // Arguments
    CopyRestArgs "copyrestargs" { index: u32 },
    GetUnmappedArgs "getunmappedargs" {},

    // Iteration
    GetIterator "getiterator" {},
    CloseIterator "closeiterator" { iterator: Register },
    GetPropIterator "getpropiterator" {},
    GetNextPropName "getnextpropname" { iterator: Register },

    // Binary operators: `lhs <op> acc`
    Add2 "add2" { lhs: Register },
    Sub2 "sub2" { lhs: Register },
    Mul2 "mul2" { lhs: Register },
    Div2 "div2" { lhs: Register },
    Mod2 "mod2" { lhs: Register },
    Exp "exp" { lhs: Register },
    Shl2 "shl2" { lhs: Register },
    Ashr2 "ashr2" { lhs: Register },
    Shr2 "shr2" { lhs: Register },
    And2 "and2" { lhs: Register },
    Or2 "or2" { lhs: Register },
    Xor2 "xor2" { lhs: Register },
    Eq "eq" { lhs: Register },
    NotEq "noteq" { lhs: Register },
    StrictEq "stricteq" { lhs: Register },
    StrictNotEq "strictnoteq" { lhs: Register },
    Less "less" { lhs: Register },
    LessEq "lesseq" { lhs: Register },
    Greater "greater" { lhs: Register },
    GreaterEq "greatereq" { lhs: Register },
    IsIn "isin" { lhs: Register },
    InstanceOf "instanceof" { lhs: Register },

    // Unary operators on `acc`
    Neg "neg" {},
    Not "not" {},
    Inc "inc" {},
    Dec "dec" {},
    ToNumber "tonumber" {},
    ToNumeric "tonumeric" {},
    TypeOf "typeof" {},
    IsTrue "istrue" {},
    IsFalse "isfalse" {},

    // Control flow
    Jmp "jmp" { target: Label },
    /// Jumps if `acc` is false.
    Jeqz "jeqz" { target: Label },
    /// Jumps if `acc` is true.
    Jnez "jnez" { target: Label },
    Return "return" {},
    ReturnUndefined "returnundefined" {},
    Debugger "debugger" {},
}

impl Instruction {
    /// Encoded size in bytes: one opcode byte, the operands, and one prefix
    /// byte when any register needs the wide encoding. Labels take no space.
    pub fn encoded_size(&self) -> u32 {
        if matches!(self, Instruction::Label { .. }) {
            return 0;
        }
        let operands = self.operands();
        let wide = operands
            .iter()
            .any(|operand| matches!(operand, Operand::Register(register) if register.is_wide()));
        let size: u32 = operands.iter().map(|operand| operand.encoded_size()).sum();
        1 + size + u32::from(wide)
    }

    /// Position of the mnemonic in `MNEMONICS`.
    pub fn opcode(&self) -> u32 {
        let mnemonic = self.mnemonic();
        let index = MNEMONICS.iter().position(|candidate| *candidate == mnemonic).unwrap_or_default();
        crate::u32_from_usize(index)
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Instruction::Label { .. })
    }

    /// Instructions after which control never falls through.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Jmp { .. }
                | Instruction::Return {}
                | Instruction::ReturnUndefined {}
                | Instruction::Throw {}
                | Instruction::ThrowConstAssignment { .. }
                | Instruction::ThrowDeleteSuperProperty {}
        )
    }

    /// Jump targets referenced by this instruction.
    pub fn label_target(&self) -> Option<Label> {
        match self {
            Instruction::Jmp { target } | Instruction::Jeqz { target } | Instruction::Jnez { target } => {
                Some(*target)
            }
            _ => None,
        }
    }

    /// Registers referenced by this instruction.
    pub fn registers(&self) -> impl Iterator<Item = Register> {
        self.operands().into_iter().filter_map(|operand| match operand {
            Operand::Register(register) => Some(register),
            _ => None,
        })
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Instruction::Label { label } = self {
            return write!(f, "{}:", label.name());
        }
        write!(f, "{}", self.mnemonic())?;
        for (index, operand) in self.operands().iter().enumerate() {
            let separator = if index == 0 { " " } else { ", " };
            write!(f, "{separator}{operand}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_follow_operand_encodings() {
        assert_eq!(Instruction::Label { label: Label(0) }.encoded_size(), 0);
        assert_eq!(Instruction::LdUndefined {}.encoded_size(), 1);
        assert_eq!(Instruction::Lda { src: Register(3) }.encoded_size(), 2);
        assert_eq!(Instruction::Lda { src: Register(300) }.encoded_size(), 4);
        assert_eq!(Instruction::Ldai { value: 7 }.encoded_size(), 5);
        assert_eq!(Instruction::Fldai { value: 1.5 }.encoded_size(), 9);
        assert_eq!(Instruction::Jmp { target: Label(1) }.encoded_size(), 3);
        assert_eq!(
            Instruction::StObjByName {
                name: StringId(0),
                object: Register(1)
            }
            .encoded_size(),
            4
        );
        assert_eq!(
            Instruction::CallArgs {
                args: vec![Register(1), Register(2)]
            }
            .encoded_size(),
            3
        );
    }

    #[test]
    fn display_lists_operands() {
        let instruction = Instruction::StLexVar { level: 1, slot: 0 };
        assert_eq!(instruction.to_string(), "stlexvar 1, 0");
        assert_eq!(Instruction::Return {}.mnemonic(), "return");
        assert_eq!(
            Instruction::Mov {
                dst: Register(1),
                src: Register(2)
            }
            .to_string(),
            "mov v1, v2"
        );
    }
}
