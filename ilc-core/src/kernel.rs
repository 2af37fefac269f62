//! Decoded kernel representation.
//!
//! The tree is fully owned: the kernel owns its instructions, instructions
//! own their operands, and operands own the sub-sources their addressing
//! modes reference. Dropping the kernel releases everything in one
//! post-order pass.

use crate::il::{self, Op, ShaderStage};

/// A source operand, including swizzle, modifiers and relative addressing.
#[derive(Clone, Debug, PartialEq)]
pub struct Source {
    pub register_num: u32,
    pub register_type: u8,
    pub swizzle: [u8; 4],
    pub negate: [bool; 4],
    pub invert: bool,
    pub bias: bool,
    pub x2: bool,
    pub sign: bool,
    pub abs: bool,
    pub div_comp: u8,
    pub clamp: bool,
    /// Address registers under register-relative addressing, outer first.
    pub relative_srcs: Vec<Source>,
    pub has_immediate: bool,
    pub immediate: u32,
}

impl Default for Source {
    fn default() -> Self {
        Source {
            register_num: 0,
            register_type: 0,
            swizzle: [il::compsel::X, il::compsel::Y, il::compsel::Z, il::compsel::W],
            negate: [false; 4],
            invert: false,
            bias: false,
            x2: false,
            sign: false,
            abs: false,
            div_comp: il::divcomp::NONE,
            clamp: false,
            relative_srcs: Vec::new(),
            has_immediate: false,
            immediate: 0,
        }
    }
}

impl Source {
    pub fn has_identity_swizzle(&self) -> bool {
        self.swizzle == [il::compsel::X, il::compsel::Y, il::compsel::Z, il::compsel::W]
    }
}

/// A destination operand, including write mask, modifiers and addressing.
#[derive(Clone, Debug, PartialEq)]
pub struct Destination {
    pub register_num: u32,
    pub register_type: u8,
    /// Per-lane write mode, one of the `il::modcomp` values.
    pub component: [u8; 4],
    pub clamp: bool,
    pub shift_scale: u8,
    /// Sub-source consumed by absolute addressing with the dimension bit.
    pub absolute_src: Option<Box<Source>>,
    /// Address registers under register-relative addressing, outer first.
    pub relative_srcs: Vec<Source>,
    pub has_immediate: bool,
    pub immediate: u32,
}

impl Default for Destination {
    fn default() -> Self {
        Destination {
            register_num: 0,
            register_type: 0,
            component: [il::modcomp::WRITE; 4],
            clamp: false,
            shift_scale: il::shift::NONE,
            absolute_src: None,
            relative_srcs: Vec::new(),
            has_immediate: false,
            immediate: 0,
        }
    }
}

impl Destination {
    pub fn writes_all_components(&self) -> bool {
        self.component == [il::modcomp::WRITE; 4]
    }
}

/// One decoded instruction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Instruction {
    pub opcode: u16,
    pub control: u16,
    pub pri_modifier: Option<u32>,
    pub sec_modifier: Option<u32>,
    pub resource_format: Option<u32>,
    pub address_offset: Option<u32>,
    /// Low four control bits of a preceding precise prefix.
    pub precise_mask: u8,
    pub dsts: Vec<Destination>,
    pub srcs: Vec<Source>,
    pub extras: Vec<u32>,
}

impl Instruction {
    /// The typed opcode, if the numeric value names one.
    pub fn op(&self) -> Option<Op> {
        Op::from_u16(self.opcode)
    }
}

/// A fully decoded shader kernel.
#[derive(Clone, Debug)]
pub struct Kernel {
    pub client_type: u8,
    pub major_version: u8,
    pub minor_version: u8,
    pub stage: ShaderStage,
    pub multipass: bool,
    pub realtime: bool,
    pub instrs: Vec<Instruction>,
}
