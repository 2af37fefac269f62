//! Textual disassembler for decoded IL kernels.
//!
//! The output mirrors the vendor's listing format: a client-language line,
//! a version line, then one instruction per line with control-flow blocks
//! indented by four spaces. The disassembler is tolerant by design; an
//! opcode it does not know prints as `<opcode>?` and the dump continues.

use std::io::Write;

use log::warn;

use ilc_core::bits::{get_bit, get_bits};
use ilc_core::error::Result;
use ilc_core::il::{self, Op};
use ilc_core::kernel::{Destination, Instruction, Kernel, Source};

const LANG_NAMES: [&str; 15] = [
    "generic", "opengl", "dx8_ps", "dx8_vs", "dx9_ps", "dx9_vs", "dx10_ps", "dx10_vs", "dx10_gs",
    "dx11_ps", "dx11_vs", "dx11_gs", "dx11_cs", "dx11_hs", "dx11_ds",
];

const ZERO_OP_NAMES: [&str; 4] = ["fltmax", "zero", "infinity", "inf_else_max"];

const COMPSEL_NAMES: [&str; 6] = ["x", "y", "z", "w", "0", "1"];

const SHIFT_NAMES: [&str; 7] = ["", "_x2", "_x4", "_x8", "_d2", "_d4", "_d8"];

const DIV_COMP_NAMES: [&str; 5] = ["", "_divComp(y)", "_divComp(z)", "_divComp(w)", "_divComp(unknown)"];

const IMPORT_USAGE_NAMES: [&str; 25] = [
    "position",
    "pointsize",
    "color",
    "backcolor",
    "fog",
    "pixelSampleCoverage",
    "generic",
    "clipdistance",
    "culldistance",
    "primitiveid",
    "vertexid",
    "instanceid",
    "isfrontface",
    "lod",
    "coloring",
    "nodeColoring",
    "normal",
    "rendertargetArrayIndex",
    "viewportArrayIndex",
    "undefined",
    "sampleIndex",
    "edgeTessfactor",
    "insideTessfactor",
    "detailTessfactor",
    "densityTessfactor",
];

const PIX_TEX_USAGE_NAMES: [&str; 14] = [
    "unknown",
    "1d",
    "2d",
    "3d",
    "cubemap",
    "2dmsaa",
    "4comp",
    "buffer",
    "1darray",
    "2darray",
    "2darraymsaa",
    "2dPlusW",
    "cubemapPlusW",
    "cubemapArray",
];

const ELEMENT_FORMAT_NAMES: [&str; 8] = [
    "unknown", "snorm", "unorm", "sint", "uint", "float", "srgb", "mixed",
];

const INTERP_MODE_NAMES: [&str; 8] = [
    "",
    "_interp(constant)",
    "_interp(linear)",
    "_interp(linear_centroid)",
    "_interp(linear_noperspective)",
    "_interp(linear_noperspective_centroid)",
    "_interp(linear_sample)",
    "_interp(linear_noperspective_sample)",
];

const TS_DOMAIN_NAMES: [&str; 3] = ["isoline", "tri", "quad"];
const TS_PARTITION_NAMES: [&str; 4] = ["integer", "pow2", "fractional_odd", "fractional_even"];
const TS_OUTPUT_PRIMITIVE_NAMES: [&str; 4] = ["point", "line", "triangle_cw", "triangle_ccw"];

fn name_or(names: &'static [&'static str], index: usize) -> &'static str {
    names.get(index).copied().unwrap_or("?")
}

fn lang_name(client_type: u8) -> &'static str {
    name_or(&LANG_NAMES, client_type as usize)
}

fn reg_type_name(register_type: u8) -> &'static str {
    match register_type {
        il::reg::TEMP => "r",
        il::reg::ITEMP => "x",
        il::reg::CONST_BUFFER => "cb",
        il::reg::LITERAL => "l",
        il::reg::INPUT => "v",
        il::reg::OUTPUT => "o",
        _ => "?",
    }
}

fn import_usage_name(usage: u32) -> &'static str {
    name_or(&IMPORT_USAGE_NAMES, usage as usize)
}

fn mask_component_name(axis: &'static str, mode: u8) -> &'static str {
    match mode {
        il::modcomp::NOWRITE => "_",
        il::modcomp::WRITE => axis,
        il::modcomp::ZERO => "0",
        il::modcomp::ONE => "1",
        _ => "?",
    }
}

/// Kernel-to-text disassembler. One instance tracks the indentation of a
/// single listing.
pub struct Disassembler {
    indent: usize,
}

impl Disassembler {
    pub fn new() -> Self {
        Disassembler { indent: 0 }
    }

    /// Write the full listing for `kernel`.
    pub fn disassemble(&mut self, kernel: &Kernel, w: &mut dyn Write) -> Result<()> {
        writeln!(w, "{}", lang_name(kernel.client_type))?;
        writeln!(
            w,
            "il_{}_{}_{}{}{}",
            kernel.stage.mnemonic(),
            kernel.major_version,
            kernel.minor_version,
            if kernel.multipass { "_mp" } else { "" },
            if kernel.realtime { "_rt" } else { "" },
        )?;

        for instr in &kernel.instrs {
            self.write_instruction(instr, w)?;
        }
        Ok(())
    }

    fn write_destination(&self, dst: &Destination, w: &mut dyn Write) -> Result<()> {
        write!(
            w,
            "{}{} {}{}",
            name_or(&SHIFT_NAMES, dst.shift_scale as usize),
            if dst.clamp { "_sat" } else { "" },
            reg_type_name(dst.register_type),
            dst.register_num,
        )?;

        if !dst.writes_all_components() {
            write!(
                w,
                ".{}{}{}{}",
                mask_component_name("x", dst.component[0]),
                mask_component_name("y", dst.component[1]),
                mask_component_name("z", dst.component[2]),
                mask_component_name("w", dst.component[3]),
            )?;
        }
        Ok(())
    }

    fn write_source(&self, src: &Source, w: &mut dyn Write) -> Result<()> {
        write!(w, "{}{}", reg_type_name(src.register_type), src.register_num)?;

        if src.register_type == il::reg::ITEMP || src.register_type == il::reg::CONST_BUFFER {
            let indexed = src.has_immediate || !src.relative_srcs.is_empty();
            if indexed {
                write!(w, "[")?;
            }
            if let Some(relative) = src.relative_srcs.first() {
                self.write_source(relative, w)?;
            }
            if src.has_immediate && !src.relative_srcs.is_empty() {
                write!(w, "+")?;
            }
            if src.has_immediate {
                write!(w, "{}", src.immediate)?;
            }
            if indexed {
                write!(w, "]")?;
            }
        } else {
            if src.has_immediate {
                warn!("unhandled immediate value");
            }
            if !src.relative_srcs.is_empty() {
                warn!("unhandled relative source");
            }
        }

        if !src.has_identity_swizzle() {
            if src.swizzle[0] == src.swizzle[1]
                && src.swizzle[1] == src.swizzle[2]
                && src.swizzle[2] == src.swizzle[3]
            {
                write!(w, ".{}", name_or(&COMPSEL_NAMES, src.swizzle[0] as usize))?;
            } else {
                write!(
                    w,
                    ".{}{}{}{}",
                    name_or(&COMPSEL_NAMES, src.swizzle[0] as usize),
                    name_or(&COMPSEL_NAMES, src.swizzle[1] as usize),
                    name_or(&COMPSEL_NAMES, src.swizzle[2] as usize),
                    name_or(&COMPSEL_NAMES, src.swizzle[3] as usize),
                )?;
            }
        }

        if src.negate.iter().any(|x| *x) {
            write!(
                w,
                "_neg({}{}{}{})",
                if src.negate[0] { "x" } else { "" },
                if src.negate[1] { "y" } else { "" },
                if src.negate[2] { "z" } else { "" },
                if src.negate[3] { "w" } else { "" },
            )?;
        }

        write!(
            w,
            "{}{}{}{}{}{}{}{}",
            if src.invert { "_invert" } else { "" },
            if src.bias && !src.x2 { "_bias" } else { "" },
            if !src.bias && src.x2 { "_x2" } else { "" },
            if src.bias && src.x2 { "_bx2" } else { "" },
            if src.sign { "_sign" } else { "" },
            name_or(&DIV_COMP_NAMES, src.div_comp as usize),
            if src.abs { "_abs" } else { "" },
            if src.clamp { "_sat" } else { "" },
        )?;
        Ok(())
    }

    fn write_global_flags(&self, flags: u16, w: &mut dyn Write) -> Result<()> {
        let flag_names = [
            "refactoringAllowed",
            "forceEarlyDepthStencil",
            "enableRawStructuredBuffers",
            "enableDoublePrecisionFloatOps",
        ];

        let mut first = true;
        for (i, name) in flag_names.iter().enumerate() {
            if get_bit(flags as u32, i as u32) != 0 {
                write!(w, "{}{}", if first { " " } else { "|" }, name)?;
                first = false;
            }
        }
        Ok(())
    }

    /// Write the mnemonic with its opcode-specific control decorations.
    /// Returns false when the opcode is unknown and the operands must be
    /// skipped.
    fn write_mnemonic(&self, instr: &Instruction, w: &mut dyn Write) -> Result<bool> {
        let control = instr.control as u32;
        let ieee = if get_bit(control, 0) != 0 { "_ieee" } else { "" };

        let op = match instr.op() {
            Some(op) => op,
            None => {
                writeln!(w, "{}?", instr.opcode)?;
                return Ok(false);
            }
        };

        match op {
            Op::Abs => write!(w, "abs")?,
            Op::Acos => write!(w, "acos")?,
            Op::Add => write!(w, "add")?,
            Op::And => write!(w, "iand")?,
            Op::Asin => write!(w, "asin")?,
            Op::Atan => write!(w, "atan")?,
            Op::Break => write!(w, "break")?,
            Op::Breakc => write!(w, "breakc")?,
            Op::BreakLogicalZ => write!(w, "break_logicalz")?,
            Op::BreakLogicalNz => write!(w, "break_logicalnz")?,
            Op::Case => write!(w, "case {}", instr.extras.first().copied().unwrap_or(0))?,
            Op::CmovLogical => write!(w, "cmov_logical")?,
            Op::Continue => write!(w, "continue")?,
            Op::ContinueLogicalZ => write!(w, "continue_logicalz")?,
            Op::ContinueLogicalNz => write!(w, "continue_logicalnz")?,
            Op::CosVec => write!(w, "cos_vec")?,
            Op::DclArray => write!(w, "dclarray")?,
            Op::DclConstBuffer => {
                if get_bit(control, 15) != 0 {
                    warn!("unhandled immediate constant buffer");
                }
                write!(w, "dcl_cb")?;
            }
            Op::DclIndexedTempArray => write!(w, "dcl_indexed_temp_array")?,
            Op::DclInput => write!(
                w,
                "dcl_input_{}{}",
                import_usage_name(get_bits(control, 0, 4)),
                name_or(&INTERP_MODE_NAMES, get_bits(control, 5, 7) as usize),
            )?,
            Op::DclLiteral => write!(w, "dcl_literal")?,
            Op::DclOutput => write!(w, "dcl_output_{}", import_usage_name(get_bits(control, 0, 4)))?,
            Op::DclResource => {
                let fmts = instr.extras.first().copied().unwrap_or(0);
                write!(
                    w,
                    "dcl_resource_id({})_type({}{})_fmtx({})_fmty({})_fmtz({})_fmtw({})",
                    get_bits(control, 0, 7),
                    name_or(&PIX_TEX_USAGE_NAMES, get_bits(control, 8, 11) as usize),
                    if get_bit(control, 15) != 0 { ",unnorm" } else { "" },
                    name_or(&ELEMENT_FORMAT_NAMES, get_bits(fmts, 20, 22) as usize),
                    name_or(&ELEMENT_FORMAT_NAMES, get_bits(fmts, 23, 25) as usize),
                    name_or(&ELEMENT_FORMAT_NAMES, get_bits(fmts, 26, 28) as usize),
                    name_or(&ELEMENT_FORMAT_NAMES, get_bits(fmts, 29, 31) as usize),
                )?;
            }
            Op::Default => write!(w, "default")?,
            Op::DiscardLogicalZ => write!(w, "discard_logicalz")?,
            Op::DiscardLogicalNz => write!(w, "discard_logicalnz")?,
            Op::Div => write!(w, "div_zeroop({})", name_or(&ZERO_OP_NAMES, (control & 3) as usize))?,
            Op::Dp2 => write!(w, "dp2{}", ieee)?,
            Op::Dp3 => write!(w, "dp3{}", ieee)?,
            Op::Dp4 => write!(w, "dp4{}", ieee)?,
            Op::Dsx => write!(w, "dsx{}", if get_bit(control, 7) != 0 { "_fine" } else { "" })?,
            Op::Dsy => write!(w, "dsy{}", if get_bit(control, 7) != 0 { "_fine" } else { "" })?,
            Op::Else => write!(w, "else")?,
            Op::End => write!(w, "end")?,
            Op::EndIf => write!(w, "endif")?,
            Op::EndLoop => write!(w, "endloop")?,
            Op::EndMain => write!(w, "endmain")?,
            Op::EndSwitch => write!(w, "endswitch")?,
            Op::Eq => write!(w, "eq")?,
            Op::ExpVec => write!(w, "exp_vec")?,
            Op::Fetch4 => write!(
                w,
                "fetch4_resource({})_sampler({})",
                get_bits(control, 0, 7),
                get_bits(control, 8, 11)
            )?,
            Op::Fetch4C => write!(
                w,
                "fetch4_c_resource({})_sampler({})",
                get_bits(control, 0, 7),
                get_bits(control, 8, 11)
            )?,
            Op::Fetch4Po => write!(
                w,
                "fetch4_po_resource({})_sampler({})",
                get_bits(control, 0, 7),
                get_bits(control, 8, 11)
            )?,
            Op::Fetch4PoC => write!(
                w,
                "fetch4_po_c_resource({})_sampler({})",
                get_bits(control, 0, 7),
                get_bits(control, 8, 11)
            )?,
            Op::Frc => write!(w, "frc")?,
            Op::Ftoi => write!(w, "ftoi")?,
            Op::Ftou => write!(w, "ftou")?,
            Op::Ge => write!(w, "ge")?,
            Op::IfLogicalZ => write!(w, "if_logicalz")?,
            Op::IfLogicalNz => write!(w, "if_logicalnz")?,
            Op::Itof => write!(w, "itof")?,
            Op::Load => {
                // The sampler id is ignored for plain loads.
                write!(w, "load_resource({})", get_bits(control, 0, 7))?;
            }
            Op::LogVec => write!(w, "log_vec")?,
            Op::Lt => write!(w, "lt")?,
            Op::Mad => write!(w, "mad{}", ieee)?,
            Op::Max => write!(w, "max{}", ieee)?,
            Op::Min => write!(w, "min{}", ieee)?,
            Op::Mov => write!(w, "mov")?,
            Op::Mul => write!(w, "mul{}", ieee)?,
            Op::Ne => write!(w, "ne")?,
            Op::ResInfo => {
                if get_bits(control, 9, 15) != 0 {
                    warn!("unhandled resinfo flags 0x{:X}", instr.control);
                }
                write!(
                    w,
                    "resinfo_resource({}){}",
                    get_bits(control, 0, 7),
                    if get_bit(control, 8) != 0 { "_uint" } else { "" },
                )?;
            }
            Op::RetDyn => write!(w, "ret_dyn")?,
            Op::RoundNear => write!(w, "round_nearest")?,
            Op::RoundNegInf => write!(w, "round_neginf")?,
            Op::RoundPlusInf => write!(w, "round_plusinf")?,
            Op::RoundZero => write!(w, "round_z")?,
            Op::RsqVec => write!(w, "rsq_vec")?,
            Op::Sample
            | Op::SampleB
            | Op::SampleG
            | Op::SampleL
            | Op::SampleCLz => {
                let suffix = match op {
                    Op::SampleB => "_b",
                    Op::SampleG => "_g",
                    Op::SampleL => "_l",
                    Op::SampleCLz => "_c_lz",
                    _ => "",
                };
                if get_bits(control, 12, 15) != 0 {
                    warn!("unhandled sample{} flags 0x{:X}", suffix, instr.control);
                }
                write!(
                    w,
                    "sample{}_resource({})_sampler({})",
                    suffix,
                    get_bits(control, 0, 7),
                    get_bits(control, 8, 11),
                )?;
            }
            Op::SinVec => write!(w, "sin_vec")?,
            Op::SqrtVec => write!(w, "sqrt_vec")?,
            Op::Switch => write!(w, "switch")?,
            Op::Utof => write!(w, "utof")?,
            Op::While => write!(w, "whileloop")?,
            Op::IAdd => write!(w, "iadd")?,
            Op::IBitExtract => write!(w, "ibit_extract")?,
            Op::IFirstBit => write!(w, "ifirstbit")?,
            Op::IEq => write!(w, "ieq")?,
            Op::IGe => write!(w, "ige")?,
            Op::ILt => write!(w, "ilt")?,
            Op::IMad => write!(w, "imad")?,
            Op::IMax => write!(w, "imax")?,
            Op::IMin => write!(w, "imin")?,
            Op::IMul => write!(w, "imul")?,
            Op::INe => write!(w, "ine")?,
            Op::INegate => write!(w, "inegate")?,
            Op::INot => write!(w, "inot")?,
            Op::IOr => write!(w, "ior")?,
            Op::IShl => write!(w, "ishl")?,
            Op::IShr => write!(w, "ishr")?,
            Op::IXor => write!(w, "ixor")?,
            Op::UBitExtract => write!(w, "ubit_extract")?,
            Op::UBitInsert => write!(w, "ubit_insert")?,
            Op::UDiv => write!(w, "udiv")?,
            Op::UGe => write!(w, "uge")?,
            Op::ULt => write!(w, "ult")?,
            Op::UMax => write!(w, "umax")?,
            Op::UMin => write!(w, "umin")?,
            Op::UMod => write!(w, "umod")?,
            Op::UShr => write!(w, "ushr")?,
            Op::F2F16 => write!(w, "f_2_f16")?,
            Op::F162F => write!(w, "f16_2_f")?,
            Op::DclNumThreadPerGroup => {
                write!(w, "dcl_num_thread_per_group")?;
                for (i, extra) in instr.extras.iter().enumerate() {
                    write!(w, "{}{}", if i == 0 { " " } else { ", " }, extra)?;
                }
            }
            Op::Fence => write!(w, "fence")?,
            Op::DclLds => write!(
                w,
                "dcl_lds_id({}) {}",
                get_bits(control, 0, 13),
                instr.extras.first().copied().unwrap_or(0)
            )?,
            Op::DclStructLds => write!(
                w,
                "dcl_struct_lds_id({}) {} {}",
                get_bits(control, 0, 13),
                instr.extras.first().copied().unwrap_or(0),
                instr.extras.get(1).copied().unwrap_or(0),
            )?,
            Op::LdsLoadVec => write!(w, "lds_load_vec_id({})", get_bits(control, 0, 13))?,
            Op::LdsStoreVec => write!(w, "lds_store_vec_id({})", get_bits(control, 0, 13))?,
            Op::LdsReadAdd => write!(w, "lds_read_add_id({})", get_bits(control, 0, 13))?,
            Op::DclUav => write!(
                w,
                "dcl_uav_id({})_type({})_fmtx({})",
                get_bits(control, 0, 3),
                name_or(&PIX_TEX_USAGE_NAMES, get_bits(control, 8, 11) as usize),
                name_or(&ELEMENT_FORMAT_NAMES, get_bits(control, 4, 7) as usize),
            )?,
            Op::DclRawUav => write!(w, "dcl_raw_uav_id({})", get_bits(control, 0, 13))?,
            Op::UavLoad => write!(w, "uav_load_id({})", get_bits(control, 0, 13))?,
            Op::UavStructLoad => write!(w, "uav_struct_load_id({})", get_bits(control, 0, 13))?,
            Op::UavStore => write!(w, "uav_store_id({})", get_bits(control, 0, 13))?,
            Op::UavRawStore => write!(w, "uav_raw_store_id({})", get_bits(control, 0, 13))?,
            Op::UavStructStore => write!(w, "uav_struct_store_id({})", get_bits(control, 0, 13))?,
            Op::UavAdd => write!(w, "uav_add_id({})", get_bits(control, 0, 13))?,
            Op::UavReadAdd => write!(w, "uav_read_add_id({})", get_bits(control, 0, 13))?,
            Op::AppendBufAlloc => write!(w, "append_buf_alloc_id({})", get_bits(control, 0, 13))?,
            Op::DclRawSrv => write!(w, "dcl_raw_srv_id({})", get_bits(control, 0, 13))?,
            Op::DclStructSrv => write!(
                w,
                "dcl_struct_srv_id({}) {}",
                get_bits(control, 0, 13),
                instr.extras.first().copied().unwrap_or(0),
            )?,
            Op::SrvStructLoad => write!(
                w,
                "srv_struct_load{}_id({})",
                if get_bit(control, 12) != 0 { "_ext" } else { "" },
                get_bits(control, 0, 7),
            )?,
            Op::DclNumIcp => write!(w, "dcl_num_icp {}", instr.extras.first().copied().unwrap_or(0))?,
            Op::DclNumOcp => write!(w, "dcl_num_ocp {}", instr.extras.first().copied().unwrap_or(0))?,
            Op::HsForkPhase => write!(w, "hs_fork_phase")?,
            Op::HsJoinPhase => write!(w, "hs_join_phase")?,
            Op::EndPhase => write!(w, "endphase")?,
            Op::DclTsDomain => write!(
                w,
                "dcl_ts_domain_{}",
                name_or(&TS_DOMAIN_NAMES, get_bits(control, 0, 1) as usize)
            )?,
            Op::DclTsPartition => write!(
                w,
                "dcl_ts_partition_{}",
                name_or(&TS_PARTITION_NAMES, get_bits(control, 0, 1) as usize)
            )?,
            Op::DclTsOutputPrimitive => write!(
                w,
                "dcl_ts_output_primitive_{}",
                name_or(&TS_OUTPUT_PRIMITIVE_NAMES, get_bits(control, 0, 1) as usize)
            )?,
            Op::DclMaxTessFactor => write!(
                w,
                "dcl_max_tessfactor 0x{:08X}",
                instr.extras.first().copied().unwrap_or(0)
            )?,
            Op::DclGlobalFlags => write!(w, "dcl_global_flags")?,
            Op::DclTypedUav => write!(
                w,
                "dcl_typed_uav_id({})_type({})_fmtx({})",
                get_bits(control, 0, 13),
                name_or(
                    &PIX_TEX_USAGE_NAMES,
                    get_bits(instr.extras.first().copied().unwrap_or(0), 0, 3) as usize
                ),
                name_or(
                    &ELEMENT_FORMAT_NAMES,
                    get_bits(instr.extras.first().copied().unwrap_or(0), 4, 9) as usize
                ),
            )?,
            Op::DclTypelessUav => write!(w, "dcl_typeless_uav_id({})", get_bits(control, 0, 13))?,
            Op::RcpVec => write!(w, "rcp_vec")?,
            Op::Unk660 | Op::Prefix => write!(w, "unk_{}", instr.opcode)?,
        }
        Ok(true)
    }

    fn write_instruction(&mut self, instr: &Instruction, w: &mut dyn Write) -> Result<()> {
        match instr.op() {
            Some(Op::Else) | Some(Op::EndIf) | Some(Op::EndLoop) => {
                self.indent = self.indent.saturating_sub(1);
            }
            _ => {}
        }

        for _ in 0..self.indent {
            write!(w, "    ")?;
        }

        match instr.op() {
            Some(Op::Else) | Some(Op::IfLogicalZ) | Some(Op::IfLogicalNz) | Some(Op::While) => {
                self.indent += 1;
            }
            _ => {}
        }

        if !self.write_mnemonic(instr, w)? {
            // Unknown opcode; the line is already terminated.
            return Ok(());
        }

        for dst in &instr.dsts {
            self.write_destination(dst, w)?;
        }

        for (i, src) in instr.srcs.iter().enumerate() {
            if i > 0 || !instr.dsts.is_empty() {
                write!(w, ",")?;
            }
            write!(w, " ")?;
            self.write_source(src, w)?;
        }

        if instr.op() == Some(Op::DclLiteral) {
            for extra in &instr.extras {
                write!(w, ", 0x{:08X}", extra)?;
            }
        } else if instr.op() == Some(Op::DclGlobalFlags) {
            self.write_global_flags(instr.control, w)?;
        }

        writeln!(w)?;
        Ok(())
    }
}

impl Default for Disassembler {
    fn default() -> Self {
        Disassembler::new()
    }
}

/// Disassemble a kernel to a string.
pub fn disassemble_to_string(kernel: &Kernel) -> Result<String> {
    let mut out = Vec::new();
    Disassembler::new().disassemble(kernel, &mut out)?;
    Ok(String::from_utf8(out)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use ilc_core::decode::decode_stream;
    use ilc_core::il::reg;

    fn vs_stream(body: &[u32]) -> Vec<u32> {
        let mut tokens = vec![0x00000000, 0x00010100];
        tokens.extend_from_slice(body);
        tokens
    }

    #[test]
    fn test_header_lines() {
        let kernel = decode_stream(&vs_stream(&[])).unwrap();
        let text = disassemble_to_string(&kernel).unwrap();
        assert_eq!(text, "generic\nil_vs_1_0\n");
    }

    #[test]
    fn test_mov_with_scalar_swizzle() {
        // mov r0, v0.x
        let modifier = 0u32 | (0 << 4) | (0 << 8) | (0 << 12);
        let tokens = vs_stream(&[
            Op::Mov as u32,
            (reg::TEMP as u32) << 16,
            ((reg::INPUT as u32) << 16) | (1 << 22),
            modifier,
        ]);
        let kernel = decode_stream(&tokens).unwrap();
        let text = disassemble_to_string(&kernel).unwrap();
        let line = text.lines().nth(2).unwrap();
        assert_eq!(line, "mov r0, v0.x");
    }

    #[test]
    fn test_control_flow_indentation() {
        // if_logicalz r0 / mov r0, r1 / endif
        let tokens = vs_stream(&[
            Op::IfLogicalZ as u32,
            (reg::TEMP as u32) << 16,
            Op::Mov as u32,
            (reg::TEMP as u32) << 16,
            ((reg::TEMP as u32) << 16) | 1,
            Op::EndIf as u32,
            Op::EndMain as u32,
            Op::End as u32,
        ]);
        let kernel = decode_stream(&tokens).unwrap();
        let text = disassemble_to_string(&kernel).unwrap();
        let lines = text.lines().skip(2).collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec!["if_logicalz r0", "    mov r0, r1", "endif", "endmain", "end"]
        );
    }

    #[test]
    fn test_unknown_opcode_is_tolerated() {
        let tokens = vs_stream(&[75, Op::EndMain as u32]);
        let kernel = decode_stream(&tokens).unwrap();
        let text = disassemble_to_string(&kernel).unwrap();
        let lines = text.lines().skip(2).collect::<Vec<_>>();
        assert_eq!(lines, vec!["75?", "endmain"]);
    }

    #[test]
    fn test_literal_extras() {
        let tokens = vs_stream(&[
            Op::DclLiteral as u32,
            (reg::LITERAL as u32) << 16,
            0x3F800000,
            0x00000000,
            0x3F000000,
            0xBF800000,
        ]);
        let kernel = decode_stream(&tokens).unwrap();
        let text = disassemble_to_string(&kernel).unwrap();
        let line = text.lines().nth(2).unwrap();
        assert_eq!(
            line,
            "dcl_literal l0, 0x3F800000, 0x00000000, 0x3F000000, 0xBF800000"
        );
    }

    #[test]
    fn test_negate_and_modifier_suffixes() {
        // add r0, v0_neg(xyzw), v1_abs
        let neg_modifier = (0u32) | (1 << 4) | (2 << 8) | (3 << 12) | (1 << 3) | (1 << 7) | (1 << 11) | (1 << 15);
        let abs_modifier = (0u32) | (1 << 4) | (2 << 8) | (3 << 12) | (1 << 20);
        let tokens = vs_stream(&[
            Op::Add as u32,
            (reg::TEMP as u32) << 16,
            ((reg::INPUT as u32) << 16) | (1 << 22),
            neg_modifier,
            (((reg::INPUT as u32) << 16) | 1) | (1 << 22),
            abs_modifier,
        ]);
        let kernel = decode_stream(&tokens).unwrap();
        let text = disassemble_to_string(&kernel).unwrap();
        let line = text.lines().nth(2).unwrap();
        assert_eq!(line, "add r0, v0_neg(xyzw), v1_abs");
    }

    #[test]
    fn test_const_buffer_indexing() {
        // mov r0, cb0[4]
        let tokens = vs_stream(&[
            Op::Mov as u32,
            (reg::TEMP as u32) << 16,
            ((reg::CONST_BUFFER as u32) << 16) | (1 << 26),
            4,
        ]);
        let kernel = decode_stream(&tokens).unwrap();
        let text = disassemble_to_string(&kernel).unwrap();
        assert_eq!(text.lines().nth(2).unwrap(), "mov r0, cb0[4]");
    }
}
