//! Source-IL binary decoder.
//!
//! The decoder is strict about stream bounds (running out of tokens mid
//! instruction is a hard error) and lenient about content: unknown opcodes
//! and unhandled addressing forms are logged and recorded without their
//! operands, so one bad instruction does not take down the whole stream.

use log::{error, warn};

use crate::bits::{get_bit, get_bits};
use crate::error::{bail, Result};
use crate::il::{self, Op, ShaderStage};
use crate::kernel::{Destination, Instruction, Kernel, Source};

struct Tokens<'a> {
    inner: &'a [u32],
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(inner: &'a [u32]) -> Self {
        Tokens { inner, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.inner.len()
    }

    fn next(&mut self) -> Result<u32> {
        match self.inner.get(self.pos) {
            Some(x) => {
                self.pos += 1;
                Ok(*x)
            }
            None => bail!("token stream is truncated"),
        }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u32]> {
        if count > self.inner.len() - self.pos {
            bail!(
                "instruction claims {} extra tokens but only {} remain",
                count,
                self.inner.len() - self.pos
            );
        }
        let words = &self.inner[self.pos..self.pos + count];
        self.pos += count;
        Ok(words)
    }
}

fn decode_source(t: &mut Tokens) -> Result<Source> {
    let mut src = Source::default();

    let word = t.next()?;
    src.register_num = get_bits(word, 0, 15);
    src.register_type = get_bits(word, 16, 21) as u8;
    let modifier_present = get_bit(word, 22) != 0;
    let relative_address = get_bits(word, 23, 24);
    let dimension = get_bit(word, 25) != 0;
    src.has_immediate = get_bit(word, 26) != 0;
    let extended = get_bit(word, 31) != 0;

    if modifier_present {
        let modifier = t.next()?;
        src.swizzle = [
            get_bits(modifier, 0, 2) as u8,
            get_bits(modifier, 4, 6) as u8,
            get_bits(modifier, 8, 10) as u8,
            get_bits(modifier, 12, 14) as u8,
        ];
        src.negate = [
            get_bit(modifier, 3) != 0,
            get_bit(modifier, 7) != 0,
            get_bit(modifier, 11) != 0,
            get_bit(modifier, 15) != 0,
        ];
        src.invert = get_bit(modifier, 16) != 0;
        src.bias = get_bit(modifier, 17) != 0;
        src.x2 = get_bit(modifier, 18) != 0;
        src.sign = get_bit(modifier, 19) != 0;
        src.abs = get_bit(modifier, 20) != 0;
        src.div_comp = get_bits(modifier, 21, 23) as u8;
        src.clamp = get_bit(modifier, 24) != 0;
    }

    match relative_address {
        il::addr::ABSOLUTE => {
            if dimension {
                src.relative_srcs.push(decode_source(t)?);
            }
        }
        il::addr::RELATIVE => {
            warn!("unhandled relative addressing");
        }
        il::addr::REG_RELATIVE => {
            src.relative_srcs.push(decode_source(t)?);
            // The immediate follows the first address register.
            if src.has_immediate {
                src.immediate = t.next()?;
            }
            if dimension {
                src.relative_srcs.push(decode_source(t)?);
            }
        }
        _ => {
            warn!("invalid addressing mode {}", relative_address);
        }
    }

    if src.has_immediate && relative_address != il::addr::REG_RELATIVE {
        src.immediate = t.next()?;
    }

    if extended {
        warn!("unhandled extended register addressing");
    }

    Ok(src)
}

fn decode_destination(t: &mut Tokens) -> Result<Destination> {
    let mut dst = Destination::default();

    let word = t.next()?;
    dst.register_num = get_bits(word, 0, 15);
    dst.register_type = get_bits(word, 16, 21) as u8;
    let modifier_present = get_bit(word, 22) != 0;
    let relative_address = get_bits(word, 23, 24);
    let dimension = get_bit(word, 25) != 0;
    dst.has_immediate = get_bit(word, 26) != 0;
    let extended = get_bit(word, 31) != 0;

    if modifier_present {
        let modifier = t.next()?;
        dst.component = [
            get_bits(modifier, 0, 1) as u8,
            get_bits(modifier, 2, 3) as u8,
            get_bits(modifier, 4, 5) as u8,
            get_bits(modifier, 6, 7) as u8,
        ];
        dst.clamp = get_bit(modifier, 8) != 0;
        dst.shift_scale = get_bits(modifier, 9, 12) as u8;
    }

    match relative_address {
        il::addr::ABSOLUTE => {
            if dimension {
                dst.absolute_src = Some(Box::new(decode_source(t)?));
            }
        }
        il::addr::RELATIVE => {
            warn!("unhandled relative addressing");
        }
        il::addr::REG_RELATIVE => {
            dst.relative_srcs.push(decode_source(t)?);
            // The immediate follows the first address register.
            if dst.has_immediate {
                dst.immediate = t.next()?;
            }
            if dimension {
                dst.relative_srcs.push(decode_source(t)?);
            }
        }
        _ => {
            warn!("invalid addressing mode {}", relative_address);
        }
    }

    if dst.has_immediate && relative_address != il::addr::REG_RELATIVE {
        dst.immediate = t.next()?;
    }

    if extended {
        warn!("unhandled extended register addressing");
    }

    Ok(dst)
}

fn source_count(op: Op, control: u16) -> usize {
    let info = il::op_info(op);
    let indexed_args = get_bit(control as u32, 12) != 0;
    let pri_modifier_present = get_bit(control as u32, 15) != 0;

    if op.has_indexed_resource_sampler() && indexed_args {
        // The indexed-args form appends resource index and sampler index
        // sources after the regular arguments.
        info.src_count as usize + 2
    } else if op == Op::SrvStructLoad && indexed_args {
        info.src_count as usize + 1
    } else if op == Op::DclConstBuffer && !pri_modifier_present {
        // Non-immediate constant buffer.
        info.src_count as usize + 1
    } else {
        info.src_count as usize
    }
}

fn extra_count(op: Op, control: u16, pri_modifier: Option<u32>) -> usize {
    let info = il::op_info(op);
    let pri_modifier_present = get_bit(control as u32, 15) != 0;

    if op == Op::DclConstBuffer && pri_modifier_present {
        // Immediate constant buffer body.
        info.extra_count as usize + pri_modifier.unwrap_or(0) as usize
    } else if op == Op::DclNumThreadPerGroup {
        // Variable dimension count.
        info.extra_count as usize + get_bits(control as u32, 0, 13) as usize
    } else {
        info.extra_count as usize
    }
}

fn decode_instruction(t: &mut Tokens) -> Result<Instruction> {
    let mut instr = Instruction::default();
    let mut prefix_control = 0u16;

    loop {
        let word = t.next()?;
        instr.opcode = get_bits(word, 0, 15) as u16;
        instr.control = get_bits(word, 16, 31) as u16;

        // A prefix only carries control bits for the instruction after it.
        if instr.opcode == Op::Prefix as u16 {
            prefix_control = instr.control;
            continue;
        }
        break;
    }

    if instr.opcode >= il::OP_LAST {
        error!("invalid opcode {}", instr.opcode);
        return Ok(instr);
    }

    let op = match instr.op() {
        Some(op) => op,
        None => {
            warn!("unhandled opcode {}", instr.opcode);
            return Ok(instr);
        }
    };

    if op != Op::DclResource {
        if get_bit(instr.control as u32, 15) != 0 {
            instr.pri_modifier = Some(t.next()?);
        }
        if get_bit(instr.control as u32, 14) != 0 {
            instr.sec_modifier = Some(t.next()?);
        }
    }

    if op.has_indexed_resource_sampler() {
        if get_bit(instr.control as u32, 12) != 0 {
            instr.resource_format = Some(t.next()?);
        }
        if get_bit(instr.control as u32, 13) != 0 {
            instr.address_offset = Some(t.next()?);
        }
    }

    let info = il::op_info(op);
    for _ in 0..info.dst_count {
        let dst = decode_destination(t)?;
        instr.dsts.push(dst);
    }

    for _ in 0..source_count(op, instr.control) {
        let src = decode_source(t)?;
        instr.srcs.push(src);
    }

    instr.extras = t
        .take(extra_count(op, instr.control, instr.pri_modifier))?
        .to_vec();

    instr.precise_mask = (prefix_control & 0xF) as u8;

    Ok(instr)
}

/// Reinterpret raw shader bytes as a little-endian token stream.
pub fn tokens_from_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        bail!("shader size {} is not a multiple of 4", bytes.len());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|x| u32::from_le_bytes(x.try_into().unwrap()))
        .collect())
}

/// Decode a whole token stream into a kernel. Consumes exactly
/// `tokens.len()` tokens or fails.
pub fn decode_stream(tokens: &[u32]) -> Result<Kernel> {
    let mut t = Tokens::new(tokens);

    let lang = t.next()?;
    let version = t.next()?;

    let stage_bits = get_bits(version, 16, 23);
    let stage = match ShaderStage::from_u32(stage_bits) {
        Some(stage) => stage,
        None => bail!("unsupported shader stage {}", stage_bits),
    };

    let mut kernel = Kernel {
        client_type: get_bits(lang, 0, 7) as u8,
        minor_version: get_bits(version, 0, 7) as u8,
        major_version: get_bits(version, 8, 15) as u8,
        stage,
        multipass: get_bit(version, 24) != 0,
        realtime: get_bit(version, 25) != 0,
        instrs: Vec::new(),
    };

    while !t.is_empty() {
        let instr = decode_instruction(&mut t)?;
        kernel.instrs.push(instr);
    }

    Ok(kernel)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::il::{compsel, modcomp, reg};

    const VS_HEADER: [u32; 2] = [0x00000000, 0x00010100];

    fn vs_stream(body: &[u32]) -> Vec<u32> {
        let mut tokens = VS_HEADER.to_vec();
        tokens.extend_from_slice(body);
        tokens
    }

    fn ctrl(op: Op, control: u32) -> u32 {
        op as u32 | (control << 16)
    }

    #[test]
    fn test_header() {
        let kernel = decode_stream(&vs_stream(&[])).unwrap();
        assert_eq!(kernel.client_type, 0);
        assert_eq!(kernel.major_version, 1);
        assert_eq!(kernel.minor_version, 0);
        assert_eq!(kernel.stage, ShaderStage::Vertex);
        assert!(!kernel.multipass);
        assert!(!kernel.realtime);
        assert!(kernel.instrs.is_empty());
    }

    #[test]
    fn test_empty_program() {
        let tokens = vs_stream(&[Op::EndMain as u32, Op::End as u32]);
        let kernel = decode_stream(&tokens).unwrap();
        assert_eq!(kernel.instrs.len(), 2);
        assert_eq!(kernel.instrs[0].op(), Some(Op::EndMain));
        assert_eq!(kernel.instrs[1].op(), Some(Op::End));
    }

    #[test]
    fn test_source_defaults() {
        // mov r0, v0 with neither operand carrying a modifier word.
        let tokens = vs_stream(&[
            ctrl(Op::Mov, 0),
            (reg::TEMP as u32) << 16,
            (reg::INPUT as u32) << 16,
        ]);
        let kernel = decode_stream(&tokens).unwrap();
        let instr = &kernel.instrs[0];
        assert_eq!(instr.op(), Some(Op::Mov));

        let src = &instr.srcs[0];
        assert_eq!(src.swizzle, [compsel::X, compsel::Y, compsel::Z, compsel::W]);
        assert_eq!(src.negate, [false; 4]);
        assert!(!src.abs && !src.clamp && !src.invert && !src.sign);

        let dst = &instr.dsts[0];
        assert_eq!(dst.component, [modcomp::WRITE; 4]);
        assert!(!dst.clamp);
        assert_eq!(dst.shift_scale, crate::il::shift::NONE);
    }

    #[test]
    fn test_source_modifier() {
        // mov r0, v0.x_neg(w): swizzle xxxx, negate on lane w.
        let modifier = (compsel::X as u32)
            | ((compsel::X as u32) << 4)
            | ((compsel::X as u32) << 8)
            | ((compsel::X as u32) << 12)
            | (1 << 15);
        let tokens = vs_stream(&[
            ctrl(Op::Mov, 0),
            (reg::TEMP as u32) << 16,
            ((reg::INPUT as u32) << 16) | (1 << 22),
            modifier,
        ]);
        let kernel = decode_stream(&tokens).unwrap();
        let src = &kernel.instrs[0].srcs[0];
        assert_eq!(src.swizzle, [compsel::X; 4]);
        assert_eq!(src.negate, [false, false, false, true]);
    }

    #[test]
    fn test_prefix_carries_precise_mask() {
        let tokens = vs_stream(&[
            ctrl(Op::Prefix, 0b1010),
            ctrl(Op::Add, 0),
            (reg::TEMP as u32) << 16,
            (reg::TEMP as u32) << 16,
            ((reg::TEMP as u32) << 16) | 1,
        ]);
        let kernel = decode_stream(&tokens).unwrap();
        assert_eq!(kernel.instrs.len(), 1);
        let instr = &kernel.instrs[0];
        assert_eq!(instr.op(), Some(Op::Add));
        assert_eq!(instr.precise_mask, 0b1010);
        assert_eq!(instr.srcs.len(), 2);
    }

    #[test]
    fn test_indexed_resource_sampler_args() {
        // sample with the indexed-args bit: a resource format word plus two
        // extra index sources on top of the coordinate.
        let tokens = vs_stream(&[
            ctrl(Op::Sample, 1 << 12),
            0xCAFE,                     // resource format
            (reg::TEMP as u32) << 16,   // dst r0
            (reg::TEMP as u32) << 16,   // coordinate
            ((reg::TEMP as u32) << 16) | 1, // resource index
            ((reg::TEMP as u32) << 16) | 2, // sampler index
        ]);
        let kernel = decode_stream(&tokens).unwrap();
        let instr = &kernel.instrs[0];
        assert_eq!(instr.resource_format, Some(0xCAFE));
        assert_eq!(instr.srcs.len(), il::op_info(Op::Sample).src_count as usize + 2);
    }

    #[test]
    fn test_const_buffer_declarations() {
        // Without a primary modifier the declaration names the buffer with
        // one source.
        let tokens = vs_stream(&[
            ctrl(Op::DclConstBuffer, 0),
            ((reg::CONST_BUFFER as u32) << 16) | (1 << 26),
            16, // element count immediate
        ]);
        let kernel = decode_stream(&tokens).unwrap();
        assert_eq!(kernel.instrs[0].srcs.len(), 1);
        assert_eq!(kernel.instrs[0].srcs[0].immediate, 16);

        // With a primary modifier the declaration carries that many
        // immediate body tokens instead.
        let tokens = vs_stream(&[
            ctrl(Op::DclConstBuffer, 1 << 15),
            4, // primary modifier: body length
            0x11, 0x22, 0x33, 0x44,
        ]);
        let kernel = decode_stream(&tokens).unwrap();
        assert_eq!(kernel.instrs[0].srcs.len(), 0);
        assert_eq!(kernel.instrs[0].extras, vec![0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn test_thread_group_extras_from_control() {
        let tokens = vs_stream(&[ctrl(Op::DclNumThreadPerGroup, 2), 64, 1]);
        let kernel = decode_stream(&tokens).unwrap();
        assert_eq!(kernel.instrs[0].extras, vec![64, 1]);
    }

    #[test]
    fn test_register_relative_source() {
        // mov r0, cb0[x0.x+2]
        let tokens = vs_stream(&[
            ctrl(Op::Mov, 0),
            (reg::TEMP as u32) << 16,
            ((reg::CONST_BUFFER as u32) << 16)
                | (il::addr::REG_RELATIVE << 23)
                | (1 << 26),
            (reg::ITEMP as u32) << 16, // address register
            2,                         // immediate offset
        ]);
        let kernel = decode_stream(&tokens).unwrap();
        let src = &kernel.instrs[0].srcs[0];
        assert_eq!(src.relative_srcs.len(), 1);
        assert_eq!(src.relative_srcs[0].register_type, reg::ITEMP);
        assert!(src.has_immediate);
        assert_eq!(src.immediate, 2);
    }

    #[test]
    fn test_unknown_opcode_is_recorded() {
        let tokens = vs_stream(&[ctrl(Op::Mov, 0) + 20, 0xFFFF_FFFF]);
        // Opcode 75 has no table entry; no operands are consumed for it, so
        // the next word is decoded as a fresh (invalid) instruction.
        let kernel = decode_stream(&tokens).unwrap();
        assert_eq!(kernel.instrs.len(), 2);
        assert_eq!(kernel.instrs[0].opcode, 75);
        assert_eq!(kernel.instrs[0].op(), None);
    }

    #[test]
    fn test_truncated_stream_fails() {
        // mov promises a destination and a source but the stream ends.
        let tokens = vs_stream(&[ctrl(Op::Mov, 0), (reg::TEMP as u32) << 16]);
        assert!(decode_stream(&tokens).is_err());

        // Header alone is too short.
        assert!(decode_stream(&[0x00000000]).is_err());
    }

    #[test]
    fn test_invalid_stage_fails() {
        assert!(decode_stream(&[0, 0x00FF0000]).is_err());
    }
}
