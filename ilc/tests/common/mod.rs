//! Helpers for picking apart emitted SPIR-V word streams.
#![allow(dead_code)]

/// Instructions of a module, header skipped, as `(opcode, operands)`.
pub fn instrs(words: &[u32]) -> Vec<(u32, Vec<u32>)> {
    assert!(words.len() >= 5, "module is shorter than its header");
    assert_eq!(words[0], 0x0723_0203, "bad magic number");

    let mut out = Vec::new();
    let mut i = 5;
    while i < words.len() {
        let opcode = words[i] & 0xFFFF;
        let word_count = (words[i] >> 16) as usize;
        assert!(word_count > 0, "zero-length instruction at word {}", i);
        assert!(i + word_count <= words.len(), "truncated instruction");
        out.push((opcode, words[i + 1..i + word_count].to_vec()));
        i += word_count;
    }
    out
}

pub fn find_all(words: &[u32], op: spirv::Op) -> Vec<Vec<u32>> {
    instrs(words)
        .into_iter()
        .filter(|(opcode, _)| *opcode == op as u32)
        .map(|(_, operands)| operands)
        .collect()
}

pub fn count_op(words: &[u32], op: spirv::Op) -> usize {
    find_all(words, op).len()
}

/// Decode a nul-terminated string operand, returning it with the number
/// of words it spans.
pub fn read_string(operands: &[u32]) -> (String, usize) {
    let mut bytes = Vec::new();
    for (i, word) in operands.iter().enumerate() {
        for byte in word.to_le_bytes() {
            if byte == 0 {
                return (String::from_utf8(bytes).unwrap(), i + 1);
            }
            bytes.push(byte);
        }
    }
    panic!("string operand is not nul-terminated");
}

/// Whether `target` carries `decoration` (with the given operand, if any).
pub fn has_decoration(
    words: &[u32],
    target: u32,
    decoration: spirv::Decoration,
    operand: Option<u32>,
) -> bool {
    find_all(words, spirv::Op::Decorate).iter().any(|d| {
        d[0] == target
            && d[1] == decoration as u32
            && operand.map_or(true, |value| d.get(2) == Some(&value))
    })
}

pub fn has_capability(words: &[u32], capability: spirv::Capability) -> bool {
    find_all(words, spirv::Op::Capability)
        .iter()
        .any(|c| c[0] == capability as u32)
}

pub fn has_exec_mode(words: &[u32], mode: spirv::ExecutionMode, args: &[u32]) -> bool {
    find_all(words, spirv::Op::ExecutionMode)
        .iter()
        .any(|m| m[1] == mode as u32 && m[2..] == *args)
}

pub fn to_bytes(tokens: &[u32]) -> Vec<u8> {
    tokens.iter().flat_map(|t| t.to_le_bytes()).collect()
}
