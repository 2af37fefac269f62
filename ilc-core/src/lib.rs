//! Core data model of IL-C: the source-IL vocabulary, the decoded kernel
//! representation and the binary decoder.
//!
//! A compiled IL shader is a stream of little-endian 32-bit tokens. Two
//! header tokens identify the producing language and the shader stage;
//! everything after them is instructions. [`decode::decode_stream`] turns
//! such a stream into a [`kernel::Kernel`] that the disassembler and the
//! SPIR-V compiler consume.

pub mod bits;
pub mod decode;
pub mod il;
pub mod kernel;

/// Error infrastructure.
pub mod error {
    pub use anyhow::{anyhow, bail, Error, Result};
}
