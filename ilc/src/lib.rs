//! # IL-C: AMD IL to SPIR-V shader translation.
//!
//! IL-C consumes compiled shader binaries in AMD's intermediate language
//! and emits equivalent SPIR-V modules, together with the side-band
//! metadata a Vulkan-style runtime needs to build pipeline layouts:
//! descriptor bindings, input/output locations and push-constant stride
//! slots.
//!
//! ## How-to
//!
//! ```ignore
//! // `il` holds the raw bytes of a compiled IL shader.
//! let shader = ilc::compile_shader(&il)?;
//! // `shader.code` is the SPIR-V word stream; `shader.bindings`,
//! // `shader.inputs` and `shader.outputs` describe its interface.
//! device.create_shader_module(&shader.code);
//! ```
//!
//! Besides the main translation path the crate provides a passthrough
//! recompiler that extends a finished module's interface
//! ([`recompile_shader`]), a geometry-shader synthesizer for rectangle
//! primitives ([`compile_rectangle_geometry_shader`]) and an in-place
//! descriptor-binding patcher ([`patch_shader_bindings`]).
//!
//! Compilation is single threaded and self-contained; run concurrent
//! compilations on separate threads if throughput matters. Setting
//! `GRVK_DUMP_SHADERS=1` in the environment makes every compilation write
//! its input binary, its listing and its SPIR-V next to the working
//! directory, named after the shader's stable SHA-1 name.

mod compile;
mod naming;
mod passthrough;
mod patch;
mod rect;

use std::io::Write;

use log::debug;

pub use ilc_core::il::InterpMode;
use ilc_core::decode::{decode_stream, tokens_from_bytes};
use ilc_core::error::Result;

pub use naming::shader_name;
pub use patch::patch_shader_bindings;

/// Binding id of the atomic counter buffer.
pub const ATOMIC_COUNTER_ID: u32 = 0;
/// First binding id of the sampler range (1..=16).
pub const BASE_SAMPLER_ID: u32 = 1;
/// First binding id of textures, buffers and images (17+).
pub const BASE_RESOURCE_ID: u32 = 17;

/// Capacity of the push-constant block holding dynamic buffer strides.
pub const MAX_STRIDE_CONSTANTS: u32 = 8;

/// Descriptor type of a reported binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    SampledImage,
    StorageImage,
    UniformTexelBuffer,
    StorageTexelBuffer,
    StorageBuffer,
    Sampler,
}

/// One resource binding of a compiled shader. `index` is the binding
/// number decorated in the emitted SPIR-V.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub index: u32,
    pub descriptor_kind: DescriptorKind,
    /// Slot of this binding's dynamic stride in the push-constant block,
    /// when the binding is a structured buffer.
    pub stride_index: Option<u32>,
}

/// One interpolated input of a compiled shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderInput {
    pub location: u32,
    pub interp_mode: InterpMode,
}

/// A compiled shader: the SPIR-V words plus the interface metadata the
/// surrounding runtime consumes.
#[derive(Clone, Debug)]
pub struct Shader {
    pub code: Vec<u32>,
    pub bindings: Vec<Binding>,
    pub inputs: Vec<ShaderInput>,
    /// Locations of the generic outputs, in declaration order.
    pub outputs: Vec<u32>,
    /// Stable `<stage>_<sha1>` name derived from the input bytes.
    pub name: String,
}

/// Result of a passthrough recompilation.
#[derive(Clone, Debug)]
pub struct RecompiledShader {
    pub code: Vec<u32>,
}

/// One rewrite request for [`patch_shader_bindings`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingPatchEntry {
    pub id: u32,
    pub descriptor_set_index: u32,
    pub binding_index: u32,
}

/// Compile a raw IL shader binary to SPIR-V. `code.len()` must be a
/// multiple of four; the bytes are read as little-endian tokens.
pub fn compile_shader(code: &[u8]) -> Result<Shader> {
    let name = naming::shader_name(code)?;
    debug!("compiling {}...", name);

    let tokens = tokens_from_bytes(code)?;
    let kernel = decode_stream(&tokens)?;

    let dump = naming::is_shader_dump_enabled();
    if dump {
        naming::dump_buffer(code, &name, "il");
        naming::dump_kernel(&kernel, &name);
    }

    let shader = compile::compile_kernel(&kernel, &name);

    if dump {
        naming::dump_buffer(bytemuck::cast_slice(&shader.code), &name, "spv");
    }
    Ok(shader)
}

/// Write the textual listing of a raw IL shader binary. Unknown opcodes
/// are listed as `<opcode>?`; only I/O and malformed streams fail.
pub fn disassemble_shader(code: &[u8], w: &mut dyn Write) -> Result<()> {
    let tokens = tokens_from_bytes(code)?;
    let kernel = decode_stream(&tokens)?;
    ilc_dis::Disassembler::new().disassemble(&kernel, w)
}

/// Rewrite a finished SPIR-V module, adding input/output passthroughs for
/// every requested location that the module does not already consume.
pub fn recompile_shader(
    code: &[u8],
    input_passthrough_locations: &[u32],
) -> Result<RecompiledShader> {
    let words = tokens_from_bytes(code)?;
    passthrough::recompile_module(&words, input_passthrough_locations)
}

/// Synthesize a geometry shader that expands a rectangle's triangle into
/// the full 4-vertex strip, forwarding the given pixel-shader inputs.
pub fn compile_rectangle_geometry_shader(passthrough_inputs: &[ShaderInput]) -> Shader {
    rect::compile_rectangle_geometry_shader(passthrough_inputs)
}
