//! Kernel to SPIR-V lowering.
//!
//! The compiler walks the instruction vector once, emitting through the
//! builder and gathering binding/input/output metadata on the side. All
//! register traffic happens on 4-component float vectors; integer opcodes
//! view their operands through bitcasts and cast back before the store.
//! Unknown or unimplemented instructions log a warning and emit nothing,
//! so a partially understood kernel still yields a module.

use fnv::FnvHashMap as HashMap;
use log::warn;
use spirv::Op as SpvOp;

use ilc_core::bits::{get_bit, get_bits};
use ilc_core::il::{self, ElementFormat, ImportUsage, InterpMode, Op, PixTexUsage, ShaderStage};
use ilc_core::kernel::{Destination, Instruction, Kernel, Source};
use ilc_spv::{SpvId, SpvModule};

use crate::{
    Binding, DescriptorKind, Shader, ShaderInput, ATOMIC_COUNTER_ID, BASE_RESOURCE_ID,
    BASE_SAMPLER_ID, MAX_STRIDE_CONSTANTS,
};

const F32_ZERO: u32 = 0x0000_0000;
const F32_HALF: u32 = 0x3F00_0000;
const F32_ONE: u32 = 0x3F80_0000;
const F32_TWO: u32 = 0x4000_0000;
const F32_FOUR: u32 = 0x4080_0000;
const F32_EIGHT: u32 = 0x4100_0000;
const F32_QUARTER: u32 = 0x3E80_0000;
const F32_EIGHTH: u32 = 0x3E00_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScalarKind {
    Float,
    Int,
    Uint,
}

#[derive(Clone, Copy, Debug)]
struct ResourceInfo {
    var_id: SpvId,
    image_type_id: SpvId,
    sampled: ScalarKind,
    dim: spirv::Dim,
}

#[derive(Clone, Copy, Debug)]
struct BufferInfo {
    var_id: SpvId,
    stride_index: Option<u32>,
}

#[derive(Clone, Copy, Debug)]
enum CtrlBlock {
    If {
        merge_id: SpvId,
        else_id: SpvId,
        had_else: bool,
    },
    Loop {
        header_id: SpvId,
        continue_id: SpvId,
        merge_id: SpvId,
    },
}

struct Compiler<'a> {
    module: SpvModule,
    kernel: &'a Kernel,
    entry_point_id: SpvId,
    block_open: bool,
    function_ended: bool,
    local_size_emitted: bool,
    word_array_decorated: bool,
    counter_struct_decorated: bool,
    temps: HashMap<u32, SpvId>,
    temp_arrays: HashMap<u32, SpvId>,
    literals: HashMap<u32, SpvId>,
    inputs: HashMap<u32, SpvId>,
    outputs: HashMap<u32, SpvId>,
    const_buffers: HashMap<u32, ResourceInfo>,
    resources: HashMap<u32, ResourceInfo>,
    samplers: HashMap<u32, SpvId>,
    image_uavs: HashMap<u32, ResourceInfo>,
    buffer_uavs: HashMap<u32, BufferInfo>,
    buffer_srvs: HashMap<u32, BufferInfo>,
    lds_vars: HashMap<u32, SpvId>,
    atomic_counter_var_id: Option<SpvId>,
    push_constants_var_id: Option<SpvId>,
    stride_count: u32,
    ctrl_stack: Vec<CtrlBlock>,
    bindings: Vec<Binding>,
    input_meta: Vec<ShaderInput>,
    output_meta: Vec<u32>,
    interfaces: Vec<SpvId>,
}

impl<'a> Compiler<'a> {
    fn new(kernel: &'a Kernel) -> Self {
        let mut module = SpvModule::new();
        match kernel.stage {
            ShaderStage::Geometry => module.put_capability(spirv::Capability::Geometry),
            ShaderStage::Hull | ShaderStage::Domain => {
                module.put_capability(spirv::Capability::Tessellation)
            }
            _ => {}
        }
        let entry_point_id = module.alloc_id();

        Compiler {
            module,
            kernel,
            entry_point_id,
            block_open: false,
            function_ended: false,
            local_size_emitted: false,
            word_array_decorated: false,
            counter_struct_decorated: false,
            temps: Default::default(),
            temp_arrays: Default::default(),
            literals: Default::default(),
            inputs: Default::default(),
            outputs: Default::default(),
            const_buffers: Default::default(),
            resources: Default::default(),
            samplers: Default::default(),
            image_uavs: Default::default(),
            buffer_uavs: Default::default(),
            buffer_srvs: Default::default(),
            lds_vars: Default::default(),
            atomic_counter_var_id: None,
            push_constants_var_id: None,
            stride_count: 0,
            ctrl_stack: Vec::new(),
            bindings: Vec::new(),
            input_meta: Vec::new(),
            output_meta: Vec::new(),
            interfaces: Vec::new(),
        }
    }

    // Type and constant shortcuts. The builder de-duplicates, so these are
    // cheap to call anywhere.

    fn float_id(&mut self) -> SpvId {
        self.module.put_float_type()
    }

    fn vec4f_id(&mut self) -> SpvId {
        let float_id = self.float_id();
        self.module.put_vector_type(float_id, 4)
    }

    fn int_id(&mut self) -> SpvId {
        self.module.put_int_type(true)
    }

    fn uint_id(&mut self) -> SpvId {
        self.module.put_int_type(false)
    }

    fn ivec4_id(&mut self) -> SpvId {
        let int_id = self.int_id();
        self.module.put_vector_type(int_id, 4)
    }

    fn uvec4_id(&mut self) -> SpvId {
        let uint_id = self.uint_id();
        self.module.put_vector_type(uint_id, 4)
    }

    fn bool_id(&mut self) -> SpvId {
        self.module.put_bool_type()
    }

    fn bvec4_id(&mut self) -> SpvId {
        let bool_id = self.bool_id();
        self.module.put_vector_type(bool_id, 4)
    }

    fn scalar_type_id(&mut self, kind: ScalarKind) -> SpvId {
        match kind {
            ScalarKind::Float => self.float_id(),
            ScalarKind::Int => self.int_id(),
            ScalarKind::Uint => self.uint_id(),
        }
    }

    fn vec4_type_id(&mut self, kind: ScalarKind) -> SpvId {
        let scalar_id = self.scalar_type_id(kind);
        self.module.put_vector_type(scalar_id, 4)
    }

    fn const_f32(&mut self, pattern: u32) -> SpvId {
        let float_id = self.float_id();
        self.module.put_constant(float_id, pattern)
    }

    fn const_i32(&mut self, value: u32) -> SpvId {
        let int_id = self.int_id();
        self.module.put_constant(int_id, value)
    }

    fn const_u32(&mut self, value: u32) -> SpvId {
        let uint_id = self.uint_id();
        self.module.put_constant(uint_id, value)
    }

    fn splat_f32(&mut self, pattern: u32) -> SpvId {
        let elem_id = self.const_f32(pattern);
        let vec4f_id = self.vec4f_id();
        self.module
            .put_constant_composite(vec4f_id, &[elem_id, elem_id, elem_id, elem_id])
    }

    fn splat_u32(&mut self, value: u32) -> SpvId {
        let elem_id = self.const_u32(value);
        let uvec4_id = self.uvec4_id();
        self.module
            .put_constant_composite(uvec4_id, &[elem_id, elem_id, elem_id, elem_id])
    }

    fn ensure_block(&mut self) {
        if !self.block_open {
            self.module.put_label();
            self.block_open = true;
        }
    }

    // Register file access.

    fn temp_pointer(&mut self, register_num: u32) -> SpvId {
        if let Some(&var_id) = self.temps.get(&register_num) {
            return var_id;
        }
        let vec4f_id = self.vec4f_id();
        let ptr_id = self
            .module
            .put_pointer_type(spirv::StorageClass::Private, vec4f_id);
        let var_id = self.module.put_variable(ptr_id, spirv::StorageClass::Private);
        self.module.put_name(var_id, &format!("r{}", register_num));
        self.temps.insert(register_num, var_id);
        var_id
    }

    /// Address of an indexed operand: immediate plus the first relative
    /// address register's x component.
    fn operand_index(
        &mut self,
        relative_srcs: &[Source],
        has_immediate: bool,
        immediate: u32,
    ) -> SpvId {
        let int_id = self.int_id();
        let mut index_id = self.const_i32(if has_immediate { immediate } else { 0 });
        if let Some(relative) = relative_srcs.first() {
            let value_id = self.load_source(relative);
            let ivec4_id = self.ivec4_id();
            let as_int_id = self.module.put_bitcast(ivec4_id, value_id);
            let lane_id = self.module.put_composite_extract(int_id, as_int_id, &[0]);
            index_id = self.module.put_op2(SpvOp::IAdd, int_id, lane_id, index_id);
        }
        index_id
    }

    fn temp_array_pointer(&mut self, src_index: SpvId, register_num: u32) -> Option<SpvId> {
        let &var_id = self.temp_arrays.get(&register_num)?;
        let vec4f_id = self.vec4f_id();
        let elem_ptr_id = self
            .module
            .put_pointer_type(spirv::StorageClass::Private, vec4f_id);
        Some(self.module.put_access_chain(elem_ptr_id, var_id, &[src_index]))
    }

    fn apply_swizzle(&mut self, value_id: SpvId, swizzle: &[u8; 4]) -> SpvId {
        let vec4f_id = self.vec4f_id();
        let has_constant_lane = swizzle
            .iter()
            .any(|&s| s == il::compsel::ZERO || s == il::compsel::ONE);

        if !has_constant_lane {
            let lanes = [
                swizzle[0] as u32,
                swizzle[1] as u32,
                swizzle[2] as u32,
                swizzle[3] as u32,
            ];
            return self
                .module
                .put_vector_shuffle(vec4f_id, value_id, value_id, &lanes);
        }

        let float_id = self.float_id();
        let mut lanes = [0 as SpvId; 4];
        for (i, &sel) in swizzle.iter().enumerate() {
            lanes[i] = match sel {
                il::compsel::ZERO => self.const_f32(F32_ZERO),
                il::compsel::ONE => self.const_f32(F32_ONE),
                sel if sel <= il::compsel::W => {
                    self.module
                        .put_composite_extract(float_id, value_id, &[sel as u32])
                }
                _ => {
                    warn!("invalid component select {}", sel);
                    self.const_f32(F32_ZERO)
                }
            };
        }
        self.module.put_composite_construct(vec4f_id, &lanes)
    }

    fn apply_negate(&mut self, value_id: SpvId, negate: &[bool; 4]) -> SpvId {
        let vec4f_id = self.vec4f_id();
        if negate.iter().all(|&n| n) {
            return self.module.put_op1(SpvOp::FNegate, vec4f_id, value_id);
        }
        let float_id = self.float_id();
        let mut lanes = [0 as SpvId; 4];
        for (i, &negate_lane) in negate.iter().enumerate() {
            let lane_id = self
                .module
                .put_composite_extract(float_id, value_id, &[i as u32]);
            lanes[i] = if negate_lane {
                self.module.put_op1(SpvOp::FNegate, float_id, lane_id)
            } else {
                lane_id
            };
        }
        self.module.put_composite_construct(vec4f_id, &lanes)
    }

    fn load_const_buffer(&mut self, src: &Source) -> SpvId {
        let info = match self.const_buffers.get(&src.register_num) {
            Some(&info) => info,
            None => {
                warn!("undeclared constant buffer cb{}", src.register_num);
                return self.splat_f32(F32_ZERO);
            }
        };
        let index_id = self.operand_index(&src.relative_srcs, src.has_immediate, src.immediate);
        let image_id = self.module.put_load(info.image_type_id, info.var_id);
        let vec4f_id = self.vec4f_id();
        self.module
            .put_op2(SpvOp::ImageFetch, vec4f_id, image_id, index_id)
    }

    /// Load a source as a 4-component float vector, applying the swizzle
    /// and modifier pipeline.
    fn load_source(&mut self, src: &Source) -> SpvId {
        let vec4f_id = self.vec4f_id();
        let register_num = src.register_num;

        let mut value_id = match src.register_type {
            il::reg::TEMP => {
                let var_id = self.temp_pointer(register_num);
                self.module.put_load(vec4f_id, var_id)
            }
            il::reg::INPUT => match self.inputs.get(&register_num) {
                Some(&var_id) => self.module.put_load(vec4f_id, var_id),
                None => {
                    warn!("undeclared input v{}", register_num);
                    self.splat_f32(F32_ZERO)
                }
            },
            il::reg::LITERAL => match self.literals.get(&register_num) {
                Some(&const_id) => const_id,
                None => {
                    warn!("undeclared literal l{}", register_num);
                    self.splat_f32(F32_ZERO)
                }
            },
            il::reg::ITEMP => {
                let index_id =
                    self.operand_index(&src.relative_srcs, src.has_immediate, src.immediate);
                match self.temp_array_pointer(index_id, register_num) {
                    Some(ptr_id) => self.module.put_load(vec4f_id, ptr_id),
                    None => {
                        warn!("undeclared indexed temp array x{}", register_num);
                        self.splat_f32(F32_ZERO)
                    }
                }
            }
            il::reg::CONST_BUFFER => self.load_const_buffer(src),
            _ => {
                warn!("unhandled source register type {}", src.register_type);
                self.splat_f32(F32_ZERO)
            }
        };

        if !src.has_identity_swizzle() {
            value_id = self.apply_swizzle(value_id, &src.swizzle);
        }
        if src.negate.iter().any(|&n| n) {
            value_id = self.apply_negate(value_id, &src.negate);
        }
        if src.invert {
            let one_id = self.splat_f32(F32_ONE);
            value_id = self.module.put_op2(SpvOp::FSub, vec4f_id, one_id, value_id);
        }
        if src.bias {
            let half_id = self.splat_f32(F32_HALF);
            value_id = self.module.put_op2(SpvOp::FSub, vec4f_id, value_id, half_id);
        }
        if src.x2 {
            value_id = self.module.put_op2(SpvOp::FAdd, vec4f_id, value_id, value_id);
        }
        if src.sign {
            value_id = self.module.put_glsl_op(spirv::GLOp::FSign, vec4f_id, &[value_id]);
        }
        if src.abs {
            value_id = self.module.put_glsl_op(spirv::GLOp::FAbs, vec4f_id, &[value_id]);
        }
        match src.div_comp {
            il::divcomp::NONE => {}
            il::divcomp::Y | il::divcomp::Z | il::divcomp::W => {
                let float_id = self.float_id();
                let lane_id = self.module.put_composite_extract(
                    float_id,
                    value_id,
                    &[src.div_comp as u32],
                );
                let divisor_id = self
                    .module
                    .put_composite_construct(vec4f_id, &[lane_id, lane_id, lane_id, lane_id]);
                value_id = self.module.put_op2(SpvOp::FDiv, vec4f_id, value_id, divisor_id);
            }
            _ => warn!("unhandled divide component {}", src.div_comp),
        }
        if src.clamp {
            let zero_id = self.splat_f32(F32_ZERO);
            let one_id = self.splat_f32(F32_ONE);
            value_id = self.module.put_glsl_op(
                spirv::GLOp::FClamp,
                vec4f_id,
                &[value_id, zero_id, one_id],
            );
        }
        value_id
    }

    fn load_source_uint(&mut self, src: &Source) -> SpvId {
        let value_id = self.load_source(src);
        let uvec4_id = self.uvec4_id();
        self.module.put_bitcast(uvec4_id, value_id)
    }

    fn load_source_int(&mut self, src: &Source) -> SpvId {
        let value_id = self.load_source(src);
        let ivec4_id = self.ivec4_id();
        self.module.put_bitcast(ivec4_id, value_id)
    }

    /// The x component of a source, as an unsigned scalar.
    fn uint_scalar_x(&mut self, src: &Source) -> SpvId {
        let value_id = self.load_source_uint(src);
        let uint_id = self.uint_id();
        self.module.put_composite_extract(uint_id, value_id, &[0])
    }

    /// Store a float vector to a destination, applying shift scale,
    /// saturation and the write mask.
    fn store_destination(&mut self, dst: &Destination, mut value_id: SpvId) {
        let vec4f_id = self.vec4f_id();

        let scale_pattern = match dst.shift_scale {
            il::shift::NONE => None,
            il::shift::X2 => Some(F32_TWO),
            il::shift::X4 => Some(F32_FOUR),
            il::shift::X8 => Some(F32_EIGHT),
            il::shift::D2 => Some(F32_HALF),
            il::shift::D4 => Some(F32_QUARTER),
            il::shift::D8 => Some(F32_EIGHTH),
            _ => {
                warn!("unhandled shift scale {}", dst.shift_scale);
                None
            }
        };
        if let Some(pattern) = scale_pattern {
            let scale_id = self.splat_f32(pattern);
            value_id = self.module.put_op2(SpvOp::FMul, vec4f_id, value_id, scale_id);
        }
        if dst.clamp {
            let zero_id = self.splat_f32(F32_ZERO);
            let one_id = self.splat_f32(F32_ONE);
            value_id = self.module.put_glsl_op(
                spirv::GLOp::FClamp,
                vec4f_id,
                &[value_id, zero_id, one_id],
            );
        }

        let pointer_id = match dst.register_type {
            il::reg::TEMP => self.temp_pointer(dst.register_num),
            il::reg::OUTPUT => match self.outputs.get(&dst.register_num) {
                Some(&var_id) => var_id,
                None => {
                    warn!("undeclared output o{}", dst.register_num);
                    return;
                }
            },
            il::reg::ITEMP => {
                let index_id =
                    self.operand_index(&dst.relative_srcs, dst.has_immediate, dst.immediate);
                match self.temp_array_pointer(index_id, dst.register_num) {
                    Some(ptr_id) => ptr_id,
                    None => {
                        warn!("undeclared indexed temp array x{}", dst.register_num);
                        return;
                    }
                }
            }
            _ => {
                warn!("unhandled destination register type {}", dst.register_type);
                return;
            }
        };

        if dst.writes_all_components() {
            self.module.put_store(pointer_id, value_id);
            return;
        }

        // Merge with the previous value lane by lane.
        let old_id = self.module.put_load(vec4f_id, pointer_id);
        let float_id = self.float_id();
        let mut lanes = [0 as SpvId; 4];
        for (i, lane) in lanes.iter_mut().enumerate() {
            *lane = match dst.component[i] {
                il::modcomp::WRITE => {
                    self.module.put_composite_extract(float_id, value_id, &[i as u32])
                }
                il::modcomp::NOWRITE => {
                    self.module.put_composite_extract(float_id, old_id, &[i as u32])
                }
                il::modcomp::ZERO => self.const_f32(F32_ZERO),
                il::modcomp::ONE => self.const_f32(F32_ONE),
                mode => {
                    warn!("unhandled component mod {}", mode);
                    self.module.put_composite_extract(float_id, old_id, &[i as u32])
                }
            };
        }
        let merged_id = self.module.put_composite_construct(vec4f_id, &lanes);
        self.module.put_store(pointer_id, merged_id);
    }

    fn store_destination_bits(&mut self, dst: &Destination, value_id: SpvId) {
        let vec4f_id = self.vec4f_id();
        let as_float_id = self.module.put_bitcast(vec4f_id, value_id);
        self.store_destination(dst, as_float_id);
    }

    /// Store an all-ones/all-zeros component mask from a `bvec4`.
    fn store_compare_mask(&mut self, dst: &Destination, bvec_id: SpvId) {
        let ones_id = self.splat_u32(0xFFFF_FFFF);
        let zeros_id = self.splat_u32(0);
        let uvec4_id = self.uvec4_id();
        let mask_id = self.module.put_select(uvec4_id, bvec_id, ones_id, zeros_id);
        self.store_destination_bits(dst, mask_id);
    }

    /// Scalar condition for `*_logicalz`/`*_logicalnz`: the x component
    /// compared against zero.
    fn logical_condition(&mut self, src: &Source, non_zero: bool) -> SpvId {
        let x_id = self.uint_scalar_x(src);
        let zero_id = self.const_u32(0);
        let bool_id = self.bool_id();
        let op = if non_zero { SpvOp::INotEqual } else { SpvOp::IEqual };
        self.module.put_op2(op, bool_id, x_id, zero_id)
    }

    // Instruction groups.

    fn emit_mov(&mut self, instr: &Instruction) {
        let value_id = self.load_source(&instr.srcs[0]);
        self.store_destination(&instr.dsts[0], value_id);
    }

    fn emit_float_binary(&mut self, instr: &Instruction, op: SpvOp) {
        let a_id = self.load_source(&instr.srcs[0]);
        let b_id = self.load_source(&instr.srcs[1]);
        let vec4f_id = self.vec4f_id();
        let result_id = self.module.put_op2(op, vec4f_id, a_id, b_id);
        self.store_destination(&instr.dsts[0], result_id);
    }

    fn emit_glsl_unary(&mut self, instr: &Instruction, glsl_op: spirv::GLOp) {
        let a_id = self.load_source(&instr.srcs[0]);
        let vec4f_id = self.vec4f_id();
        let result_id = self.module.put_glsl_op(glsl_op, vec4f_id, &[a_id]);
        self.store_destination(&instr.dsts[0], result_id);
    }

    fn emit_glsl_binary(&mut self, instr: &Instruction, glsl_op: spirv::GLOp) {
        let a_id = self.load_source(&instr.srcs[0]);
        let b_id = self.load_source(&instr.srcs[1]);
        let vec4f_id = self.vec4f_id();
        let result_id = self.module.put_glsl_op(glsl_op, vec4f_id, &[a_id, b_id]);
        self.store_destination(&instr.dsts[0], result_id);
    }

    fn emit_fma(&mut self, instr: &Instruction) {
        let a_id = self.load_source(&instr.srcs[0]);
        let b_id = self.load_source(&instr.srcs[1]);
        let c_id = self.load_source(&instr.srcs[2]);
        let vec4f_id = self.vec4f_id();
        let result_id = self
            .module
            .put_glsl_op(spirv::GLOp::Fma, vec4f_id, &[a_id, b_id, c_id]);
        self.store_destination(&instr.dsts[0], result_id);
    }

    fn emit_rcp(&mut self, instr: &Instruction) {
        let a_id = self.load_source(&instr.srcs[0]);
        let one_id = self.splat_f32(F32_ONE);
        let vec4f_id = self.vec4f_id();
        let result_id = self.module.put_op2(SpvOp::FDiv, vec4f_id, one_id, a_id);
        self.store_destination(&instr.dsts[0], result_id);
    }

    fn emit_dot(&mut self, instr: &Instruction, component_count: u32) {
        let a_id = self.load_source(&instr.srcs[0]);
        let b_id = self.load_source(&instr.srcs[1]);
        let float_id = self.float_id();

        let (a_id, b_id) = if component_count == 4 {
            (a_id, b_id)
        } else {
            let vec_id = self.module.put_vector_type(float_id, component_count);
            let lanes: Vec<u32> = (0..component_count).collect();
            (
                self.module.put_vector_shuffle(vec_id, a_id, a_id, &lanes),
                self.module.put_vector_shuffle(vec_id, b_id, b_id, &lanes),
            )
        };

        let dot_id = self.module.put_op2(SpvOp::Dot, float_id, a_id, b_id);
        let vec4f_id = self.vec4f_id();
        let result_id = self
            .module
            .put_composite_construct(vec4f_id, &[dot_id, dot_id, dot_id, dot_id]);
        self.store_destination(&instr.dsts[0], result_id);
    }

    fn emit_derivative(&mut self, instr: &Instruction, fine_op: SpvOp, coarse_op: SpvOp) {
        let fine = get_bit(instr.control as u32, 7) != 0;
        if fine {
            self.module.put_capability(spirv::Capability::DerivativeControl);
        }
        let a_id = self.load_source(&instr.srcs[0]);
        let vec4f_id = self.vec4f_id();
        let result_id = self
            .module
            .put_op1(if fine { fine_op } else { coarse_op }, vec4f_id, a_id);
        self.store_destination(&instr.dsts[0], result_id);
    }

    fn emit_float_compare(&mut self, instr: &Instruction, op: SpvOp) {
        let a_id = self.load_source(&instr.srcs[0]);
        let b_id = self.load_source(&instr.srcs[1]);
        let bvec4_id = self.bvec4_id();
        let cmp_id = self.module.put_op2(op, bvec4_id, a_id, b_id);
        self.store_compare_mask(&instr.dsts[0], cmp_id);
    }

    fn emit_int_compare(&mut self, instr: &Instruction, op: SpvOp, signed: bool) {
        let (a_id, b_id) = if signed {
            (
                self.load_source_int(&instr.srcs[0]),
                self.load_source_int(&instr.srcs[1]),
            )
        } else {
            (
                self.load_source_uint(&instr.srcs[0]),
                self.load_source_uint(&instr.srcs[1]),
            )
        };
        let bvec4_id = self.bvec4_id();
        let cmp_id = self.module.put_op2(op, bvec4_id, a_id, b_id);
        self.store_compare_mask(&instr.dsts[0], cmp_id);
    }

    fn emit_int_binary(&mut self, instr: &Instruction, op: SpvOp, signed: bool) {
        let (type_id, a_id, b_id) = if signed {
            (
                self.ivec4_id(),
                self.load_source_int(&instr.srcs[0]),
                self.load_source_int(&instr.srcs[1]),
            )
        } else {
            (
                self.uvec4_id(),
                self.load_source_uint(&instr.srcs[0]),
                self.load_source_uint(&instr.srcs[1]),
            )
        };
        let result_id = self.module.put_op2(op, type_id, a_id, b_id);
        self.store_destination_bits(&instr.dsts[0], result_id);
    }

    fn emit_int_unary(&mut self, instr: &Instruction, op: SpvOp, signed: bool) {
        let (type_id, a_id) = if signed {
            (self.ivec4_id(), self.load_source_int(&instr.srcs[0]))
        } else {
            (self.uvec4_id(), self.load_source_uint(&instr.srcs[0]))
        };
        let result_id = self.module.put_op1(op, type_id, a_id);
        self.store_destination_bits(&instr.dsts[0], result_id);
    }

    fn emit_int_glsl_binary(&mut self, instr: &Instruction, glsl_op: spirv::GLOp, signed: bool) {
        let (type_id, a_id, b_id) = if signed {
            (
                self.ivec4_id(),
                self.load_source_int(&instr.srcs[0]),
                self.load_source_int(&instr.srcs[1]),
            )
        } else {
            (
                self.uvec4_id(),
                self.load_source_uint(&instr.srcs[0]),
                self.load_source_uint(&instr.srcs[1]),
            )
        };
        let result_id = self.module.put_glsl_op(glsl_op, type_id, &[a_id, b_id]);
        self.store_destination_bits(&instr.dsts[0], result_id);
    }

    fn emit_imad(&mut self, instr: &Instruction) {
        let a_id = self.load_source_int(&instr.srcs[0]);
        let b_id = self.load_source_int(&instr.srcs[1]);
        let c_id = self.load_source_int(&instr.srcs[2]);
        let ivec4_id = self.ivec4_id();
        let mul_id = self.module.put_op2(SpvOp::IMul, ivec4_id, a_id, b_id);
        let result_id = self.module.put_op2(SpvOp::IAdd, ivec4_id, mul_id, c_id);
        self.store_destination_bits(&instr.dsts[0], result_id);
    }

    fn emit_cmov_logical(&mut self, instr: &Instruction) {
        let cond_bits_id = self.load_source_uint(&instr.srcs[0]);
        let a_id = self.load_source(&instr.srcs[1]);
        let b_id = self.load_source(&instr.srcs[2]);
        let zeros_id = self.splat_u32(0);
        let bvec4_id = self.bvec4_id();
        let cond_id = self
            .module
            .put_op2(SpvOp::INotEqual, bvec4_id, cond_bits_id, zeros_id);
        let vec4f_id = self.vec4f_id();
        let result_id = self.module.put_select(vec4f_id, cond_id, a_id, b_id);
        self.store_destination(&instr.dsts[0], result_id);
    }

    fn emit_bit_extract(&mut self, instr: &Instruction, signed: bool) {
        let (scalar_id, type_id, count_vec_id, offset_vec_id, base_id) = if signed {
            (
                self.int_id(),
                self.ivec4_id(),
                self.load_source_int(&instr.srcs[0]),
                self.load_source_int(&instr.srcs[1]),
                self.load_source_int(&instr.srcs[2]),
            )
        } else {
            (
                self.uint_id(),
                self.uvec4_id(),
                self.load_source_uint(&instr.srcs[0]),
                self.load_source_uint(&instr.srcs[1]),
                self.load_source_uint(&instr.srcs[2]),
            )
        };
        let count_id = self.module.put_composite_extract(scalar_id, count_vec_id, &[0]);
        let offset_id = self.module.put_composite_extract(scalar_id, offset_vec_id, &[0]);
        let op = if signed {
            SpvOp::BitFieldSExtract
        } else {
            SpvOp::BitFieldUExtract
        };
        let result_id = self
            .module
            .put_op(op, type_id, &[base_id, offset_id, count_id]);
        self.store_destination_bits(&instr.dsts[0], result_id);
    }

    fn emit_bit_insert(&mut self, instr: &Instruction) {
        let uint_id = self.uint_id();
        let uvec4_id = self.uvec4_id();
        let count_vec_id = self.load_source_uint(&instr.srcs[0]);
        let offset_vec_id = self.load_source_uint(&instr.srcs[1]);
        let insert_id = self.load_source_uint(&instr.srcs[2]);
        let base_id = self.load_source_uint(&instr.srcs[3]);
        let count_id = self.module.put_composite_extract(uint_id, count_vec_id, &[0]);
        let offset_id = self.module.put_composite_extract(uint_id, offset_vec_id, &[0]);
        let result_id = self.module.put_op(
            SpvOp::BitFieldInsert,
            uvec4_id,
            &[base_id, insert_id, offset_id, count_id],
        );
        self.store_destination_bits(&instr.dsts[0], result_id);
    }

    fn emit_convert(&mut self, instr: &Instruction, op: SpvOp) {
        match op {
            SpvOp::ConvertFToS => {
                let a_id = self.load_source(&instr.srcs[0]);
                let ivec4_id = self.ivec4_id();
                let result_id = self.module.put_op1(op, ivec4_id, a_id);
                self.store_destination_bits(&instr.dsts[0], result_id);
            }
            SpvOp::ConvertFToU => {
                let a_id = self.load_source(&instr.srcs[0]);
                let uvec4_id = self.uvec4_id();
                let result_id = self.module.put_op1(op, uvec4_id, a_id);
                self.store_destination_bits(&instr.dsts[0], result_id);
            }
            SpvOp::ConvertSToF => {
                let a_id = self.load_source_int(&instr.srcs[0]);
                let vec4f_id = self.vec4f_id();
                let result_id = self.module.put_op1(op, vec4f_id, a_id);
                self.store_destination(&instr.dsts[0], result_id);
            }
            SpvOp::ConvertUToF => {
                let a_id = self.load_source_uint(&instr.srcs[0]);
                let vec4f_id = self.vec4f_id();
                let result_id = self.module.put_op1(op, vec4f_id, a_id);
                self.store_destination(&instr.dsts[0], result_id);
            }
            _ => unreachable!(),
        }
    }

    // Control flow.

    fn emit_if(&mut self, instr: &Instruction, non_zero: bool) {
        let cond_id = self.logical_condition(&instr.srcs[0], non_zero);
        let true_id = self.module.alloc_id();
        let else_id = self.module.alloc_id();
        let merge_id = self.module.alloc_id();
        self.module.put_selection_merge(merge_id);
        self.module.put_branch_conditional(cond_id, true_id, else_id);
        self.module.put_label_id(true_id);
        self.ctrl_stack.push(CtrlBlock::If {
            merge_id,
            else_id,
            had_else: false,
        });
    }

    fn emit_else(&mut self) {
        match self.ctrl_stack.pop() {
            Some(CtrlBlock::If {
                merge_id, else_id, ..
            }) => {
                self.module.put_branch(merge_id);
                self.module.put_label_id(else_id);
                self.ctrl_stack.push(CtrlBlock::If {
                    merge_id,
                    else_id,
                    had_else: true,
                });
            }
            other => {
                warn!("mismatched else");
                if let Some(block) = other {
                    self.ctrl_stack.push(block);
                }
            }
        }
    }

    fn emit_endif(&mut self) {
        match self.ctrl_stack.pop() {
            Some(CtrlBlock::If {
                merge_id,
                else_id,
                had_else,
            }) => {
                self.module.put_branch(merge_id);
                if !had_else {
                    self.module.put_label_id(else_id);
                    self.module.put_branch(merge_id);
                }
                self.module.put_label_id(merge_id);
            }
            other => {
                warn!("mismatched endif");
                if let Some(block) = other {
                    self.ctrl_stack.push(block);
                }
            }
        }
    }

    fn emit_while(&mut self) {
        let header_id = self.module.alloc_id();
        let merge_id = self.module.alloc_id();
        let continue_id = self.module.alloc_id();
        let body_id = self.module.alloc_id();
        self.module.put_branch(header_id);
        self.module.put_label_id(header_id);
        self.module.put_loop_merge(merge_id, continue_id);
        self.module.put_branch(body_id);
        self.module.put_label_id(body_id);
        self.ctrl_stack.push(CtrlBlock::Loop {
            header_id,
            continue_id,
            merge_id,
        });
    }

    fn emit_endloop(&mut self) {
        match self.ctrl_stack.pop() {
            Some(CtrlBlock::Loop {
                header_id,
                continue_id,
                merge_id,
            }) => {
                self.module.put_branch(continue_id);
                self.module.put_label_id(continue_id);
                self.module.put_branch(header_id);
                self.module.put_label_id(merge_id);
            }
            other => {
                warn!("mismatched endloop");
                if let Some(block) = other {
                    self.ctrl_stack.push(block);
                }
            }
        }
    }

    fn innermost_loop(&self) -> Option<(SpvId, SpvId)> {
        self.ctrl_stack.iter().rev().find_map(|block| match block {
            CtrlBlock::Loop {
                continue_id,
                merge_id,
                ..
            } => Some((*continue_id, *merge_id)),
            _ => None,
        })
    }

    /// Unconditional jump out of the current block, e.g. `break`. The
    /// following instructions land in a fresh block.
    fn emit_jump(&mut self, target_id: SpvId) {
        self.module.put_branch(target_id);
        self.module.put_label();
    }

    /// Conditional jump to `target_id` wrapped in its own selection
    /// construct, e.g. `break_logicalz`.
    fn emit_conditional_jump(&mut self, cond_id: SpvId, target_id: SpvId) {
        let jump_id = self.module.alloc_id();
        let merge_id = self.module.alloc_id();
        self.module.put_selection_merge(merge_id);
        self.module.put_branch_conditional(cond_id, jump_id, merge_id);
        self.module.put_label_id(jump_id);
        self.module.put_branch(target_id);
        self.module.put_label_id(merge_id);
    }

    fn emit_break(&mut self, instr: &Instruction, condition: Option<bool>) {
        let (_, merge_id) = match self.innermost_loop() {
            Some(ids) => ids,
            None => {
                warn!("break outside of a loop");
                return;
            }
        };
        match condition {
            None => self.emit_jump(merge_id),
            Some(non_zero) => {
                let cond_id = self.logical_condition(&instr.srcs[0], non_zero);
                self.emit_conditional_jump(cond_id, merge_id);
            }
        }
    }

    fn emit_breakc(&mut self, instr: &Instruction) {
        let (_, merge_id) = match self.innermost_loop() {
            Some(ids) => ids,
            None => {
                warn!("breakc outside of a loop");
                return;
            }
        };
        // The relational operator encoding is not handled; compare the x
        // components for inequality as a best effort.
        warn!("unhandled breakc relational operator");
        let float_id = self.float_id();
        let a_vec_id = self.load_source(&instr.srcs[0]);
        let b_vec_id = self.load_source(&instr.srcs[1]);
        let a_id = self.module.put_composite_extract(float_id, a_vec_id, &[0]);
        let b_id = self.module.put_composite_extract(float_id, b_vec_id, &[0]);
        let bool_id = self.bool_id();
        let cond_id = self
            .module
            .put_op2(SpvOp::FUnordNotEqual, bool_id, a_id, b_id);
        self.emit_conditional_jump(cond_id, merge_id);
    }

    fn emit_continue(&mut self, instr: &Instruction, condition: Option<bool>) {
        let (continue_id, _) = match self.innermost_loop() {
            Some(ids) => ids,
            None => {
                warn!("continue outside of a loop");
                return;
            }
        };
        match condition {
            None => self.emit_jump(continue_id),
            Some(non_zero) => {
                let cond_id = self.logical_condition(&instr.srcs[0], non_zero);
                self.emit_conditional_jump(cond_id, continue_id);
            }
        }
    }

    fn emit_discard(&mut self, instr: &Instruction, non_zero: bool) {
        let cond_id = self.logical_condition(&instr.srcs[0], non_zero);
        let kill_id = self.module.alloc_id();
        let merge_id = self.module.alloc_id();
        self.module.put_selection_merge(merge_id);
        self.module.put_branch_conditional(cond_id, kill_id, merge_id);
        self.module.put_label_id(kill_id);
        self.module.put_kill();
        self.module.put_label_id(merge_id);
    }

    // Declarations.

    fn emit_global_flags(&mut self, instr: &Instruction) {
        let control = instr.control as u32;
        if get_bit(control, il::global_flag::REFACTORING_ALLOWED) == 0 {
            warn!("unhandled !refactoringAllowed flag");
        }
        if get_bit(control, il::global_flag::FORCE_EARLY_DEPTH_STENCIL) != 0 {
            warn!("unhandled forceEarlyDepthStencil flag");
        }
        if get_bit(control, il::global_flag::ENABLE_RAW_STRUCTURED_BUFFERS) != 0 {
            warn!("unhandled enableRawStructuredBuffers flag");
        }
        if get_bit(control, il::global_flag::ENABLE_DOUBLE_PRECISION_FLOAT_OPS) != 0 {
            warn!("unhandled enableDoublePrecisionFloatOps flag");
        }
    }

    fn emit_input(&mut self, instr: &Instruction) {
        let usage = ImportUsage::from_u32(get_bits(instr.control as u32, 0, 4));
        let interp = InterpMode::from_u32(get_bits(instr.control as u32, 5, 7))
            .unwrap_or(InterpMode::NotUsed);

        let dst = &instr.dsts[0];
        let register_num = dst.register_num;
        if dst.register_type != il::reg::INPUT {
            warn!("input declaration names register type {}", dst.register_type);
        }
        if !dst.writes_all_components() {
            warn!(
                "unhandled component mod {} {} {} {}",
                dst.component[0], dst.component[1], dst.component[2], dst.component[3]
            );
        }

        let vec4f_id = self.vec4f_id();
        let pointer_id = self
            .module
            .put_pointer_type(spirv::StorageClass::Input, vec4f_id);
        let input_id = self.module.put_variable(pointer_id, spirv::StorageClass::Input);
        self.module.put_name(input_id, &format!("v{}", register_num));

        match usage {
            Some(ImportUsage::Position) if self.kernel.stage == ShaderStage::Pixel => {
                self.module.put_decoration(
                    input_id,
                    spirv::Decoration::BuiltIn,
                    &[spirv::BuiltIn::FragCoord as u32],
                );
            }
            Some(ImportUsage::Generic) => {
                self.module
                    .put_decoration(input_id, spirv::Decoration::Location, &[register_num]);
                self.input_meta.push(ShaderInput {
                    location: register_num,
                    interp_mode: interp,
                });
            }
            usage => {
                warn!("unhandled import usage {:?}", usage);
                self.module
                    .put_decoration(input_id, spirv::Decoration::Location, &[register_num]);
                self.input_meta.push(ShaderInput {
                    location: register_num,
                    interp_mode: interp,
                });
            }
        }

        // Interpolation qualifiers only make sense on fragment inputs.
        if self.kernel.stage == ShaderStage::Pixel {
            if interp == InterpMode::Constant {
                self.module.put_decoration(input_id, spirv::Decoration::Flat, &[]);
            }
            if interp == InterpMode::LinearCentroid
                || interp == InterpMode::LinearNoPerspectiveCentroid
            {
                self.module
                    .put_decoration(input_id, spirv::Decoration::Centroid, &[]);
            }
            if interp == InterpMode::LinearNoPerspective
                || interp == InterpMode::LinearNoPerspectiveCentroid
                || interp == InterpMode::LinearNoPerspectiveSample
            {
                self.module
                    .put_decoration(input_id, spirv::Decoration::NoPerspective, &[]);
            }
            if interp == InterpMode::LinearSample || interp == InterpMode::LinearNoPerspectiveSample
            {
                self.module.put_capability(spirv::Capability::SampleRateShading);
                self.module
                    .put_decoration(input_id, spirv::Decoration::Sample, &[]);
            }
        }

        self.inputs.insert(register_num, input_id);
        self.interfaces.push(input_id);
    }

    fn emit_output(&mut self, instr: &Instruction) {
        let usage = ImportUsage::from_u32(get_bits(instr.control as u32, 0, 4));
        let dst = &instr.dsts[0];
        let register_num = dst.register_num;

        let vec4f_id = self.vec4f_id();
        let pointer_id = self
            .module
            .put_pointer_type(spirv::StorageClass::Output, vec4f_id);
        let output_id = self.module.put_variable(pointer_id, spirv::StorageClass::Output);
        self.module.put_name(output_id, &format!("o{}", register_num));

        match usage {
            Some(ImportUsage::Position) => {
                self.module.put_decoration(
                    output_id,
                    spirv::Decoration::BuiltIn,
                    &[spirv::BuiltIn::Position as u32],
                );
            }
            Some(ImportUsage::PointSize) => {
                self.module.put_decoration(
                    output_id,
                    spirv::Decoration::BuiltIn,
                    &[spirv::BuiltIn::PointSize as u32],
                );
            }
            Some(ImportUsage::Generic) => {
                self.module
                    .put_decoration(output_id, spirv::Decoration::Location, &[register_num]);
                self.output_meta.push(register_num);
            }
            usage => {
                warn!("unhandled export usage {:?}", usage);
                self.module
                    .put_decoration(output_id, spirv::Decoration::Location, &[register_num]);
                self.output_meta.push(register_num);
            }
        }

        self.outputs.insert(register_num, output_id);
        self.interfaces.push(output_id);
    }

    fn emit_literal(&mut self, instr: &Instruction) {
        let register_num = instr.srcs[0].register_num;
        let mut lanes = [0 as SpvId; 4];
        for (i, lane) in lanes.iter_mut().enumerate() {
            *lane = self.const_f32(instr.extras.get(i).copied().unwrap_or(0));
        }
        let vec4f_id = self.vec4f_id();
        let const_id = self.module.put_constant_composite(vec4f_id, &lanes);
        self.literals.insert(register_num, const_id);
    }

    fn emit_indexed_temp_array(&mut self, instr: &Instruction) {
        let src = &instr.srcs[0];
        let register_num = src.register_num;
        let length = if src.has_immediate && src.immediate > 0 {
            src.immediate
        } else {
            warn!("indexed temp array x{} has no bound, assuming 4096", register_num);
            4096
        };

        let vec4f_id = self.vec4f_id();
        let length_id = self.const_i32(length);
        let array_id = self.module.put_array_type(vec4f_id, length_id);
        let pointer_id = self
            .module
            .put_pointer_type(spirv::StorageClass::Private, array_id);
        let var_id = self.module.put_variable(pointer_id, spirv::StorageClass::Private);
        self.module.put_name(var_id, &format!("x{}", register_num));
        self.temp_arrays.insert(register_num, var_id);
    }

    fn emit_const_buffer(&mut self, instr: &Instruction) {
        if instr.pri_modifier.is_some() {
            warn!("unhandled immediate constant buffer");
            return;
        }
        let src = &instr.srcs[0];
        let register_num = src.register_num;

        self.module.put_capability(spirv::Capability::SampledBuffer);
        let float_id = self.float_id();
        let image_type_id = self.module.put_image_type(
            float_id,
            spirv::Dim::DimBuffer,
            0,
            0,
            0,
            1,
            spirv::ImageFormat::Unknown,
        );
        let pointer_id = self
            .module
            .put_pointer_type(spirv::StorageClass::UniformConstant, image_type_id);
        let var_id = self
            .module
            .put_variable(pointer_id, spirv::StorageClass::UniformConstant);
        self.module.put_name(var_id, &format!("cb{}", register_num));

        let binding_index = BASE_RESOURCE_ID + register_num;
        self.module
            .put_decoration(var_id, spirv::Decoration::DescriptorSet, &[0]);
        self.module
            .put_decoration(var_id, spirv::Decoration::Binding, &[binding_index]);
        self.bindings.push(Binding {
            index: binding_index,
            descriptor_kind: DescriptorKind::UniformTexelBuffer,
            stride_index: None,
        });

        self.const_buffers.insert(
            register_num,
            ResourceInfo {
                var_id,
                image_type_id,
                sampled: ScalarKind::Float,
                dim: spirv::Dim::DimBuffer,
            },
        );
    }

    fn texture_dim(&mut self, usage: Option<PixTexUsage>) -> (spirv::Dim, u32, u32) {
        // (dim, arrayed, multisampled)
        match usage {
            Some(PixTexUsage::OneD) => (spirv::Dim::Dim1D, 0, 0),
            Some(PixTexUsage::TwoD) => (spirv::Dim::Dim2D, 0, 0),
            Some(PixTexUsage::ThreeD) => (spirv::Dim::Dim3D, 0, 0),
            Some(PixTexUsage::CubeMap) => (spirv::Dim::DimCube, 0, 0),
            Some(PixTexUsage::TwoDMsaa) => (spirv::Dim::Dim2D, 0, 1),
            Some(PixTexUsage::Buffer) => (spirv::Dim::DimBuffer, 0, 0),
            Some(PixTexUsage::OneDArray) => (spirv::Dim::Dim1D, 1, 0),
            Some(PixTexUsage::TwoDArray) => (spirv::Dim::Dim2D, 1, 0),
            Some(PixTexUsage::TwoDArrayMsaa) => (spirv::Dim::Dim2D, 1, 1),
            Some(PixTexUsage::CubeMapArray) => (spirv::Dim::DimCube, 1, 0),
            usage => {
                warn!("unhandled texture usage {:?}", usage);
                (spirv::Dim::Dim2D, 0, 0)
            }
        }
    }

    fn sampled_kind(&self, format: Option<ElementFormat>) -> ScalarKind {
        match format {
            Some(ElementFormat::Sint) => ScalarKind::Int,
            Some(ElementFormat::Uint) => ScalarKind::Uint,
            _ => ScalarKind::Float,
        }
    }

    fn emit_resource(&mut self, instr: &Instruction) {
        let control = instr.control as u32;
        let id = get_bits(control, 0, 7);
        let usage = PixTexUsage::from_u32(get_bits(control, 8, 11));
        let fmts = instr.extras.first().copied().unwrap_or(0);
        let fmtx = ElementFormat::from_u32(get_bits(fmts, 20, 22));

        let (dim, arrayed, ms) = self.texture_dim(usage);
        match dim {
            spirv::Dim::Dim1D => self.module.put_capability(spirv::Capability::Sampled1D),
            spirv::Dim::DimBuffer => self.module.put_capability(spirv::Capability::SampledBuffer),
            spirv::Dim::DimCube if arrayed != 0 => {
                self.module.put_capability(spirv::Capability::SampledCubeArray)
            }
            _ => {}
        }

        let sampled = self.sampled_kind(fmtx);
        let scalar_id = self.scalar_type_id(sampled);
        let image_type_id = self.module.put_image_type(
            scalar_id,
            dim,
            0,
            arrayed,
            ms,
            1,
            spirv::ImageFormat::Unknown,
        );
        let pointer_id = self
            .module
            .put_pointer_type(spirv::StorageClass::UniformConstant, image_type_id);
        let var_id = self
            .module
            .put_variable(pointer_id, spirv::StorageClass::UniformConstant);
        self.module.put_name(var_id, &format!("resource{}", id));

        let binding_index = BASE_RESOURCE_ID + id;
        self.module
            .put_decoration(var_id, spirv::Decoration::DescriptorSet, &[0]);
        self.module
            .put_decoration(var_id, spirv::Decoration::Binding, &[binding_index]);
        self.bindings.push(Binding {
            index: binding_index,
            descriptor_kind: if dim == spirv::Dim::DimBuffer {
                DescriptorKind::UniformTexelBuffer
            } else {
                DescriptorKind::SampledImage
            },
            stride_index: None,
        });

        self.resources.insert(
            id,
            ResourceInfo {
                var_id,
                image_type_id,
                sampled,
                dim,
            },
        );
    }

    fn sampler_variable(&mut self, sampler_id: u32) -> SpvId {
        if let Some(&var_id) = self.samplers.get(&sampler_id) {
            return var_id;
        }
        let sampler_type_id = self.module.put_sampler_type();
        let pointer_id = self
            .module
            .put_pointer_type(spirv::StorageClass::UniformConstant, sampler_type_id);
        let var_id = self
            .module
            .put_variable(pointer_id, spirv::StorageClass::UniformConstant);
        self.module.put_name(var_id, &format!("sampler{}", sampler_id));

        let binding_index = BASE_SAMPLER_ID + sampler_id;
        self.module
            .put_decoration(var_id, spirv::Decoration::DescriptorSet, &[0]);
        self.module
            .put_decoration(var_id, spirv::Decoration::Binding, &[binding_index]);
        self.bindings.push(Binding {
            index: binding_index,
            descriptor_kind: DescriptorKind::Sampler,
            stride_index: None,
        });

        self.samplers.insert(sampler_id, var_id);
        var_id
    }

    fn emit_sample(&mut self, instr: &Instruction, op: Op) {
        let control = instr.control as u32;
        let resource_id = get_bits(control, 0, 7);
        let sampler_id = get_bits(control, 8, 11);

        let info = match self.resources.get(&resource_id) {
            Some(&info) => info,
            None => {
                warn!("sample from undeclared resource {}", resource_id);
                let zero_id = self.splat_f32(F32_ZERO);
                self.store_destination(&instr.dsts[0], zero_id);
                return;
            }
        };

        let coord_id = self.load_source(&instr.srcs[0]);
        let image_id = self.module.put_load(info.image_type_id, info.var_id);
        let sampler_var_id = self.sampler_variable(sampler_id);
        let sampler_type_id = self.module.put_sampler_type();
        let sampler_loaded_id = self.module.put_load(sampler_type_id, sampler_var_id);
        let sampled_image_type_id = self.module.put_sampled_image_type(info.image_type_id);
        let sampled_image_id = self.module.put_op2(
            SpvOp::SampledImage,
            sampled_image_type_id,
            image_id,
            sampler_loaded_id,
        );

        let result_type_id = self.vec4_type_id(info.sampled);
        let float_id = self.float_id();

        let result_id = match op {
            Op::Sample => self.module.put_op2(
                SpvOp::ImageSampleImplicitLod,
                result_type_id,
                sampled_image_id,
                coord_id,
            ),
            Op::SampleB => {
                let bias_vec_id = self.load_source(&instr.srcs[1]);
                let bias_id = self.module.put_composite_extract(float_id, bias_vec_id, &[0]);
                self.module.put_op(
                    SpvOp::ImageSampleImplicitLod,
                    result_type_id,
                    &[
                        sampled_image_id,
                        coord_id,
                        spirv::ImageOperands::BIAS.bits(),
                        bias_id,
                    ],
                )
            }
            Op::SampleL => {
                let lod_vec_id = self.load_source(&instr.srcs[1]);
                let lod_id = self.module.put_composite_extract(float_id, lod_vec_id, &[0]);
                self.module.put_op(
                    SpvOp::ImageSampleExplicitLod,
                    result_type_id,
                    &[
                        sampled_image_id,
                        coord_id,
                        spirv::ImageOperands::LOD.bits(),
                        lod_id,
                    ],
                )
            }
            Op::SampleG => {
                let ddx_id = self.load_source(&instr.srcs[1]);
                let ddy_id = self.load_source(&instr.srcs[2]);
                self.module.put_op(
                    SpvOp::ImageSampleExplicitLod,
                    result_type_id,
                    &[
                        sampled_image_id,
                        coord_id,
                        spirv::ImageOperands::GRAD.bits(),
                        ddx_id,
                        ddy_id,
                    ],
                )
            }
            Op::SampleCLz => {
                let dref_vec_id = self.load_source(&instr.srcs[1]);
                let dref_id = self.module.put_composite_extract(float_id, dref_vec_id, &[0]);
                let zero_id = self.const_f32(F32_ZERO);
                let scalar_id = self.scalar_type_id(info.sampled);
                let depth_id = self.module.put_op(
                    SpvOp::ImageSampleDrefExplicitLod,
                    scalar_id,
                    &[
                        sampled_image_id,
                        coord_id,
                        dref_id,
                        spirv::ImageOperands::LOD.bits(),
                        zero_id,
                    ],
                );
                self.module.put_composite_construct(
                    result_type_id,
                    &[depth_id, depth_id, depth_id, depth_id],
                )
            }
            Op::Fetch4 | Op::Fetch4Po => {
                if op == Op::Fetch4Po {
                    warn!("unhandled fetch4 programmable offset");
                }
                let component_id = self.const_i32(0);
                self.module.put_op3(
                    SpvOp::ImageGather,
                    result_type_id,
                    sampled_image_id,
                    coord_id,
                    component_id,
                )
            }
            Op::Fetch4C | Op::Fetch4PoC => {
                if op == Op::Fetch4PoC {
                    warn!("unhandled fetch4 programmable offset");
                }
                let dref_vec_id = self.load_source(&instr.srcs[1]);
                let dref_id = self.module.put_composite_extract(float_id, dref_vec_id, &[0]);
                self.module.put_op3(
                    SpvOp::ImageDrefGather,
                    result_type_id,
                    sampled_image_id,
                    coord_id,
                    dref_id,
                )
            }
            _ => unreachable!(),
        };

        let value_id = if info.sampled == ScalarKind::Float {
            result_id
        } else {
            let vec4f_id = self.vec4f_id();
            self.module.put_bitcast(vec4f_id, result_id)
        };
        self.store_destination(&instr.dsts[0], value_id);
    }

    fn emit_load(&mut self, instr: &Instruction) {
        let resource_id = get_bits(instr.control as u32, 0, 7);
        let info = match self.resources.get(&resource_id) {
            Some(&info) => info,
            None => {
                warn!("load from undeclared resource {}", resource_id);
                let zero_id = self.splat_f32(F32_ZERO);
                self.store_destination(&instr.dsts[0], zero_id);
                return;
            }
        };

        let coord_id = self.load_source_int(&instr.srcs[0]);
        let image_id = self.module.put_load(info.image_type_id, info.var_id);
        let result_type_id = self.vec4_type_id(info.sampled);

        let result_id = if info.dim == spirv::Dim::DimBuffer {
            self.module
                .put_op2(SpvOp::ImageFetch, result_type_id, image_id, coord_id)
        } else {
            let lod_id = self.const_i32(0);
            self.module.put_op(
                SpvOp::ImageFetch,
                result_type_id,
                &[
                    image_id,
                    coord_id,
                    spirv::ImageOperands::LOD.bits(),
                    lod_id,
                ],
            )
        };

        let value_id = if info.sampled == ScalarKind::Float {
            result_id
        } else {
            let vec4f_id = self.vec4f_id();
            self.module.put_bitcast(vec4f_id, result_id)
        };
        self.store_destination(&instr.dsts[0], value_id);
    }

    fn emit_resinfo(&mut self, instr: &Instruction) {
        let control = instr.control as u32;
        let resource_id = get_bits(control, 0, 7);
        let as_uint = get_bit(control, 8) != 0;
        if get_bits(control, 9, 15) != 0 {
            warn!("unhandled resinfo flags 0x{:X}", instr.control);
        }

        let info = match self.resources.get(&resource_id) {
            Some(&info) => info,
            None => {
                warn!("resinfo on undeclared resource {}", resource_id);
                let zero_id = self.splat_f32(F32_ZERO);
                self.store_destination(&instr.dsts[0], zero_id);
                return;
            }
        };

        self.module.put_capability(spirv::Capability::ImageQuery);

        let int_id = self.int_id();
        let lod_vec_id = self.load_source_int(&instr.srcs[0]);
        let lod_id = self.module.put_composite_extract(int_id, lod_vec_id, &[0]);
        let image_id = self.module.put_load(info.image_type_id, info.var_id);

        let size_components = match info.dim {
            spirv::Dim::Dim1D | spirv::Dim::DimBuffer => 1,
            spirv::Dim::Dim2D | spirv::Dim::DimCube => 2,
            _ => 3,
        };
        let size_type_id = if size_components == 1 {
            int_id
        } else {
            self.module.put_vector_type(int_id, size_components)
        };
        let size_id =
            self.module
                .put_op2(SpvOp::ImageQuerySizeLod, size_type_id, image_id, lod_id);
        let levels_id = self.module.put_op1(SpvOp::ImageQueryLevels, int_id, image_id);

        let zero_id = self.const_i32(0);
        let mut lanes = [zero_id, zero_id, zero_id, levels_id];
        for i in 0..size_components {
            lanes[i as usize] = if size_components == 1 {
                size_id
            } else {
                self.module.put_composite_extract(int_id, size_id, &[i])
            };
        }
        let ivec4_id = self.ivec4_id();
        let dims_id = self.module.put_composite_construct(ivec4_id, &lanes);

        let value_id = if as_uint {
            let vec4f_id = self.vec4f_id();
            self.module.put_bitcast(vec4f_id, dims_id)
        } else {
            let vec4f_id = self.vec4f_id();
            self.module.put_op1(SpvOp::ConvertSToF, vec4f_id, dims_id)
        };
        self.store_destination(&instr.dsts[0], value_id);
    }

    // Raw and structured buffers.

    /// A storage buffer holding a runtime array of 32-bit words.
    fn word_buffer_variable(&mut self, name: &str, binding_index: u32) -> SpvId {
        let uint_id = self.uint_id();
        let array_id = self.module.put_runtime_array_type(uint_id);
        let struct_id = self.module.put_struct_type(&[array_id]);
        if !self.word_array_decorated {
            self.module
                .put_decoration(array_id, spirv::Decoration::ArrayStride, &[4]);
            self.module
                .put_decoration(struct_id, spirv::Decoration::BufferBlock, &[]);
            self.module
                .put_member_decoration(struct_id, 0, spirv::Decoration::Offset, &[0]);
            self.word_array_decorated = true;
        }
        let pointer_id = self
            .module
            .put_pointer_type(spirv::StorageClass::Uniform, struct_id);
        let var_id = self.module.put_variable(pointer_id, spirv::StorageClass::Uniform);
        self.module.put_name(var_id, name);
        self.module
            .put_decoration(var_id, spirv::Decoration::DescriptorSet, &[0]);
        self.module
            .put_decoration(var_id, spirv::Decoration::Binding, &[binding_index]);
        var_id
    }

    fn word_buffer_pointer(&mut self, var_id: SpvId, word_index_id: SpvId) -> SpvId {
        let uint_id = self.uint_id();
        let pointer_id = self
            .module
            .put_pointer_type(spirv::StorageClass::Uniform, uint_id);
        let member_id = self.const_i32(0);
        self.module
            .put_access_chain(pointer_id, var_id, &[member_id, word_index_id])
    }

    fn alloc_stride_slot(&mut self) -> Option<u32> {
        if self.stride_count >= MAX_STRIDE_CONSTANTS {
            warn!("out of push-constant stride slots");
            return None;
        }
        let slot = self.stride_count;
        self.stride_count += 1;
        Some(slot)
    }

    /// Load the dynamic stride of a structured binding from the
    /// push-constant block.
    fn load_stride(&mut self, stride_index: Option<u32>) -> SpvId {
        let slot = match stride_index {
            Some(slot) => slot,
            None => {
                warn!("structured access without a stride slot");
                return self.const_u32(4);
            }
        };
        let var_id = match self.push_constants_var_id {
            Some(var_id) => var_id,
            None => {
                let uint_id = self.uint_id();
                let length_id = self.const_i32(MAX_STRIDE_CONSTANTS);
                let array_id = self.module.put_array_type(uint_id, length_id);
                self.module
                    .put_decoration(array_id, spirv::Decoration::ArrayStride, &[4]);
                let struct_id = self.module.put_struct_type(&[array_id]);
                self.module
                    .put_decoration(struct_id, spirv::Decoration::Block, &[]);
                self.module
                    .put_member_decoration(struct_id, 0, spirv::Decoration::Offset, &[0]);
                let pointer_id = self
                    .module
                    .put_pointer_type(spirv::StorageClass::PushConstant, struct_id);
                let var_id = self
                    .module
                    .put_variable(pointer_id, spirv::StorageClass::PushConstant);
                self.module.put_name(var_id, "strides");
                self.push_constants_var_id = Some(var_id);
                var_id
            }
        };
        let uint_id = self.uint_id();
        let pointer_id = self
            .module
            .put_pointer_type(spirv::StorageClass::PushConstant, uint_id);
        let member_id = self.const_i32(0);
        let slot_id = self.const_i32(slot);
        let slot_ptr_id = self
            .module
            .put_access_chain(pointer_id, var_id, &[member_id, slot_id]);
        self.module.put_load(uint_id, slot_ptr_id)
    }

    fn emit_raw_buffer_decl(&mut self, instr: &Instruction, is_uav: bool) {
        let id = get_bits(instr.control as u32, 0, 13);
        let binding_index = BASE_RESOURCE_ID + id;
        let prefix = if is_uav { "uav" } else { "srv" };
        let var_id = self.word_buffer_variable(&format!("{}{}", prefix, id), binding_index);
        self.bindings.push(Binding {
            index: binding_index,
            descriptor_kind: DescriptorKind::StorageBuffer,
            stride_index: None,
        });
        let info = BufferInfo {
            var_id,
            stride_index: None,
        };
        if is_uav {
            self.buffer_uavs.insert(id, info);
        } else {
            self.buffer_srvs.insert(id, info);
        }
    }

    fn emit_struct_buffer_decl(&mut self, instr: &Instruction, is_uav: bool) {
        let id = get_bits(instr.control as u32, 0, 13);
        let binding_index = BASE_RESOURCE_ID + id;
        let stride_index = self.alloc_stride_slot();
        let prefix = if is_uav { "uav" } else { "srv" };
        let var_id = self.word_buffer_variable(&format!("{}{}", prefix, id), binding_index);
        self.bindings.push(Binding {
            index: binding_index,
            descriptor_kind: DescriptorKind::StorageBuffer,
            stride_index,
        });
        let info = BufferInfo {
            var_id,
            stride_index,
        };
        if is_uav {
            self.buffer_uavs.insert(id, info);
        } else {
            self.buffer_srvs.insert(id, info);
        }
    }

    /// Word index of a structured element: `(index * stride + offset) / 4`
    /// with the index in the address source's x and the byte offset in y.
    fn structured_word_index(&mut self, addr: &Source, stride_index: Option<u32>) -> SpvId {
        let uint_id = self.uint_id();
        let addr_id = self.load_source_uint(addr);
        let index_id = self.module.put_composite_extract(uint_id, addr_id, &[0]);
        let offset_id = self.module.put_composite_extract(uint_id, addr_id, &[1]);
        let stride_id = self.load_stride(stride_index);
        let base_id = self.module.put_op2(SpvOp::IMul, uint_id, index_id, stride_id);
        let byte_id = self.module.put_op2(SpvOp::IAdd, uint_id, base_id, offset_id);
        let two_id = self.const_u32(2);
        self.module
            .put_op2(SpvOp::ShiftRightLogical, uint_id, byte_id, two_id)
    }

    fn load_buffer_vec(&mut self, var_id: SpvId, word_index_id: SpvId) -> SpvId {
        let uint_id = self.uint_id();
        let mut lanes = [0 as SpvId; 4];
        for (i, lane) in lanes.iter_mut().enumerate() {
            let offset_id = self.const_u32(i as u32);
            let index_id = self
                .module
                .put_op2(SpvOp::IAdd, uint_id, word_index_id, offset_id);
            let pointer_id = self.word_buffer_pointer(var_id, index_id);
            *lane = self.module.put_load(uint_id, pointer_id);
        }
        let uvec4_id = self.uvec4_id();
        self.module.put_composite_construct(uvec4_id, &lanes)
    }

    fn store_buffer_vec(
        &mut self,
        var_id: SpvId,
        word_index_id: SpvId,
        value_id: SpvId,
        mask: &[u8; 4],
    ) {
        let uint_id = self.uint_id();
        for i in 0..4u32 {
            if mask[i as usize] != il::modcomp::WRITE {
                continue;
            }
            let offset_id = self.const_u32(i);
            let index_id = self
                .module
                .put_op2(SpvOp::IAdd, uint_id, word_index_id, offset_id);
            let pointer_id = self.word_buffer_pointer(var_id, index_id);
            let lane_id = self.module.put_composite_extract(uint_id, value_id, &[i]);
            self.module.put_store(pointer_id, lane_id);
        }
    }

    fn emit_struct_load(&mut self, instr: &Instruction, is_uav: bool) {
        let id = get_bits(instr.control as u32, 0, if is_uav { 13 } else { 7 });
        let info = match if is_uav {
            self.buffer_uavs.get(&id)
        } else {
            self.buffer_srvs.get(&id)
        } {
            Some(&info) => info,
            None => {
                warn!("structured load from undeclared buffer {}", id);
                let zero_id = self.splat_f32(F32_ZERO);
                self.store_destination(&instr.dsts[0], zero_id);
                return;
            }
        };
        let word_index_id = self.structured_word_index(&instr.srcs[0], info.stride_index);
        let value_id = self.load_buffer_vec(info.var_id, word_index_id);
        self.store_destination_bits(&instr.dsts[0], value_id);
    }

    fn emit_struct_store(&mut self, instr: &Instruction) {
        let id = get_bits(instr.control as u32, 0, 13);
        let info = match self.buffer_uavs.get(&id) {
            Some(&info) => info,
            None => {
                warn!("structured store to undeclared UAV {}", id);
                return;
            }
        };
        let word_index_id = self.structured_word_index(&instr.srcs[0], info.stride_index);
        let value_id = self.load_source_uint(&instr.srcs[1]);
        let mask = instr
            .dsts
            .first()
            .map(|dst| dst.component)
            .unwrap_or([il::modcomp::WRITE; 4]);
        self.store_buffer_vec(info.var_id, word_index_id, value_id, &mask);
    }

    fn emit_raw_store(&mut self, instr: &Instruction) {
        let id = get_bits(instr.control as u32, 0, 13);
        let info = match self.buffer_uavs.get(&id) {
            Some(&info) => info,
            None => {
                warn!("raw store to undeclared UAV {}", id);
                return;
            }
        };
        let uint_id = self.uint_id();
        let addr_id = self.uint_scalar_x(&instr.srcs[0]);
        let two_id = self.const_u32(2);
        let word_index_id = self
            .module
            .put_op2(SpvOp::ShiftRightLogical, uint_id, addr_id, two_id);
        let value_id = self.load_source_uint(&instr.srcs[1]);
        let mask = instr
            .dsts
            .first()
            .map(|dst| dst.component)
            .unwrap_or([il::modcomp::WRITE; 4]);
        self.store_buffer_vec(info.var_id, word_index_id, value_id, &mask);
    }

    fn emit_uav_image_decl(&mut self, id: u32, usage: Option<PixTexUsage>, fmt: Option<ElementFormat>) {
        let (dim, arrayed, ms) = self.texture_dim(usage);
        let kind = self.sampled_kind(fmt);
        let format = match kind {
            ScalarKind::Float => spirv::ImageFormat::Rgba32f,
            ScalarKind::Int => spirv::ImageFormat::Rgba32i,
            ScalarKind::Uint => spirv::ImageFormat::Rgba32ui,
        };
        let scalar_id = self.scalar_type_id(kind);
        let image_type_id = self
            .module
            .put_image_type(scalar_id, dim, 0, arrayed, ms, 2, format);
        let pointer_id = self
            .module
            .put_pointer_type(spirv::StorageClass::UniformConstant, image_type_id);
        let var_id = self
            .module
            .put_variable(pointer_id, spirv::StorageClass::UniformConstant);
        self.module.put_name(var_id, &format!("uav{}", id));

        let binding_index = BASE_RESOURCE_ID + id;
        self.module
            .put_decoration(var_id, spirv::Decoration::DescriptorSet, &[0]);
        self.module
            .put_decoration(var_id, spirv::Decoration::Binding, &[binding_index]);
        self.bindings.push(Binding {
            index: binding_index,
            descriptor_kind: DescriptorKind::StorageImage,
            stride_index: None,
        });

        self.image_uavs.insert(
            id,
            ResourceInfo {
                var_id,
                image_type_id,
                sampled: kind,
                dim,
            },
        );
    }

    fn emit_uav_load(&mut self, instr: &Instruction) {
        let id = get_bits(instr.control as u32, 0, 13);
        let info = match self.image_uavs.get(&id) {
            Some(&info) => info,
            None => {
                warn!("load from undeclared UAV {}", id);
                let zero_id = self.splat_f32(F32_ZERO);
                self.store_destination(&instr.dsts[0], zero_id);
                return;
            }
        };
        let coord_id = self.load_source_int(&instr.srcs[0]);
        let image_id = self.module.put_load(info.image_type_id, info.var_id);
        let result_type_id = self.vec4_type_id(info.sampled);
        let result_id = self
            .module
            .put_op2(SpvOp::ImageRead, result_type_id, image_id, coord_id);
        let value_id = if info.sampled == ScalarKind::Float {
            result_id
        } else {
            let vec4f_id = self.vec4f_id();
            self.module.put_bitcast(vec4f_id, result_id)
        };
        self.store_destination(&instr.dsts[0], value_id);
    }

    fn emit_uav_store(&mut self, instr: &Instruction) {
        let id = get_bits(instr.control as u32, 0, 13);
        let info = match self.image_uavs.get(&id) {
            Some(&info) => info,
            None => {
                warn!("store to undeclared UAV {}", id);
                return;
            }
        };
        let coord_id = self.load_source_int(&instr.srcs[0]);
        let value_f_id = self.load_source(&instr.srcs[1]);
        let value_id = if info.sampled == ScalarKind::Float {
            value_f_id
        } else {
            let type_id = self.vec4_type_id(info.sampled);
            self.module.put_bitcast(type_id, value_f_id)
        };
        let image_id = self.module.put_load(info.image_type_id, info.var_id);
        self.module
            .put_op_no_result(SpvOp::ImageWrite, &[image_id, coord_id, value_id]);
    }

    fn emit_uav_atomic_add(&mut self, instr: &Instruction, with_result: bool) {
        let id = get_bits(instr.control as u32, 0, 13);
        let info = match self.buffer_uavs.get(&id) {
            Some(&info) => info,
            None => {
                warn!("atomic on undeclared UAV {}", id);
                return;
            }
        };
        let uint_id = self.uint_id();
        let addr_id = self.uint_scalar_x(&instr.srcs[0]);
        let two_id = self.const_u32(2);
        let word_index_id = self
            .module
            .put_op2(SpvOp::ShiftRightLogical, uint_id, addr_id, two_id);
        let pointer_id = self.word_buffer_pointer(info.var_id, word_index_id);
        let value_id = self.uint_scalar_x(&instr.srcs[1]);
        let scope_id = self.const_u32(spirv::Scope::Device as u32);
        let semantics_id = self.const_u32(0);
        let result_id = self.module.put_op(
            SpvOp::AtomicIAdd,
            uint_id,
            &[pointer_id, scope_id, semantics_id, value_id],
        );
        if with_result {
            let uvec4_id = self.uvec4_id();
            let splat_id = self.module.put_composite_construct(
                uvec4_id,
                &[result_id, result_id, result_id, result_id],
            );
            self.store_destination_bits(&instr.dsts[0], splat_id);
        }
    }

    fn emit_append_buf_alloc(&mut self, instr: &Instruction) {
        let var_id = match self.atomic_counter_var_id {
            Some(var_id) => var_id,
            None => {
                let uint_id = self.uint_id();
                let struct_id = self.module.put_struct_type(&[uint_id]);
                if !self.counter_struct_decorated {
                    self.module
                        .put_decoration(struct_id, spirv::Decoration::BufferBlock, &[]);
                    self.module
                        .put_member_decoration(struct_id, 0, spirv::Decoration::Offset, &[0]);
                    self.counter_struct_decorated = true;
                }
                let pointer_id = self
                    .module
                    .put_pointer_type(spirv::StorageClass::Uniform, struct_id);
                let var_id = self.module.put_variable(pointer_id, spirv::StorageClass::Uniform);
                self.module.put_name(var_id, "atomicCounter");
                self.module
                    .put_decoration(var_id, spirv::Decoration::DescriptorSet, &[0]);
                self.module
                    .put_decoration(var_id, spirv::Decoration::Binding, &[ATOMIC_COUNTER_ID]);
                self.bindings.push(Binding {
                    index: ATOMIC_COUNTER_ID,
                    descriptor_kind: DescriptorKind::StorageBuffer,
                    stride_index: None,
                });
                self.atomic_counter_var_id = Some(var_id);
                var_id
            }
        };

        let uint_id = self.uint_id();
        let pointer_type_id = self
            .module
            .put_pointer_type(spirv::StorageClass::Uniform, uint_id);
        let member_id = self.const_i32(0);
        let pointer_id = self
            .module
            .put_access_chain(pointer_type_id, var_id, &[member_id]);
        let scope_id = self.const_u32(spirv::Scope::Device as u32);
        let semantics_id = self.const_u32(0);
        let one_id = self.const_u32(1);
        let result_id = self.module.put_op(
            SpvOp::AtomicIAdd,
            uint_id,
            &[pointer_id, scope_id, semantics_id, one_id],
        );
        let uvec4_id = self.uvec4_id();
        let splat_id = self.module.put_composite_construct(
            uvec4_id,
            &[result_id, result_id, result_id, result_id],
        );
        self.store_destination_bits(&instr.dsts[0], splat_id);
    }

    // Local data share.

    fn emit_lds_decl(&mut self, instr: &Instruction, structured: bool) {
        let id = get_bits(instr.control as u32, 0, 13);
        let byte_size = if structured {
            let stride = instr.extras.first().copied().unwrap_or(4);
            let count = instr.extras.get(1).copied().unwrap_or(1);
            stride.saturating_mul(count)
        } else {
            instr.extras.first().copied().unwrap_or(4)
        };
        let word_count = (byte_size / 4).max(1);

        let uint_id = self.uint_id();
        let length_id = self.const_i32(word_count);
        let array_id = self.module.put_array_type(uint_id, length_id);
        let pointer_id = self
            .module
            .put_pointer_type(spirv::StorageClass::Workgroup, array_id);
        let var_id = self.module.put_variable(pointer_id, spirv::StorageClass::Workgroup);
        self.module.put_name(var_id, &format!("lds{}", id));
        self.lds_vars.insert(id, var_id);
    }

    fn lds_word_pointer(&mut self, var_id: SpvId, word_index_id: SpvId) -> SpvId {
        let uint_id = self.uint_id();
        let pointer_id = self
            .module
            .put_pointer_type(spirv::StorageClass::Workgroup, uint_id);
        self.module.put_access_chain(pointer_id, var_id, &[word_index_id])
    }

    fn emit_lds_load(&mut self, instr: &Instruction) {
        let id = get_bits(instr.control as u32, 0, 13);
        let var_id = match self.lds_vars.get(&id) {
            Some(&var_id) => var_id,
            None => {
                warn!("load from undeclared LDS {}", id);
                let zero_id = self.splat_f32(F32_ZERO);
                self.store_destination(&instr.dsts[0], zero_id);
                return;
            }
        };
        let uint_id = self.uint_id();
        let word_index_id = self.uint_scalar_x(&instr.srcs[0]);
        let mut lanes = [0 as SpvId; 4];
        for (i, lane) in lanes.iter_mut().enumerate() {
            let offset_id = self.const_u32(i as u32);
            let index_id = self
                .module
                .put_op2(SpvOp::IAdd, uint_id, word_index_id, offset_id);
            let pointer_id = self.lds_word_pointer(var_id, index_id);
            *lane = self.module.put_load(uint_id, pointer_id);
        }
        let uvec4_id = self.uvec4_id();
        let value_id = self.module.put_composite_construct(uvec4_id, &lanes);
        self.store_destination_bits(&instr.dsts[0], value_id);
    }

    fn emit_lds_store(&mut self, instr: &Instruction) {
        let id = get_bits(instr.control as u32, 0, 13);
        let var_id = match self.lds_vars.get(&id) {
            Some(&var_id) => var_id,
            None => {
                warn!("store to undeclared LDS {}", id);
                return;
            }
        };
        let uint_id = self.uint_id();
        let word_index_id = self.uint_scalar_x(&instr.srcs[0]);
        let value_id = self.load_source_uint(&instr.srcs[1]);
        let mask = instr
            .dsts
            .first()
            .map(|dst| dst.component)
            .unwrap_or([il::modcomp::WRITE; 4]);
        for i in 0..4u32 {
            if mask[i as usize] != il::modcomp::WRITE {
                continue;
            }
            let offset_id = self.const_u32(i);
            let index_id = self
                .module
                .put_op2(SpvOp::IAdd, uint_id, word_index_id, offset_id);
            let pointer_id = self.lds_word_pointer(var_id, index_id);
            let lane_id = self.module.put_composite_extract(uint_id, value_id, &[i]);
            self.module.put_store(pointer_id, lane_id);
        }
    }

    fn emit_lds_read_add(&mut self, instr: &Instruction) {
        let id = get_bits(instr.control as u32, 0, 13);
        let var_id = match self.lds_vars.get(&id) {
            Some(&var_id) => var_id,
            None => {
                warn!("atomic on undeclared LDS {}", id);
                return;
            }
        };
        let uint_id = self.uint_id();
        let word_index_id = self.uint_scalar_x(&instr.srcs[0]);
        let pointer_id = self.lds_word_pointer(var_id, word_index_id);
        let value_id = self.uint_scalar_x(&instr.srcs[1]);
        let scope_id = self.const_u32(spirv::Scope::Workgroup as u32);
        let semantics_id = self.const_u32(0);
        let result_id = self.module.put_op(
            SpvOp::AtomicIAdd,
            uint_id,
            &[pointer_id, scope_id, semantics_id, value_id],
        );
        let uvec4_id = self.uvec4_id();
        let splat_id = self.module.put_composite_construct(
            uvec4_id,
            &[result_id, result_id, result_id, result_id],
        );
        self.store_destination_bits(&instr.dsts[0], splat_id);
    }

    fn emit_fence(&mut self) {
        let exec_scope_id = self.const_u32(spirv::Scope::Workgroup as u32);
        let mem_scope_id = self.const_u32(spirv::Scope::Workgroup as u32);
        let semantics = spirv::MemorySemantics::ACQUIRE_RELEASE | spirv::MemorySemantics::WORKGROUP_MEMORY;
        let semantics_id = self.const_u32(semantics.bits());
        self.module.put_op_no_result(
            SpvOp::ControlBarrier,
            &[exec_scope_id, mem_scope_id, semantics_id],
        );
    }

    fn emit_num_thread_per_group(&mut self, instr: &Instruction) {
        let x = instr.extras.first().copied().unwrap_or(1);
        let y = instr.extras.get(1).copied().unwrap_or(1);
        let z = instr.extras.get(2).copied().unwrap_or(1);
        self.module
            .put_exec_mode(self.entry_point_id, spirv::ExecutionMode::LocalSize, &[x, y, z]);
        self.local_size_emitted = true;
    }

    fn emit_ts_domain(&mut self, instr: &Instruction) {
        let mode = match get_bits(instr.control as u32, 0, 1) {
            il::ts_domain::ISOLINE => spirv::ExecutionMode::Isolines,
            il::ts_domain::TRI => spirv::ExecutionMode::Triangles,
            il::ts_domain::QUAD => spirv::ExecutionMode::Quads,
            domain => {
                warn!("unhandled tessellator domain {}", domain);
                return;
            }
        };
        self.module.put_exec_mode(self.entry_point_id, mode, &[]);
    }

    fn emit_ts_partition(&mut self, instr: &Instruction) {
        let mode = match get_bits(instr.control as u32, 0, 1) {
            il::ts_partition::INTEGER => spirv::ExecutionMode::SpacingEqual,
            il::ts_partition::POW2 => {
                warn!("unhandled pow2 partitioning, using equal spacing");
                spirv::ExecutionMode::SpacingEqual
            }
            il::ts_partition::FRACTIONAL_ODD => spirv::ExecutionMode::SpacingFractionalOdd,
            il::ts_partition::FRACTIONAL_EVEN => spirv::ExecutionMode::SpacingFractionalEven,
            _ => unreachable!(),
        };
        self.module.put_exec_mode(self.entry_point_id, mode, &[]);
    }

    fn emit_ts_output_primitive(&mut self, instr: &Instruction) {
        let mode = match get_bits(instr.control as u32, 0, 1) {
            il::ts_output_primitive::POINT => spirv::ExecutionMode::PointMode,
            il::ts_output_primitive::TRIANGLE_CW => spirv::ExecutionMode::VertexOrderCw,
            il::ts_output_primitive::TRIANGLE_CCW => spirv::ExecutionMode::VertexOrderCcw,
            primitive => {
                warn!("unhandled tessellator output primitive {}", primitive);
                return;
            }
        };
        self.module.put_exec_mode(self.entry_point_id, mode, &[]);
    }

    // Top level.

    fn emit_func(&mut self) {
        let void_id = self.module.put_void_type();
        let func_type_id = self.module.put_function_type(void_id, &[]);
        self.module.put_function(
            void_id,
            self.entry_point_id,
            spirv::FunctionControl::NONE,
            func_type_id,
        );
        self.module.put_label();
        self.block_open = true;
    }

    fn needs_block(op: Op) -> bool {
        !matches!(
            op,
            Op::DclInput
                | Op::DclOutput
                | Op::DclLiteral
                | Op::DclConstBuffer
                | Op::DclResource
                | Op::DclGlobalFlags
                | Op::DclIndexedTempArray
                | Op::DclNumThreadPerGroup
                | Op::DclUav
                | Op::DclRawUav
                | Op::DclTypedUav
                | Op::DclTypelessUav
                | Op::DclRawSrv
                | Op::DclStructSrv
                | Op::DclLds
                | Op::DclStructLds
                | Op::DclNumIcp
                | Op::DclNumOcp
                | Op::DclTsDomain
                | Op::DclTsPartition
                | Op::DclTsOutputPrimitive
                | Op::DclMaxTessFactor
                | Op::DclArray
                | Op::HsForkPhase
                | Op::HsJoinPhase
                | Op::EndPhase
                | Op::Switch
                | Op::Case
                | Op::Default
                | Op::EndSwitch
                | Op::Unk660
                | Op::End
                | Op::Prefix
        )
    }

    fn emit_instr(&mut self, instr: &Instruction) {
        let op = match instr.op() {
            Some(op) => op,
            None => {
                warn!("unhandled instruction {}", instr.opcode);
                return;
            }
        };

        // Declarations and warnings-only opcodes live outside the block
        // structure; everything else needs an open block to emit into.
        if Self::needs_block(op) {
            self.ensure_block();
        }

        match op {
            Op::End => {
                if self.block_open {
                    self.module.put_return();
                    self.block_open = false;
                }
                self.module.put_function_end();
                self.function_ended = true;
            }
            Op::EndMain | Op::RetDyn => {
                self.module.put_return();
                self.block_open = false;
            }

            Op::DclInput => self.emit_input(instr),
            Op::DclOutput => self.emit_output(instr),
            Op::DclLiteral => self.emit_literal(instr),
            Op::DclConstBuffer => self.emit_const_buffer(instr),
            Op::DclResource => self.emit_resource(instr),
            Op::DclGlobalFlags => self.emit_global_flags(instr),
            Op::DclIndexedTempArray => self.emit_indexed_temp_array(instr),
            Op::DclNumThreadPerGroup => self.emit_num_thread_per_group(instr),
            Op::DclUav => {
                let control = instr.control as u32;
                let id = get_bits(control, 0, 3);
                let usage = PixTexUsage::from_u32(get_bits(control, 8, 11));
                let fmt = ElementFormat::from_u32(get_bits(control, 4, 7));
                self.emit_uav_image_decl(id, usage, fmt);
            }
            Op::DclTypedUav => {
                let id = get_bits(instr.control as u32, 0, 13);
                let layout = instr.extras.first().copied().unwrap_or(0);
                let usage = PixTexUsage::from_u32(get_bits(layout, 0, 3));
                let fmt = ElementFormat::from_u32(get_bits(layout, 4, 9));
                self.emit_uav_image_decl(id, usage, fmt);
            }
            Op::DclRawUav | Op::DclTypelessUav => self.emit_raw_buffer_decl(instr, true),
            Op::DclRawSrv => self.emit_raw_buffer_decl(instr, false),
            Op::DclStructSrv => self.emit_struct_buffer_decl(instr, false),
            Op::DclLds => self.emit_lds_decl(instr, false),
            Op::DclStructLds => self.emit_lds_decl(instr, true),
            Op::DclNumIcp | Op::DclNumOcp => {
                if op == Op::DclNumOcp {
                    let count = instr.extras.first().copied().unwrap_or(1);
                    self.module.put_exec_mode(
                        self.entry_point_id,
                        spirv::ExecutionMode::OutputVertices,
                        &[count],
                    );
                }
            }
            Op::DclTsDomain => self.emit_ts_domain(instr),
            Op::DclTsPartition => self.emit_ts_partition(instr),
            Op::DclTsOutputPrimitive => self.emit_ts_output_primitive(instr),
            Op::DclMaxTessFactor => warn!("unhandled max tessfactor declaration"),
            Op::DclArray => warn!("unhandled array declaration"),
            Op::HsForkPhase | Op::HsJoinPhase | Op::EndPhase => {
                warn!("unhandled hull shader phase marker");
            }

            Op::Mov => self.emit_mov(instr),
            Op::Add => self.emit_float_binary(instr, SpvOp::FAdd),
            Op::Mul => self.emit_float_binary(instr, SpvOp::FMul),
            Op::Div => self.emit_float_binary(instr, SpvOp::FDiv),
            Op::Max => self.emit_glsl_binary(instr, spirv::GLOp::FMax),
            Op::Min => self.emit_glsl_binary(instr, spirv::GLOp::FMin),
            Op::Mad => self.emit_fma(instr),
            Op::Abs => self.emit_glsl_unary(instr, spirv::GLOp::FAbs),
            Op::Acos => self.emit_glsl_unary(instr, spirv::GLOp::Acos),
            Op::Asin => self.emit_glsl_unary(instr, spirv::GLOp::Asin),
            Op::Atan => self.emit_glsl_unary(instr, spirv::GLOp::Atan),
            Op::Frc => self.emit_glsl_unary(instr, spirv::GLOp::Fract),
            Op::SinVec => self.emit_glsl_unary(instr, spirv::GLOp::Sin),
            Op::CosVec => self.emit_glsl_unary(instr, spirv::GLOp::Cos),
            Op::SqrtVec => self.emit_glsl_unary(instr, spirv::GLOp::Sqrt),
            Op::RsqVec => self.emit_glsl_unary(instr, spirv::GLOp::InverseSqrt),
            Op::ExpVec => self.emit_glsl_unary(instr, spirv::GLOp::Exp2),
            Op::LogVec => self.emit_glsl_unary(instr, spirv::GLOp::Log2),
            Op::RoundNear => self.emit_glsl_unary(instr, spirv::GLOp::RoundEven),
            Op::RoundNegInf => self.emit_glsl_unary(instr, spirv::GLOp::Floor),
            Op::RoundPlusInf => self.emit_glsl_unary(instr, spirv::GLOp::Ceil),
            Op::RoundZero => self.emit_glsl_unary(instr, spirv::GLOp::Trunc),
            Op::RcpVec => self.emit_rcp(instr),
            Op::Dp2 => self.emit_dot(instr, 2),
            Op::Dp3 => self.emit_dot(instr, 3),
            Op::Dp4 => self.emit_dot(instr, 4),
            Op::Dsx => self.emit_derivative(instr, SpvOp::DPdxFine, SpvOp::DPdx),
            Op::Dsy => self.emit_derivative(instr, SpvOp::DPdyFine, SpvOp::DPdy),
            Op::F2F16 => {
                let a_id = self.load_source(&instr.srcs[0]);
                let vec4f_id = self.vec4f_id();
                let result_id = self.module.put_op1(SpvOp::QuantizeToF16, vec4f_id, a_id);
                self.store_destination(&instr.dsts[0], result_id);
            }
            Op::F162F => {
                warn!("approximate f16_2_f lowering");
                self.emit_mov(instr);
            }

            Op::Eq => self.emit_float_compare(instr, SpvOp::FOrdEqual),
            Op::Ge => self.emit_float_compare(instr, SpvOp::FOrdGreaterThanEqual),
            Op::Lt => self.emit_float_compare(instr, SpvOp::FOrdLessThan),
            Op::Ne => self.emit_float_compare(instr, SpvOp::FUnordNotEqual),
            Op::CmovLogical => self.emit_cmov_logical(instr),

            Op::IAdd => self.emit_int_binary(instr, SpvOp::IAdd, true),
            Op::IMul => self.emit_int_binary(instr, SpvOp::IMul, true),
            Op::IMad => self.emit_imad(instr),
            Op::INegate => self.emit_int_unary(instr, SpvOp::SNegate, true),
            Op::INot => self.emit_int_unary(instr, SpvOp::Not, false),
            Op::And => self.emit_int_binary(instr, SpvOp::BitwiseAnd, false),
            Op::IOr => self.emit_int_binary(instr, SpvOp::BitwiseOr, false),
            Op::IXor => self.emit_int_binary(instr, SpvOp::BitwiseXor, false),
            Op::IShl => self.emit_int_binary(instr, SpvOp::ShiftLeftLogical, false),
            Op::IShr => self.emit_int_binary(instr, SpvOp::ShiftRightArithmetic, true),
            Op::UShr => self.emit_int_binary(instr, SpvOp::ShiftRightLogical, false),
            Op::UDiv => self.emit_int_binary(instr, SpvOp::UDiv, false),
            Op::UMod => self.emit_int_binary(instr, SpvOp::UMod, false),
            Op::IMax => self.emit_int_glsl_binary(instr, spirv::GLOp::SMax, true),
            Op::IMin => self.emit_int_glsl_binary(instr, spirv::GLOp::SMin, true),
            Op::UMax => self.emit_int_glsl_binary(instr, spirv::GLOp::UMax, false),
            Op::UMin => self.emit_int_glsl_binary(instr, spirv::GLOp::UMin, false),
            Op::IEq => self.emit_int_compare(instr, SpvOp::IEqual, true),
            Op::INe => self.emit_int_compare(instr, SpvOp::INotEqual, true),
            Op::IGe => self.emit_int_compare(instr, SpvOp::SGreaterThanEqual, true),
            Op::ILt => self.emit_int_compare(instr, SpvOp::SLessThan, true),
            Op::UGe => self.emit_int_compare(instr, SpvOp::UGreaterThanEqual, false),
            Op::ULt => self.emit_int_compare(instr, SpvOp::ULessThan, false),
            Op::IFirstBit => {
                let a_id = self.load_source_int(&instr.srcs[0]);
                let ivec4_id = self.ivec4_id();
                let result_id = self
                    .module
                    .put_glsl_op(spirv::GLOp::FindSMsb, ivec4_id, &[a_id]);
                self.store_destination_bits(&instr.dsts[0], result_id);
            }
            Op::IBitExtract => self.emit_bit_extract(instr, true),
            Op::UBitExtract => self.emit_bit_extract(instr, false),
            Op::UBitInsert => self.emit_bit_insert(instr),

            Op::Ftoi => self.emit_convert(instr, SpvOp::ConvertFToS),
            Op::Ftou => self.emit_convert(instr, SpvOp::ConvertFToU),
            Op::Itof => self.emit_convert(instr, SpvOp::ConvertSToF),
            Op::Utof => self.emit_convert(instr, SpvOp::ConvertUToF),

            Op::IfLogicalZ => self.emit_if(instr, false),
            Op::IfLogicalNz => self.emit_if(instr, true),
            Op::Else => self.emit_else(),
            Op::EndIf => self.emit_endif(),
            Op::While => self.emit_while(),
            Op::EndLoop => self.emit_endloop(),
            Op::Break => self.emit_break(instr, None),
            Op::BreakLogicalZ => self.emit_break(instr, Some(false)),
            Op::BreakLogicalNz => self.emit_break(instr, Some(true)),
            Op::Breakc => self.emit_breakc(instr),
            Op::Continue => self.emit_continue(instr, None),
            Op::ContinueLogicalZ => self.emit_continue(instr, Some(false)),
            Op::ContinueLogicalNz => self.emit_continue(instr, Some(true)),
            Op::DiscardLogicalZ => self.emit_discard(instr, false),
            Op::DiscardLogicalNz => self.emit_discard(instr, true),
            Op::Switch | Op::Case | Op::Default | Op::EndSwitch => {
                warn!("unhandled switch construct");
            }

            Op::Sample
            | Op::SampleB
            | Op::SampleG
            | Op::SampleL
            | Op::SampleCLz
            | Op::Fetch4
            | Op::Fetch4C
            | Op::Fetch4Po
            | Op::Fetch4PoC => self.emit_sample(instr, op),
            Op::Load => self.emit_load(instr),
            Op::ResInfo => self.emit_resinfo(instr),

            Op::UavLoad => self.emit_uav_load(instr),
            Op::UavStore => self.emit_uav_store(instr),
            Op::UavRawStore => self.emit_raw_store(instr),
            Op::UavStructLoad => self.emit_struct_load(instr, true),
            Op::UavStructStore => self.emit_struct_store(instr),
            Op::SrvStructLoad => self.emit_struct_load(instr, false),
            Op::UavAdd => self.emit_uav_atomic_add(instr, false),
            Op::UavReadAdd => self.emit_uav_atomic_add(instr, true),
            Op::AppendBufAlloc => self.emit_append_buf_alloc(instr),
            Op::LdsLoadVec => self.emit_lds_load(instr),
            Op::LdsStoreVec => self.emit_lds_store(instr),
            Op::LdsReadAdd => self.emit_lds_read_add(instr),
            Op::Fence => self.emit_fence(),

            Op::Unk660 => warn!("unhandled instruction {}", instr.opcode),
            Op::Prefix => {}
        }
    }

    fn finish_function(&mut self) {
        if self.function_ended {
            return;
        }
        if self.block_open {
            self.module.put_return();
            self.block_open = false;
        }
        self.module.put_function_end();
    }

    fn emit_entry_point(&mut self) {
        let (exec_model, name) = match self.kernel.stage {
            ShaderStage::Vertex => (spirv::ExecutionModel::Vertex, "VShader"),
            ShaderStage::Pixel => (spirv::ExecutionModel::Fragment, "PShader"),
            ShaderStage::Geometry => (spirv::ExecutionModel::Geometry, "GShader"),
            ShaderStage::Compute => (spirv::ExecutionModel::GLCompute, "CShader"),
            ShaderStage::Hull => (spirv::ExecutionModel::TessellationControl, "HShader"),
            ShaderStage::Domain => (spirv::ExecutionModel::TessellationEvaluation, "DShader"),
        };

        let interfaces = std::mem::take(&mut self.interfaces);
        self.module
            .put_entry_point(exec_model, self.entry_point_id, name, &interfaces);
        self.module.put_name(self.entry_point_id, name);
        self.interfaces = interfaces;

        match self.kernel.stage {
            ShaderStage::Pixel => {
                self.module.put_exec_mode(
                    self.entry_point_id,
                    spirv::ExecutionMode::OriginUpperLeft,
                    &[],
                );
            }
            ShaderStage::Compute if !self.local_size_emitted => {
                warn!("missing thread group declaration, assuming 64x1x1");
                self.module.put_exec_mode(
                    self.entry_point_id,
                    spirv::ExecutionMode::LocalSize,
                    &[64, 1, 1],
                );
            }
            _ => {}
        }
    }
}

/// Lower a decoded kernel to SPIR-V, collecting binding and interface
/// metadata along the way.
pub fn compile_kernel(kernel: &Kernel, name: &str) -> Shader {
    let mut compiler = Compiler::new(kernel);

    compiler.emit_func();
    for instr in &kernel.instrs {
        compiler.emit_instr(instr);
    }
    compiler.finish_function();
    compiler.emit_entry_point();

    Shader {
        code: compiler.module.finish(),
        bindings: compiler.bindings,
        inputs: compiler.input_meta,
        outputs: compiler.output_meta,
        name: name.to_owned(),
    }
}
