//! Append-only SPIR-V module builder.
//!
//! The builder keeps one growable word buffer per logical SPIR-V section
//! and concatenates them behind a fresh header on [`SpvModule::finish`].
//! Types, constants and capabilities are de-duplicated on insertion so the
//! emitted module satisfies the uniqueness rules of the SPIR-V spec; no
//! other validation happens here. The builder knows nothing about the
//! source IL.

use spirv::Op;

pub type SpvWord = u32;
pub type SpvId = SpvWord;

/// SPIR-V version word of emitted modules (1.0).
pub const SPIRV_VERSION: SpvWord = 0x0001_0000;

const OPCODE_MASK: u32 = 0xFFFF;
const WORD_COUNT_SHIFT: u32 = 16;

/// Logical module sections, in canonical binary order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    Capabilities = 0,
    Extensions,
    ExtInstImports,
    MemoryModel,
    EntryPoints,
    ExecModes,
    DebugNames,
    Decorations,
    Types,
    Variables,
    Code,
}

const SECTION_COUNT: usize = 11;

const SECTION_ORDER: [Section; SECTION_COUNT] = [
    Section::Capabilities,
    Section::Extensions,
    Section::ExtInstImports,
    Section::MemoryModel,
    Section::EntryPoints,
    Section::ExecModes,
    Section::DebugNames,
    Section::Decorations,
    Section::Types,
    Section::Variables,
    Section::Code,
];

/// Classify an opcode by the section its instruction belongs to. Used when
/// re-sectioning an existing module.
pub fn section_of_op(opcode: u32) -> Section {
    let op = opcode & OPCODE_MASK;
    if op == Op::Capability as u32 {
        Section::Capabilities
    } else if op == Op::Extension as u32 {
        Section::Extensions
    } else if op == Op::ExtInstImport as u32 {
        Section::ExtInstImports
    } else if op == Op::MemoryModel as u32 {
        Section::MemoryModel
    } else if op == Op::EntryPoint as u32 {
        Section::EntryPoints
    } else if op == Op::ExecutionMode as u32 || op == Op::ExecutionModeId as u32 {
        Section::ExecModes
    } else if op == Op::String as u32
        || op == Op::Source as u32
        || op == Op::SourceContinued as u32
        || op == Op::SourceExtension as u32
        || op == Op::Name as u32
        || op == Op::MemberName as u32
        || op == Op::ModuleProcessed as u32
    {
        Section::DebugNames
    } else if op == Op::Decorate as u32
        || op == Op::MemberDecorate as u32
        || op == Op::DecorationGroup as u32
        || op == Op::GroupDecorate as u32
        || op == Op::GroupMemberDecorate as u32
    {
        Section::Decorations
    } else if (op >= Op::TypeVoid as u32 && op <= Op::TypeForwardPointer as u32)
        || (op >= Op::ConstantTrue as u32 && op <= Op::SpecConstantOp as u32)
        || op == Op::Undef as u32
    {
        Section::Types
    } else if op == Op::Variable as u32 {
        Section::Variables
    } else {
        Section::Code
    }
}

fn opcode_word(op: Op, word_count: usize) -> SpvWord {
    (op as u32 & OPCODE_MASK) | ((word_count as u32) << WORD_COUNT_SHIFT)
}

/// Pack a string as nul-terminated little-endian words.
fn string_words(s: &str) -> Vec<SpvWord> {
    let mut words = Vec::with_capacity(s.len() / 4 + 1);
    let mut word = 0u32;
    for (i, b) in s.bytes().enumerate() {
        word |= (b as u32) << (8 * (i % 4));
        if i % 4 == 3 {
            words.push(word);
            word = 0;
        }
    }
    // The trailing word holds the nul terminator.
    words.push(word);
    words
}

/// A SPIR-V module under construction.
pub struct SpvModule {
    current_id: SpvId,
    glsl450_import_id: SpvId,
    buffers: [Vec<SpvWord>; SECTION_COUNT],
}

impl SpvModule {
    /// A module preloaded with the standard preamble: the `Shader`
    /// capability, the GLSL.std.450 import at id 1 and the
    /// Logical/GLSL450 memory model.
    pub fn new() -> Self {
        let mut module = SpvModule::new_empty();
        module.current_id = 1;
        module.glsl450_import_id = module.alloc_id();

        module.put_capability(spirv::Capability::Shader);
        module.put_ext_inst_import(module.glsl450_import_id, "GLSL.std.450");
        module.put_memory_model(spirv::AddressingModel::Logical, spirv::MemoryModel::GLSL450);
        module
    }

    /// A bare module with no preamble and the id counter at zero. Used when
    /// re-sectioning an existing module.
    pub fn new_empty() -> Self {
        SpvModule {
            current_id: 0,
            glsl450_import_id: 0,
            buffers: Default::default(),
        }
    }

    pub fn alloc_id(&mut self) -> SpvId {
        let id = self.current_id;
        self.current_id += 1;
        id
    }

    /// Raise the id counter to `id` if it is below it.
    pub fn observe_id(&mut self, id: SpvId) {
        if self.current_id < id {
            self.current_id = id;
        }
    }

    /// Skip a block of ids, leaving a collision margin.
    pub fn skip_ids(&mut self, count: SpvId) {
        self.current_id += count;
    }

    pub fn glsl450_import_id(&self) -> SpvId {
        self.glsl450_import_id
    }

    fn buf(&mut self, section: Section) -> &mut Vec<SpvWord> {
        &mut self.buffers[section as usize]
    }

    pub fn section_words(&self, section: Section) -> &[SpvWord] {
        &self.buffers[section as usize]
    }

    /// Append raw instruction words to a section.
    pub fn push_raw(&mut self, section: Section, words: &[SpvWord]) {
        self.buf(section).extend_from_slice(words);
    }

    fn put_instr(&mut self, section: Section, op: Op, operands: &[SpvWord]) {
        let buffer = self.buf(section);
        buffer.push(opcode_word(op, 1 + operands.len()));
        buffer.extend_from_slice(operands);
    }

    // Preamble.

    pub fn put_capability(&mut self, capability: spirv::Capability) {
        let buffer = self.buf(Section::Capabilities);
        // Capability instructions are two words each.
        for chunk in buffer.chunks_exact(2) {
            if chunk[1] == capability as u32 {
                return;
            }
        }
        self.put_instr(Section::Capabilities, Op::Capability, &[capability as u32]);
    }

    fn put_ext_inst_import(&mut self, id: SpvId, name: &str) {
        let mut operands = vec![id];
        operands.extend(string_words(name));
        self.put_instr(Section::ExtInstImports, Op::ExtInstImport, &operands);
    }

    fn put_memory_model(
        &mut self,
        addressing: spirv::AddressingModel,
        memory: spirv::MemoryModel,
    ) {
        self.put_instr(
            Section::MemoryModel,
            Op::MemoryModel,
            &[addressing as u32, memory as u32],
        );
    }

    pub fn put_entry_point(
        &mut self,
        exec_model: spirv::ExecutionModel,
        id: SpvId,
        name: &str,
        interfaces: &[SpvId],
    ) {
        let mut operands = vec![exec_model as u32, id];
        operands.extend(string_words(name));
        operands.extend_from_slice(interfaces);
        self.put_instr(Section::EntryPoints, Op::EntryPoint, &operands);
    }

    pub fn put_exec_mode(&mut self, id: SpvId, exec_mode: spirv::ExecutionMode, args: &[SpvWord]) {
        let mut operands = vec![id, exec_mode as u32];
        operands.extend_from_slice(args);
        self.put_instr(Section::ExecModes, Op::ExecutionMode, &operands);
    }

    // Debug names and annotations.

    pub fn put_name(&mut self, target: SpvId, name: &str) {
        let mut operands = vec![target];
        operands.extend(string_words(name));
        self.put_instr(Section::DebugNames, Op::Name, &operands);
    }

    pub fn put_decoration(&mut self, target: SpvId, decoration: spirv::Decoration, args: &[SpvWord]) {
        let mut operands = vec![target, decoration as u32];
        operands.extend_from_slice(args);
        self.put_instr(Section::Decorations, Op::Decorate, &operands);
    }

    pub fn put_member_decoration(
        &mut self,
        target: SpvId,
        member: u32,
        decoration: spirv::Decoration,
        args: &[SpvWord],
    ) {
        let mut operands = vec![target, member, decoration as u32];
        operands.extend_from_slice(args);
        self.put_instr(Section::Decorations, Op::MemberDecorate, &operands);
    }

    // Types and constants. Each concrete type or constant is materialized
    // at most once; repeated requests return the existing id.

    fn find_in_types(&self, op: Op, result_idx: usize, operands: &[SpvWord]) -> Option<SpvId> {
        let buffer = &self.buffers[Section::Types as usize];
        let mut i = 0;
        while i < buffer.len() {
            let word_count = (buffer[i] >> WORD_COUNT_SHIFT) as usize;
            debug_assert!(word_count > 0);
            if buffer[i] & OPCODE_MASK == op as u32 && word_count == 1 + operands.len() + 1 {
                let mut match_ = true;
                let mut operand_idx = 0;
                for j in 0..operands.len() + 1 {
                    if j == result_idx {
                        continue;
                    }
                    if buffer[i + 1 + j] != operands[operand_idx] {
                        match_ = false;
                        break;
                    }
                    operand_idx += 1;
                }
                if match_ {
                    return Some(buffer[i + 1 + result_idx]);
                }
            }
            i += word_count;
        }
        None
    }

    fn put_type(&mut self, op: Op, args: &[SpvWord]) -> SpvId {
        // Type instructions carry their result id first.
        if let Some(id) = self.find_in_types(op, 0, args) {
            return id;
        }
        let id = self.alloc_id();
        let mut operands = vec![id];
        operands.extend_from_slice(args);
        self.put_instr(Section::Types, op, &operands);
        id
    }

    pub fn put_void_type(&mut self) -> SpvId {
        self.put_type(Op::TypeVoid, &[])
    }

    pub fn put_bool_type(&mut self) -> SpvId {
        self.put_type(Op::TypeBool, &[])
    }

    pub fn put_int_type(&mut self, signed: bool) -> SpvId {
        self.put_type(Op::TypeInt, &[32, signed as u32])
    }

    pub fn put_float_type(&mut self) -> SpvId {
        self.put_type(Op::TypeFloat, &[32])
    }

    pub fn put_vector_type(&mut self, elem_type_id: SpvId, count: u32) -> SpvId {
        self.put_type(Op::TypeVector, &[elem_type_id, count])
    }

    pub fn put_pointer_type(
        &mut self,
        storage_class: spirv::StorageClass,
        elem_type_id: SpvId,
    ) -> SpvId {
        self.put_type(Op::TypePointer, &[storage_class as u32, elem_type_id])
    }

    pub fn put_function_type(&mut self, return_type_id: SpvId, arg_type_ids: &[SpvId]) -> SpvId {
        let mut args = vec![return_type_id];
        args.extend_from_slice(arg_type_ids);
        self.put_type(Op::TypeFunction, &args)
    }

    pub fn put_array_type(&mut self, elem_type_id: SpvId, length_id: SpvId) -> SpvId {
        self.put_type(Op::TypeArray, &[elem_type_id, length_id])
    }

    pub fn put_runtime_array_type(&mut self, elem_type_id: SpvId) -> SpvId {
        self.put_type(Op::TypeRuntimeArray, &[elem_type_id])
    }

    pub fn put_struct_type(&mut self, member_type_ids: &[SpvId]) -> SpvId {
        self.put_type(Op::TypeStruct, member_type_ids)
    }

    pub fn put_sampler_type(&mut self) -> SpvId {
        self.put_type(Op::TypeSampler, &[])
    }

    #[allow(clippy::too_many_arguments)]
    pub fn put_image_type(
        &mut self,
        sampled_type_id: SpvId,
        dim: spirv::Dim,
        depth: u32,
        arrayed: u32,
        ms: u32,
        sampled: u32,
        format: spirv::ImageFormat,
    ) -> SpvId {
        self.put_type(
            Op::TypeImage,
            &[
                sampled_type_id,
                dim as u32,
                depth,
                arrayed,
                ms,
                sampled,
                format as u32,
            ],
        )
    }

    pub fn put_sampled_image_type(&mut self, image_type_id: SpvId) -> SpvId {
        self.put_type(Op::TypeSampledImage, &[image_type_id])
    }

    /// Materialize a 32-bit scalar constant, once per `(type, bit pattern)`.
    pub fn put_constant(&mut self, type_id: SpvId, value: SpvWord) -> SpvId {
        // Constants carry their result id second, after the type.
        if let Some(id) = self.find_in_types(Op::Constant, 1, &[type_id, value]) {
            return id;
        }
        let id = self.alloc_id();
        self.put_instr(Section::Types, Op::Constant, &[type_id, id, value]);
        id
    }

    pub fn put_constant_composite(&mut self, type_id: SpvId, constituents: &[SpvId]) -> SpvId {
        let mut args = vec![type_id];
        args.extend_from_slice(constituents);
        if let Some(id) = self.find_in_types(Op::ConstantComposite, 1, &args) {
            return id;
        }
        let id = self.alloc_id();
        let mut operands = vec![type_id, id];
        operands.extend_from_slice(constituents);
        self.put_instr(Section::Types, Op::ConstantComposite, &operands);
        id
    }

    // Global variables.

    pub fn put_variable(
        &mut self,
        pointer_type_id: SpvId,
        storage_class: spirv::StorageClass,
    ) -> SpvId {
        let id = self.alloc_id();
        self.put_instr(
            Section::Variables,
            Op::Variable,
            &[pointer_type_id, id, storage_class as u32],
        );
        id
    }

    pub fn put_variable_with_initializer(
        &mut self,
        pointer_type_id: SpvId,
        storage_class: spirv::StorageClass,
        initializer_id: SpvId,
    ) -> SpvId {
        let id = self.alloc_id();
        self.put_instr(
            Section::Variables,
            Op::Variable,
            &[pointer_type_id, id, storage_class as u32, initializer_id],
        );
        id
    }

    // Function body.

    pub fn put_function(
        &mut self,
        result_type_id: SpvId,
        id: SpvId,
        control: spirv::FunctionControl,
        function_type_id: SpvId,
    ) {
        self.put_instr(
            Section::Code,
            Op::Function,
            &[result_type_id, id, control.bits(), function_type_id],
        );
    }

    pub fn put_function_end(&mut self) {
        self.put_instr(Section::Code, Op::FunctionEnd, &[]);
    }

    pub fn put_label(&mut self) -> SpvId {
        let id = self.alloc_id();
        self.put_label_id(id);
        id
    }

    pub fn put_label_id(&mut self, id: SpvId) {
        self.put_instr(Section::Code, Op::Label, &[id]);
    }

    pub fn put_return(&mut self) {
        self.put_instr(Section::Code, Op::Return, &[]);
    }

    pub fn put_kill(&mut self) {
        self.put_instr(Section::Code, Op::Kill, &[]);
    }

    pub fn put_branch(&mut self, target_id: SpvId) {
        self.put_instr(Section::Code, Op::Branch, &[target_id]);
    }

    pub fn put_branch_conditional(
        &mut self,
        condition_id: SpvId,
        true_label_id: SpvId,
        false_label_id: SpvId,
    ) {
        self.put_instr(
            Section::Code,
            Op::BranchConditional,
            &[condition_id, true_label_id, false_label_id],
        );
    }

    pub fn put_selection_merge(&mut self, merge_block_id: SpvId) {
        self.put_instr(
            Section::Code,
            Op::SelectionMerge,
            &[merge_block_id, spirv::SelectionControl::NONE.bits()],
        );
    }

    pub fn put_loop_merge(&mut self, merge_block_id: SpvId, continue_target_id: SpvId) {
        self.put_instr(
            Section::Code,
            Op::LoopMerge,
            &[merge_block_id, continue_target_id, spirv::LoopControl::NONE.bits()],
        );
    }

    pub fn put_emit_vertex(&mut self) {
        self.put_instr(Section::Code, Op::EmitVertex, &[]);
    }

    pub fn put_end_primitive(&mut self) {
        self.put_instr(Section::Code, Op::EndPrimitive, &[]);
    }

    /// Emit an instruction with a result id and arbitrary id operands.
    pub fn put_op(&mut self, op: Op, result_type_id: SpvId, operands: &[SpvId]) -> SpvId {
        let id = self.alloc_id();
        let mut words = vec![result_type_id, id];
        words.extend_from_slice(operands);
        self.put_instr(Section::Code, op, &words);
        id
    }

    pub fn put_op1(&mut self, op: Op, result_type_id: SpvId, a: SpvId) -> SpvId {
        self.put_op(op, result_type_id, &[a])
    }

    pub fn put_op2(&mut self, op: Op, result_type_id: SpvId, a: SpvId, b: SpvId) -> SpvId {
        self.put_op(op, result_type_id, &[a, b])
    }

    pub fn put_op3(
        &mut self,
        op: Op,
        result_type_id: SpvId,
        a: SpvId,
        b: SpvId,
        c: SpvId,
    ) -> SpvId {
        self.put_op(op, result_type_id, &[a, b, c])
    }

    /// Emit an instruction without a result, e.g. `OpImageWrite` or a
    /// barrier.
    pub fn put_op_no_result(&mut self, op: Op, operands: &[SpvId]) {
        self.put_instr(Section::Code, op, operands);
    }

    pub fn put_access_chain(
        &mut self,
        pointer_type_id: SpvId,
        base_id: SpvId,
        indices: &[SpvId],
    ) -> SpvId {
        let id = self.alloc_id();
        let mut operands = vec![pointer_type_id, id, base_id];
        operands.extend_from_slice(indices);
        self.put_instr(Section::Code, Op::AccessChain, &operands);
        id
    }

    pub fn put_load(&mut self, result_type_id: SpvId, pointer_id: SpvId) -> SpvId {
        self.put_op1(Op::Load, result_type_id, pointer_id)
    }

    pub fn put_store(&mut self, pointer_id: SpvId, object_id: SpvId) {
        self.put_instr(Section::Code, Op::Store, &[pointer_id, object_id]);
    }

    pub fn put_select(
        &mut self,
        result_type_id: SpvId,
        condition_id: SpvId,
        a: SpvId,
        b: SpvId,
    ) -> SpvId {
        self.put_op3(Op::Select, result_type_id, condition_id, a, b)
    }

    pub fn put_composite_extract(
        &mut self,
        result_type_id: SpvId,
        composite_id: SpvId,
        indices: &[u32],
    ) -> SpvId {
        let id = self.alloc_id();
        let mut operands = vec![result_type_id, id, composite_id];
        operands.extend_from_slice(indices);
        self.put_instr(Section::Code, Op::CompositeExtract, &operands);
        id
    }

    pub fn put_composite_construct(
        &mut self,
        result_type_id: SpvId,
        constituents: &[SpvId],
    ) -> SpvId {
        self.put_op(Op::CompositeConstruct, result_type_id, constituents)
    }

    pub fn put_vector_shuffle(
        &mut self,
        result_type_id: SpvId,
        vector1_id: SpvId,
        vector2_id: SpvId,
        components: &[u32],
    ) -> SpvId {
        let id = self.alloc_id();
        let mut operands = vec![result_type_id, id, vector1_id, vector2_id];
        operands.extend_from_slice(components);
        self.put_instr(Section::Code, Op::VectorShuffle, &operands);
        id
    }

    pub fn put_bitcast(&mut self, result_type_id: SpvId, operand_id: SpvId) -> SpvId {
        self.put_op1(Op::Bitcast, result_type_id, operand_id)
    }

    /// Emit an extended GLSL.std.450 instruction.
    pub fn put_glsl_op(
        &mut self,
        glsl_op: spirv::GLOp,
        result_type_id: SpvId,
        args: &[SpvId],
    ) -> SpvId {
        let id = self.alloc_id();
        let mut operands = vec![result_type_id, id, self.glsl450_import_id, glsl_op as u32];
        operands.extend_from_slice(args);
        self.put_instr(Section::Code, Op::ExtInst, &operands);
        id
    }

    /// Write the header and concatenate all sections in canonical order.
    pub fn finish(self) -> Vec<SpvWord> {
        let total: usize = self.buffers.iter().map(|b| b.len()).sum();
        let mut words = Vec::with_capacity(5 + total);

        words.push(spirv::MAGIC_NUMBER);
        words.push(SPIRV_VERSION);
        words.push(0); // generator
        words.push(self.current_id); // id bound
        words.push(0); // reserved

        for section in SECTION_ORDER {
            words.extend_from_slice(&self.buffers[section as usize]);
        }
        words
    }
}

impl Default for SpvModule {
    fn default() -> Self {
        SpvModule::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_type_uniqueness() {
        let mut module = SpvModule::new();
        let float_id = module.put_float_type();
        let vec4_id = module.put_vector_type(float_id, 4);
        assert_eq!(module.put_float_type(), float_id);
        assert_eq!(module.put_vector_type(float_id, 4), vec4_id);
        assert_ne!(module.put_vector_type(float_id, 3), vec4_id);
        assert_eq!(module.put_void_type(), module.put_void_type());

        // Scan the types section: each concrete type instruction at most
        // once.
        let types = module.section_words(Section::Types).to_vec();
        let mut seen = Vec::<Vec<u32>>::new();
        let mut i = 0;
        while i < types.len() {
            let word_count = (types[i] >> 16) as usize;
            // Strip the result id so identical types compare equal.
            let mut key = vec![types[i]];
            key.extend_from_slice(&types[i + 2..i + word_count]);
            assert!(!seen.contains(&key), "duplicate type: {:?}", key);
            seen.push(key);
            i += word_count;
        }
    }

    #[test]
    fn test_id_monotonicity() {
        let mut module = SpvModule::new();
        let mut last = 1; // GLSL.std.450 import reservation
        for _ in 0..64 {
            let id = module.alloc_id();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn test_capability_uniqueness() {
        let mut module = SpvModule::new();
        module.put_capability(spirv::Capability::Geometry);
        module.put_capability(spirv::Capability::Geometry);
        module.put_capability(spirv::Capability::Shader); // preamble default
        let caps = module.section_words(Section::Capabilities);
        let count = caps
            .chunks_exact(2)
            .filter(|c| c[1] == spirv::Capability::Geometry as u32)
            .count();
        assert_eq!(count, 1);
        assert_eq!(caps.len(), 4); // Shader + Geometry
    }

    #[test]
    fn test_constant_dedup() {
        let mut module = SpvModule::new();
        let float_id = module.put_float_type();
        let one = module.put_constant(float_id, 0x3F80_0000);
        assert_eq!(module.put_constant(float_id, 0x3F80_0000), one);
        assert_ne!(module.put_constant(float_id, 0), one);

        let vec4_id = module.put_vector_type(float_id, 4);
        let ones = module.put_constant_composite(vec4_id, &[one, one, one, one]);
        assert_eq!(module.put_constant_composite(vec4_id, &[one, one, one, one]), ones);
    }

    #[test]
    fn test_finish_layout() {
        let mut module = SpvModule::new();
        let void_id = module.put_void_type();
        let fn_type_id = module.put_function_type(void_id, &[]);
        let fn_id = module.alloc_id();
        module.put_function(void_id, fn_id, spirv::FunctionControl::NONE, fn_type_id);
        module.put_label();
        module.put_return();
        module.put_function_end();
        module.put_entry_point(spirv::ExecutionModel::Vertex, fn_id, "main", &[]);

        let bound = fn_id + 2; // fn id, label
        let words = module.finish();
        assert_eq!(words[0], 0x0723_0203);
        assert_eq!(words[1], SPIRV_VERSION);
        assert_eq!(words[3], bound);
        assert_eq!(words[4], 0);

        // Sections appear in canonical order.
        let mut last_section = Section::Capabilities;
        let mut i = 5;
        while i < words.len() {
            let word_count = (words[i] >> 16) as usize;
            let section = section_of_op(words[i]);
            assert!(section >= last_section, "section order violated");
            last_section = section;
            i += word_count;
        }
        assert_eq!(i, words.len());
    }

    #[test]
    fn test_string_packing() {
        // Four characters need a second word for the terminator.
        assert_eq!(string_words("main"), vec![0x6E69616D, 0]);
        assert_eq!(string_words("abc"), vec![0x00636261]);
    }
}
