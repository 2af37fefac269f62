//! Passthrough recompilation of finished SPIR-V modules.
//!
//! Rewrites a module so extra input locations are consumed and copied to
//! matching outputs right before the entry point returns. Used to keep
//! stage interfaces continuous when a geometry or tessellation stage is
//! synthesized between existing shaders.

use log::warn;
use num_traits::FromPrimitive;

use ilc_core::error::{bail, Result};
use ilc_spv::{section_of_op, Section, SpvId, SpvModule};
use spirv::Op;

use crate::RecompiledShader;

/// Safety margin added past the highest id observed in the source module.
const ID_COLLISION_MARGIN: u32 = 65536;

/// Read a nul-terminated string operand. Returns the string and the
/// number of words it occupies.
fn read_string(words: &[u32]) -> Result<(String, usize)> {
    let mut bytes = Vec::new();
    for (i, word) in words.iter().enumerate() {
        for byte in word.to_le_bytes() {
            if byte == 0 {
                let text = String::from_utf8(bytes)?;
                return Ok((text, i + 1));
            }
            bytes.push(byte);
        }
    }
    bail!("string operand is not nul-terminated");
}

struct EntryPointInfo {
    exec_model: u32,
    id: SpvId,
    name: String,
    interfaces: Vec<SpvId>,
}

/// Find the `Location` decoration of `id`, scanning the annotation words.
fn find_location(decorations: &[u32], id: SpvId) -> Option<u32> {
    find_decoration(decorations, id, spirv::Decoration::Location)
}

fn find_decoration(decorations: &[u32], id: SpvId, decoration: spirv::Decoration) -> Option<u32> {
    let mut i = 0;
    while i < decorations.len() {
        let word_count = (decorations[i] >> 16) as usize;
        if word_count == 0 {
            return None;
        }
        if decorations[i] & 0xFFFF == Op::Decorate as u32
            && word_count >= 4
            && decorations[i + 1] == id
            && decorations[i + 2] == decoration as u32
        {
            return Some(decorations[i + 3]);
        }
        i += word_count;
    }
    None
}

pub fn recompile_module(
    words: &[u32],
    passthrough_locations: &[u32],
) -> Result<RecompiledShader> {
    if words.len() < 5 || words[0] != spirv::MAGIC_NUMBER {
        bail!("input is not a SPIR-V module");
    }

    let mut module = SpvModule::new_empty();
    let mut entry_point: Option<EntryPointInfo> = None;
    let mut input_var_ids = Vec::<SpvId>::new();
    let mut output_points_count = 0u32;
    let mut in_function = false;

    let mut i = 5;
    while i < words.len() {
        let opcode = words[i] & 0xFFFF;
        let word_count = (words[i] >> 16) as usize;
        if word_count == 0 || i + word_count > words.len() {
            bail!("input module is truncated");
        }
        let instr = &words[i..i + word_count];
        i += word_count;

        let section = section_of_op(opcode);
        match section {
            Section::Types => {
                module.observe_id(instr[1] + 1);
            }
            Section::EntryPoints => {
                if opcode == Op::EntryPoint as u32 {
                    let (name, name_words) = read_string(&instr[3..])?;
                    entry_point = Some(EntryPointInfo {
                        exec_model: instr[1],
                        id: instr[2],
                        name,
                        interfaces: instr[3 + name_words..].to_vec(),
                    });
                    module.observe_id(instr[2] + 1);
                }
                // The entry point is rewritten at the end, not copied.
                continue;
            }
            Section::ExecModes => {
                if opcode == Op::ExecutionMode as u32
                    && instr[2] == spirv::ExecutionMode::OutputVertices as u32
                {
                    output_points_count = instr[3];
                }
            }
            Section::Variables => {
                module.observe_id(instr[2] + 1);
                if instr[3] == spirv::StorageClass::Input as u32 {
                    input_var_ids.push(instr[2]);
                }
            }
            Section::Code => {
                match Op::from_u32(opcode) {
                    Some(Op::Function) => {
                        module.observe_id(instr[2] + 1);
                        if let Some(entry_point) = &entry_point {
                            if instr[2] == entry_point.id {
                                in_function = true;
                            }
                        }
                    }
                    Some(Op::Label) => module.observe_id(instr[1] + 1),
                    Some(Op::Load) | Some(Op::AccessChain) => module.observe_id(instr[2] + 1),
                    Some(Op::Return) if in_function => {
                        // Resume here with the passthrough stores; the
                        // return is re-emitted afterwards.
                        break;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        module.push_raw(section, instr);
    }

    let mut entry_point = match entry_point {
        Some(entry_point) => entry_point,
        None => bail!("input module has no entry point"),
    };
    let exec_model = match spirv::ExecutionModel::from_u32(entry_point.exec_model) {
        Some(exec_model) => exec_model,
        None => bail!("unsupported execution model {}", entry_point.exec_model),
    };

    module.skip_ids(ID_COLLISION_MARGIN);

    // Existing inputs by location, and the invocation-id built-in if the
    // module already declares one.
    let decorations = module.section_words(Section::Decorations).to_vec();
    let mut existing_inputs = Vec::<(SpvId, u32)>::new();
    let mut invocation_var_id = 0;
    for &var_id in &input_var_ids {
        if let Some(location) = find_location(&decorations, var_id) {
            existing_inputs.push((var_id, location));
        } else if find_decoration(&decorations, var_id, spirv::Decoration::BuiltIn)
            == Some(spirv::BuiltIn::InvocationId as u32)
        {
            invocation_var_id = var_id;
        }
    }

    let float_id = module.put_float_type();
    let float4_id = module.put_vector_type(float_id, 4);
    let float4_input_ptr_id = module.put_pointer_type(spirv::StorageClass::Input, float4_id);
    let float4_output_ptr_id = module.put_pointer_type(spirv::StorageClass::Output, float4_id);

    if exec_model == spirv::ExecutionModel::TessellationControl {
        let int_id = module.put_int_type(true);

        if invocation_var_id == 0 {
            let int_ptr_input_id = module.put_pointer_type(spirv::StorageClass::Input, int_id);
            invocation_var_id = module.put_variable(int_ptr_input_id, spirv::StorageClass::Input);
            module.put_decoration(
                invocation_var_id,
                spirv::Decoration::BuiltIn,
                &[spirv::BuiltIn::InvocationId as u32],
            );
            module.put_name(invocation_var_id, "invocationId");
            entry_point.interfaces.push(invocation_var_id);
        }

        let max_location = passthrough_locations
            .iter()
            .chain(existing_inputs.iter().map(|(_, location)| location))
            .max()
            .copied();

        if let Some(max_location) = max_location {
            let register_count = max_location + 1;
            if output_points_count == 0 {
                warn!("missing output control point count, assuming 3");
                output_points_count = 3;
            }
            let vertex_length_id = module.put_constant(int_id, output_points_count);

            // Inputs are per-vertex arrays of the patch size.
            let input_arr_type_id = module.put_array_type(float4_id, vertex_length_id);
            let input_var_type_id =
                module.put_pointer_type(spirv::StorageClass::Input, input_arr_type_id);

            // Outputs are registers per vertex, arrayed over the patch.
            let output_length_id = module.put_constant(int_id, register_count);
            let output_arr_type_id = module.put_array_type(float4_id, output_length_id);
            let output_varr_type_id = module.put_array_type(output_arr_type_id, vertex_length_id);
            let output_varr_ptr_type_id =
                module.put_pointer_type(spirv::StorageClass::Output, output_varr_type_id);
            let output_varr_id =
                module.put_variable(output_varr_ptr_type_id, spirv::StorageClass::Output);
            module.put_name(output_varr_id, "vertex_out");
            module.put_decoration(output_varr_id, spirv::Decoration::Location, &[0]);
            entry_point.interfaces.push(output_varr_id);

            for &location in passthrough_locations {
                let existing = existing_inputs
                    .iter()
                    .find(|(_, l)| *l == location)
                    .map(|(id, _)| *id);
                let input_var_id = match existing {
                    Some(id) => id,
                    None => {
                        let id = module.put_variable(input_var_type_id, spirv::StorageClass::Input);
                        module.put_name(id, &format!("vicp_patched{}", location));
                        module.put_decoration(id, spirv::Decoration::Location, &[location]);
                        entry_point.interfaces.push(id);
                        id
                    }
                };

                let input_index_id = module.put_constant(int_id, location);
                let invocation_value_id = module.put_load(int_id, invocation_var_id);

                let input_ptr_id = module.put_access_chain(
                    float4_input_ptr_id,
                    input_var_id,
                    &[invocation_value_id],
                );
                let loaded_input_id = module.put_load(float4_id, input_ptr_id);
                let dst_id = module.put_access_chain(
                    float4_output_ptr_id,
                    output_varr_id,
                    &[invocation_value_id, input_index_id],
                );
                module.put_store(dst_id, loaded_input_id);
            }
        }
    } else {
        for &location in passthrough_locations {
            if existing_inputs.iter().any(|(_, l)| *l == location) {
                // Already consumed by the module, nothing to forward.
                continue;
            }
            let input_var_id = module.put_variable(float4_input_ptr_id, spirv::StorageClass::Input);
            let output_var_id =
                module.put_variable(float4_output_ptr_id, spirv::StorageClass::Output);
            module.put_decoration(input_var_id, spirv::Decoration::Location, &[location]);
            module.put_decoration(output_var_id, spirv::Decoration::Location, &[location]);

            let value_id = module.put_load(float4_id, input_var_id);
            module.put_store(output_var_id, value_id);

            entry_point.interfaces.push(output_var_id);
            entry_point.interfaces.push(input_var_id);
        }
    }

    module.put_return();
    module.put_function_end();
    module.put_entry_point(
        exec_model,
        entry_point.id,
        &entry_point.name,
        &entry_point.interfaces,
    );

    Ok(RecompiledShader {
        code: module.finish(),
    })
}
