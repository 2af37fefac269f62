//! Rectangle geometry shader synthesis.
//!
//! Rectangle-list primitives reach the pipeline as a single triangle; the
//! synthesized geometry shader reconstructs the missing fourth vertex by
//! classifying each input vertex as an edge or corner vertex and
//! interpolating with barycentric weights -1/+1, then emits the full
//! 4-vertex triangle strip.

use ilc_core::il::InterpMode;
use ilc_spv::{SpvId, SpvModule};
use spirv::Op;

use crate::{Shader, ShaderInput};

const ONE_LITERAL: u32 = 0x3F800000;
const MINUS_ONE_LITERAL: u32 = 0xBF800000;

fn interpolate_to_last_point(
    module: &mut SpvModule,
    res_type_id: SpvId,
    barycentric_coords: &[SpvId; 3],
    inputs: &[SpvId; 3],
) -> SpvId {
    let term_ids = [
        module.put_op2(Op::VectorTimesScalar, res_type_id, inputs[0], barycentric_coords[0]),
        module.put_op2(Op::VectorTimesScalar, res_type_id, inputs[1], barycentric_coords[1]),
        module.put_op2(Op::VectorTimesScalar, res_type_id, inputs[2], barycentric_coords[2]),
    ];

    let res_id = module.put_op2(Op::FAdd, res_type_id, term_ids[0], term_ids[1]);
    module.put_op2(Op::FAdd, res_type_id, res_id, term_ids[2])
}

#[allow(clippy::too_many_arguments)]
fn emit_strip_function(
    module: &mut SpvModule,
    output_position_var_id: SpvId,
    input_position_var_id: SpvId,
    buffer_storage_class: spirv::StorageClass,
    output_ids: &[SpvId],
    output_interp_modes: &[InterpMode],
    output_buffer_ids: &[SpvId],
) -> SpvId {
    let void_type_id = module.put_void_type();
    let func_type_id = module.put_function_type(void_type_id, &[]);

    let func_id = module.alloc_id();
    module.put_function(void_type_id, func_id, spirv::FunctionControl::NONE, func_type_id);
    module.put_label();

    let uint_type_id = module.put_int_type(false);
    let float_id = module.put_float_type();
    let float4_id = module.put_vector_type(float_id, 4);
    let float4_ptr_id = module.put_pointer_type(buffer_storage_class, float4_id);

    let counter_ids = [
        module.put_constant(uint_type_id, 0),
        module.put_constant(uint_type_id, 1),
        module.put_constant(uint_type_id, 2),
        module.put_constant(uint_type_id, 3),
    ];

    // Load the three incoming positions.
    let mut position_elements = [0 as SpvId; 4];
    for i in 0..3 {
        let ptr_id =
            module.put_access_chain(float4_ptr_id, input_position_var_id, &[counter_ids[i]]);
        position_elements[i] = module.put_load(float4_id, ptr_id);
    }

    let mut positions_x = [0 as SpvId; 3];
    let mut positions_y = [0 as SpvId; 3];
    for i in 0..3 {
        positions_x[i] = module.put_composite_extract(float_id, position_elements[i], &[0]);
        positions_y[i] = module.put_composite_extract(float_id, position_elements[i], &[1]);
    }

    // Classify vertices by pairwise coordinate equality and pick the
    // barycentric weight of each.
    let bool_type_id = module.put_bool_type();
    let f_one_id = module.put_constant(float_id, ONE_LITERAL);
    let f_minus_one_id = module.put_constant(float_id, MINUS_ONE_LITERAL);

    let mut point_coord_equal_x = [0 as SpvId; 3];
    let mut point_coord_equal_y = [0 as SpvId; 3];
    for i in 0..3 {
        point_coord_equal_x[i] = module.put_op2(
            Op::FOrdEqual,
            bool_type_id,
            positions_x[i],
            positions_x[(i + 1) % 3],
        );
        point_coord_equal_y[i] = module.put_op2(
            Op::FOrdEqual,
            bool_type_id,
            positions_y[i],
            positions_y[(i + 1) % 3],
        );
    }

    let mut is_edge_vertex = [0 as SpvId; 3];
    let mut barycentric_coords = [0 as SpvId; 3];
    for i in 0..3 {
        let xy_equal = module.put_op2(
            Op::LogicalAnd,
            bool_type_id,
            point_coord_equal_x[i],
            point_coord_equal_y[(i + 2) % 3],
        );
        let yx_equal = module.put_op2(
            Op::LogicalAnd,
            bool_type_id,
            point_coord_equal_y[i],
            point_coord_equal_x[(i + 2) % 3],
        );
        is_edge_vertex[i] = module.put_op2(Op::LogicalOr, bool_type_id, xy_equal, yx_equal);
        barycentric_coords[i] =
            module.put_select(float_id, is_edge_vertex[i], f_minus_one_id, f_one_id);
    }

    let positions = [position_elements[0], position_elements[1], position_elements[2]];
    position_elements[3] =
        interpolate_to_last_point(module, float4_id, &barycentric_coords, &positions);

    // Start the strip on the first non-edge vertex.
    let mut vertex_index_id =
        module.put_select(uint_type_id, is_edge_vertex[1], counter_ids[1], counter_ids[0]);
    vertex_index_id =
        module.put_select(uint_type_id, is_edge_vertex[2], counter_ids[2], vertex_index_id);

    for _ in 0..3 {
        let pos_ptr_id =
            module.put_access_chain(float4_ptr_id, input_position_var_id, &[vertex_index_id]);
        let pos_id = module.put_load(float4_id, pos_ptr_id);
        module.put_store(output_position_var_id, pos_id);

        for (j, output_id) in output_ids.iter().enumerate() {
            let index_id = if output_interp_modes[j] == InterpMode::Constant {
                counter_ids[0]
            } else {
                vertex_index_id
            };
            let value_ptr_id =
                module.put_access_chain(float4_ptr_id, output_buffer_ids[j], &[index_id]);
            let value_id = module.put_load(float4_id, value_ptr_id);
            module.put_store(*output_id, value_id);
        }
        module.put_emit_vertex();

        // Advance to the next incoming vertex, wrapping past the last.
        vertex_index_id =
            module.put_op2(Op::IAdd, uint_type_id, vertex_index_id, counter_ids[1]);
        vertex_index_id =
            module.put_op2(Op::UMod, uint_type_id, vertex_index_id, counter_ids[3]);
    }

    // The interpolated fourth vertex.
    module.put_store(output_position_var_id, position_elements[3]);
    for (i, output_id) in output_ids.iter().enumerate() {
        let value_id = if output_interp_modes[i] == InterpMode::Constant {
            let ptr_id =
                module.put_access_chain(float4_ptr_id, output_buffer_ids[i], &[counter_ids[0]]);
            module.put_load(float4_id, ptr_id)
        } else {
            let mut corner_values = [0 as SpvId; 3];
            for (j, corner_value) in corner_values.iter_mut().enumerate() {
                let ptr_id =
                    module.put_access_chain(float4_ptr_id, output_buffer_ids[i], &[counter_ids[j]]);
                *corner_value = module.put_load(float4_id, ptr_id);
            }
            interpolate_to_last_point(module, float4_id, &barycentric_coords, &corner_values)
        };
        module.put_store(*output_id, value_id);
    }
    module.put_emit_vertex();
    module.put_end_primitive();
    module.put_return();
    module.put_function_end();

    func_id
}

/// Build the rectangle-expansion geometry shader for the given
/// pixel-shader inputs.
pub fn compile_rectangle_geometry_shader(passthrough_inputs: &[ShaderInput]) -> Shader {
    let mut module = SpvModule::new();

    let float_id = module.put_float_type();
    let float4_id = module.put_vector_type(float_id, 4);
    let int_id = module.put_int_type(true);

    let length_id = module.put_constant(int_id, 3);
    let float4_arr_id = module.put_array_type(float4_id, length_id);

    let float4_out_ptr_id = module.put_pointer_type(spirv::StorageClass::Output, float4_id);
    let float4_arr_ptr_id = module.put_pointer_type(spirv::StorageClass::Input, float4_arr_id);

    let mut generic_inputs = Vec::with_capacity(passthrough_inputs.len());
    let mut generic_outputs = Vec::with_capacity(passthrough_inputs.len());
    let mut interp_modes = Vec::with_capacity(passthrough_inputs.len());

    for input in passthrough_inputs {
        let input_id = module.put_variable(float4_arr_ptr_id, spirv::StorageClass::Input);
        module.put_decoration(input_id, spirv::Decoration::Location, &[input.location]);
        let output_id = module.put_variable(float4_out_ptr_id, spirv::StorageClass::Output);
        module.put_decoration(output_id, spirv::Decoration::Location, &[input.location]);

        generic_inputs.push(input_id);
        generic_outputs.push(output_id);
        interp_modes.push(input.interp_mode);
    }

    let input_position_var_id = module.put_variable(float4_arr_ptr_id, spirv::StorageClass::Input);
    module.put_name(input_position_var_id, "vInPos");
    let output_position_var_id = module.put_variable(float4_out_ptr_id, spirv::StorageClass::Output);
    module.put_name(output_position_var_id, "vOutPos");
    module.put_decoration(
        input_position_var_id,
        spirv::Decoration::BuiltIn,
        &[spirv::BuiltIn::Position as u32],
    );
    module.put_decoration(
        output_position_var_id,
        spirv::Decoration::BuiltIn,
        &[spirv::BuiltIn::Position as u32],
    );

    let entry_point_id = emit_strip_function(
        &mut module,
        output_position_var_id,
        input_position_var_id,
        spirv::StorageClass::Input,
        &generic_outputs,
        &interp_modes,
        &generic_inputs,
    );

    let mut interfaces = Vec::with_capacity(passthrough_inputs.len() * 2 + 2);
    interfaces.extend_from_slice(&generic_inputs);
    interfaces.extend_from_slice(&generic_outputs);
    interfaces.push(input_position_var_id);
    interfaces.push(output_position_var_id);

    module.put_name(entry_point_id, "main");
    module.put_capability(spirv::Capability::Geometry);
    module.put_exec_mode(entry_point_id, spirv::ExecutionMode::OutputVertices, &[4]);
    module.put_exec_mode(entry_point_id, spirv::ExecutionMode::Invocations, &[1]);
    module.put_exec_mode(entry_point_id, spirv::ExecutionMode::OutputTriangleStrip, &[]);
    module.put_exec_mode(entry_point_id, spirv::ExecutionMode::Triangles, &[]);
    module.put_entry_point(spirv::ExecutionModel::Geometry, entry_point_id, "main", &interfaces);

    Shader {
        code: module.finish(),
        bindings: Vec::new(),
        inputs: Vec::new(),
        outputs: Vec::new(),
        name: String::new(),
    }
}
