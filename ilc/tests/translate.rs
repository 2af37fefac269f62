mod common;

use common::*;
use ilc_core::il::{self, Op};
use pretty_assertions::assert_eq;
use spirv::Op as SpvOp;

const ENDMAIN: u32 = Op::EndMain as u32;
const END: u32 = Op::End as u32;

const VS: u32 = 1;
const PS: u32 = 2;

fn version_token(stage: u32) -> u32 {
    0x0100 | (stage << 16)
}

fn stream(stage: u32, body: &[u32]) -> Vec<u8> {
    let mut tokens = vec![0x00000000, version_token(stage)];
    tokens.extend_from_slice(body);
    to_bytes(&tokens)
}

#[test]
fn test_empty_vertex_shader() {
    // Token stream: language header, version header, endmain, end.
    let il = to_bytes(&[0x00000000, 0x00010000, 0x00000028, 0x0000002A]);
    let shader = ilc::compile_shader(&il).unwrap();

    assert_eq!(shader.code[0], 0x07230203);
    assert!(shader.bindings.is_empty());
    assert!(shader.inputs.is_empty());
    assert!(shader.outputs.is_empty());

    // One entry point: Vertex, named VShader, with an empty interface.
    let entry_points = find_all(&shader.code, SpvOp::EntryPoint);
    assert_eq!(entry_points.len(), 1);
    let entry_point = &entry_points[0];
    assert_eq!(entry_point[0], spirv::ExecutionModel::Vertex as u32);
    let (name, name_words) = read_string(&entry_point[2..]);
    assert_eq!(name, "VShader");
    assert!(entry_point[2 + name_words..].is_empty());

    // Function body: OpLabel; OpReturn; OpFunctionEnd.
    let instrs = instrs(&shader.code);
    let func_at = instrs
        .iter()
        .position(|(opcode, _)| *opcode == SpvOp::Function as u32)
        .unwrap();
    let body: Vec<u32> = instrs[func_at + 1..].iter().map(|(opcode, _)| *opcode).collect();
    assert_eq!(
        body,
        vec![
            SpvOp::Label as u32,
            SpvOp::Return as u32,
            SpvOp::FunctionEnd as u32,
        ]
    );
}

#[test]
fn test_single_input_vertex_shader() {
    // dcl_input_generic_interp(linear) v0
    let control = il::ImportUsage::Generic as u32 | ((il::InterpMode::Linear as u32) << 5);
    let il = stream(
        VS,
        &[
            Op::DclInput as u32 | (control << 16),
            (il::reg::INPUT as u32) << 16,
            ENDMAIN,
            END,
        ],
    );
    let shader = ilc::compile_shader(&il).unwrap();

    // A single input variable of type ptr<Input, vec4>.
    let variables = find_all(&shader.code, SpvOp::Variable);
    assert_eq!(variables.len(), 1);
    let variable = &variables[0];
    assert_eq!(variable[2], spirv::StorageClass::Input as u32);
    let var_id = variable[1];

    let pointers = find_all(&shader.code, SpvOp::TypePointer);
    let pointer = pointers.iter().find(|p| p[0] == variable[0]).unwrap();
    assert_eq!(pointer[1], spirv::StorageClass::Input as u32);
    let vectors = find_all(&shader.code, SpvOp::TypeVector);
    let vector = vectors.iter().find(|v| v[0] == pointer[2]).unwrap();
    assert_eq!(vector[2], 4);

    // Location 0, no interpolation decorations for plain linear.
    assert!(has_decoration(&shader.code, var_id, spirv::Decoration::Location, Some(0)));
    for deco in [
        spirv::Decoration::Flat,
        spirv::Decoration::NoPerspective,
        spirv::Decoration::Centroid,
        spirv::Decoration::Sample,
    ] {
        assert!(!has_decoration(&shader.code, var_id, deco, None));
    }

    // The variable makes it into the entry point interface.
    let entry_point = &find_all(&shader.code, SpvOp::EntryPoint)[0];
    let (_, name_words) = read_string(&entry_point[2..]);
    assert_eq!(entry_point[2 + name_words..], [var_id]);

    assert_eq!(shader.inputs.len(), 1);
    assert_eq!(shader.inputs[0].location, 0);
    assert_eq!(shader.inputs[0].interp_mode, ilc::InterpMode::Linear);
}

#[test]
fn test_stage_execution_models() {
    let cases = [
        (VS, spirv::ExecutionModel::Vertex, "VShader"),
        (PS, spirv::ExecutionModel::Fragment, "PShader"),
        (3, spirv::ExecutionModel::Geometry, "GShader"),
        (4, spirv::ExecutionModel::GLCompute, "CShader"),
        (5, spirv::ExecutionModel::TessellationControl, "HShader"),
        (6, spirv::ExecutionModel::TessellationEvaluation, "DShader"),
    ];
    for (stage, exec_model, name) in cases {
        let shader = ilc::compile_shader(&stream(stage, &[ENDMAIN, END])).unwrap();
        let entry_points = find_all(&shader.code, SpvOp::EntryPoint);
        assert_eq!(entry_points.len(), 1, "stage {}", stage);
        assert_eq!(entry_points[0][0], exec_model as u32, "stage {}", stage);
        let (entry_name, _) = read_string(&entry_points[0][2..]);
        assert_eq!(entry_name, name);
    }
}

#[test]
fn test_pixel_shader_origin_upper_left() {
    let shader = ilc::compile_shader(&stream(PS, &[ENDMAIN, END])).unwrap();
    assert!(has_exec_mode(&shader.code, spirv::ExecutionMode::OriginUpperLeft, &[]));
}

#[test]
fn test_binding_spaces() {
    // A pixel shader touching every binding family: a constant buffer, a
    // sampled resource, a sampler and the append counter.
    let sample_control = 2 << 8; // resource 0, sampler 2
    let resource_fmts = (5 << 20) | (5 << 23) | (5 << 26) | (5 << 29); // float
    let il = stream(
        PS,
        &[
            Op::DclConstBuffer as u32,
            ((il::reg::CONST_BUFFER as u32) << 16) | (1 << 26),
            16,
            Op::DclResource as u32 | ((2 << 8) << 16), // id 0, 2d
            resource_fmts,
            Op::Sample as u32 | (sample_control << 16),
            (il::reg::TEMP as u32) << 16, // dst r0
            (il::reg::TEMP as u32) << 16, // coordinate r0
            Op::AppendBufAlloc as u32,
            (il::reg::TEMP as u32) << 16, // dst r0
            ENDMAIN,
            END,
        ],
    );
    let shader = ilc::compile_shader(&il).unwrap();

    let counter = shader
        .bindings
        .iter()
        .find(|b| b.descriptor_kind == ilc::DescriptorKind::StorageBuffer)
        .unwrap();
    assert_eq!(counter.index, ilc::ATOMIC_COUNTER_ID);

    let sampler = shader
        .bindings
        .iter()
        .find(|b| b.descriptor_kind == ilc::DescriptorKind::Sampler)
        .unwrap();
    assert_eq!(sampler.index, ilc::BASE_SAMPLER_ID + 2);
    assert!((1..=16).contains(&sampler.index));

    for binding in &shader.bindings {
        match binding.descriptor_kind {
            ilc::DescriptorKind::StorageBuffer | ilc::DescriptorKind::Sampler => {}
            _ => assert!(binding.index >= ilc::BASE_RESOURCE_ID, "{:?}", binding),
        }
    }
}

#[test]
fn test_interpolation_decorations() {
    // Pixel shader input with constant interpolation: Flat.
    let control = il::ImportUsage::Generic as u32 | ((il::InterpMode::Constant as u32) << 5);
    let il = stream(
        PS,
        &[
            Op::DclInput as u32 | (control << 16),
            (il::reg::INPUT as u32) << 16,
            ENDMAIN,
            END,
        ],
    );
    let shader = ilc::compile_shader(&il).unwrap();
    let var_id = find_all(&shader.code, SpvOp::Variable)[0][1];
    assert!(has_decoration(&shader.code, var_id, spirv::Decoration::Flat, None));
    assert!(!has_capability(&shader.code, spirv::Capability::SampleRateShading));

    // Sample-rate interpolation requests the capability.
    let control = il::ImportUsage::Generic as u32 | ((il::InterpMode::LinearSample as u32) << 5);
    let il = stream(
        PS,
        &[
            Op::DclInput as u32 | (control << 16),
            (il::reg::INPUT as u32) << 16,
            ENDMAIN,
            END,
        ],
    );
    let shader = ilc::compile_shader(&il).unwrap();
    let var_id = find_all(&shader.code, SpvOp::Variable)[0][1];
    assert!(has_decoration(&shader.code, var_id, spirv::Decoration::Sample, None));
    assert!(has_capability(&shader.code, spirv::Capability::SampleRateShading));
}

#[test]
fn test_structured_control_flow() {
    // if_logicalz r0 / mov r0, r1 / else / mov r0, r2 / endif
    let il = stream(
        VS,
        &[
            Op::IfLogicalZ as u32,
            (il::reg::TEMP as u32) << 16,
            Op::Mov as u32,
            (il::reg::TEMP as u32) << 16,
            ((il::reg::TEMP as u32) << 16) | 1,
            Op::Else as u32,
            Op::Mov as u32,
            (il::reg::TEMP as u32) << 16,
            ((il::reg::TEMP as u32) << 16) | 2,
            Op::EndIf as u32,
            ENDMAIN,
            END,
        ],
    );
    let shader = ilc::compile_shader(&il).unwrap();
    assert_eq!(count_op(&shader.code, SpvOp::SelectionMerge), 1);
    assert_eq!(count_op(&shader.code, SpvOp::BranchConditional), 1);

    // The conditional targets and the merge label all exist.
    let merges = find_all(&shader.code, SpvOp::SelectionMerge);
    let labels = find_all(&shader.code, SpvOp::Label);
    assert!(labels.iter().any(|l| l[0] == merges[0][0]));
}

#[test]
fn test_loop_lowering() {
    // whileloop / break_logicalz r0 / endloop
    let il = stream(
        VS,
        &[
            Op::While as u32,
            Op::BreakLogicalZ as u32,
            (il::reg::TEMP as u32) << 16,
            Op::EndLoop as u32,
            ENDMAIN,
            END,
        ],
    );
    let shader = ilc::compile_shader(&il).unwrap();
    assert_eq!(count_op(&shader.code, SpvOp::LoopMerge), 1);
    // break_logicalz wraps its jump in a selection construct.
    assert_eq!(count_op(&shader.code, SpvOp::SelectionMerge), 1);
    assert_eq!(count_op(&shader.code, SpvOp::BranchConditional), 1);
}

#[test]
fn test_position_output() {
    // dcl_output_position o0 in a vertex shader becomes the Position
    // built-in; generic outputs report their locations.
    let il = stream(
        VS,
        &[
            Op::DclOutput as u32 | ((il::ImportUsage::Position as u32) << 16),
            (il::reg::OUTPUT as u32) << 16,
            Op::DclOutput as u32 | ((il::ImportUsage::Generic as u32) << 16),
            ((il::reg::OUTPUT as u32) << 16) | 1,
            ENDMAIN,
            END,
        ],
    );
    let shader = ilc::compile_shader(&il).unwrap();
    assert_eq!(shader.outputs, vec![1]);

    let variables = find_all(&shader.code, SpvOp::Variable);
    assert_eq!(variables.len(), 2);
    let position_id = variables[0][1];
    assert!(has_decoration(
        &shader.code,
        position_id,
        spirv::Decoration::BuiltIn,
        Some(spirv::BuiltIn::Position as u32),
    ));
    let generic_id = variables[1][1];
    assert!(has_decoration(&shader.code, generic_id, spirv::Decoration::Location, Some(1)));
}

#[test]
fn test_literal_and_arithmetic() {
    // dcl_literal l0, 1.0, 2.0, 0.5, 0.0 / add r0, l0, l0
    let il = stream(
        VS,
        &[
            Op::DclLiteral as u32,
            (il::reg::LITERAL as u32) << 16,
            0x3F800000,
            0x40000000,
            0x3F000000,
            0x00000000,
            Op::Add as u32,
            (il::reg::TEMP as u32) << 16,
            (il::reg::LITERAL as u32) << 16,
            (il::reg::LITERAL as u32) << 16,
            ENDMAIN,
            END,
        ],
    );
    let shader = ilc::compile_shader(&il).unwrap();
    assert_eq!(count_op(&shader.code, SpvOp::FAdd), 1);
    assert_eq!(count_op(&shader.code, SpvOp::ConstantComposite), 1);
    // Temp r0 lives in Private storage.
    let variables = find_all(&shader.code, SpvOp::Variable);
    assert!(variables
        .iter()
        .any(|v| v[2] == spirv::StorageClass::Private as u32));
}

#[test]
fn test_rectangle_geometry_shader() {
    let shader = ilc::compile_rectangle_geometry_shader(&[]);

    assert!(has_capability(&shader.code, spirv::Capability::Geometry));
    assert!(has_exec_mode(&shader.code, spirv::ExecutionMode::Triangles, &[]));
    assert!(has_exec_mode(&shader.code, spirv::ExecutionMode::OutputTriangleStrip, &[]));
    assert!(has_exec_mode(&shader.code, spirv::ExecutionMode::OutputVertices, &[4]));
    assert!(has_exec_mode(&shader.code, spirv::ExecutionMode::Invocations, &[1]));

    assert_eq!(count_op(&shader.code, SpvOp::EmitVertex), 4);
    assert_eq!(count_op(&shader.code, SpvOp::EndPrimitive), 1);

    let entry_points = find_all(&shader.code, SpvOp::EntryPoint);
    assert_eq!(entry_points.len(), 1);
    assert_eq!(entry_points[0][0], spirv::ExecutionModel::Geometry as u32);
}

#[test]
fn test_rectangle_geometry_shader_with_passthroughs() {
    let inputs = [
        ilc::ShaderInput {
            location: 1,
            interp_mode: ilc::InterpMode::Linear,
        },
        ilc::ShaderInput {
            location: 3,
            interp_mode: ilc::InterpMode::Constant,
        },
    ];
    let shader = ilc::compile_rectangle_geometry_shader(&inputs);

    // Two generic input/output pairs plus the position pair.
    let variables = find_all(&shader.code, SpvOp::Variable);
    assert_eq!(variables.len(), 6);
    let entry_point = &find_all(&shader.code, SpvOp::EntryPoint)[0];
    let (_, name_words) = read_string(&entry_point[2..]);
    assert_eq!(entry_point[2 + name_words..].len(), 6);
}

#[test]
fn test_disassemble_shader_surface() {
    let il = stream(
        VS,
        &[
            Op::Mov as u32,
            (il::reg::TEMP as u32) << 16,
            ((il::reg::INPUT as u32) << 16) | (1 << 22),
            0, // swizzle xxxx
            ENDMAIN,
            END,
        ],
    );
    let mut out = Vec::new();
    ilc::disassemble_shader(&il, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.lines().any(|line| line == "mov r0, v0.x"));
}

#[test]
fn test_shader_naming_surface() {
    let il = stream(PS, &[ENDMAIN, END]);
    let shader = ilc::compile_shader(&il).unwrap();
    assert!(shader.name.starts_with("ps_"));
    assert_eq!(shader.name.len(), 43);
    assert_eq!(shader.name, ilc::shader_name(&il).unwrap());
}

#[test]
fn test_compile_rejects_bad_input() {
    // Not a multiple of four bytes.
    assert!(ilc::compile_shader(&[0, 0, 0]).is_err());
    // Truncated instruction.
    let il = stream(VS, &[Op::Mov as u32]);
    assert!(ilc::compile_shader(&il).is_err());
}
