mod common;

use common::*;
use num_traits::FromPrimitive;
use pretty_assertions::assert_eq;
use spirv::Op as SpvOp;

/// An empty vertex shader produced by the main translation path, as the
/// recompiler's input.
fn empty_vertex_module() -> Vec<u32> {
    let il = to_bytes(&[0x00000000, 0x00010000, 0x00000028, 0x0000002A]);
    ilc::compile_shader(&il).unwrap().code
}

#[test]
fn test_passthrough_adds_interface() {
    let module = empty_vertex_module();
    let recompiled = ilc::recompile_shader(&to_bytes(&module), &[5]).unwrap();
    let words = &recompiled.code;

    assert_eq!(words[0], 0x07230203);

    // One new input and one new output at location 5.
    let variables = find_all(words, SpvOp::Variable);
    let input = variables
        .iter()
        .find(|v| v[2] == spirv::StorageClass::Input as u32)
        .unwrap();
    let output = variables
        .iter()
        .find(|v| v[2] == spirv::StorageClass::Output as u32)
        .unwrap();
    assert!(has_decoration(words, input[1], spirv::Decoration::Location, Some(5)));
    assert!(has_decoration(words, output[1], spirv::Decoration::Location, Some(5)));

    // The copy happens inside the function body.
    assert_eq!(count_op(words, SpvOp::Load), 1);
    assert_eq!(count_op(words, SpvOp::Store), 1);
    assert_eq!(count_op(words, SpvOp::Return), 1);
    assert_eq!(count_op(words, SpvOp::FunctionEnd), 1);

    // The rewritten entry point lists both variables.
    let entry_points = find_all(words, SpvOp::EntryPoint);
    assert_eq!(entry_points.len(), 1);
    let entry_point = &entry_points[0];
    assert_eq!(entry_point[0], spirv::ExecutionModel::Vertex as u32);
    let (name, name_words) = read_string(&entry_point[2..]);
    assert_eq!(name, "VShader");
    let interfaces = &entry_point[2 + name_words..];
    assert!(interfaces.contains(&input[1]));
    assert!(interfaces.contains(&output[1]));
}

#[test]
fn test_passthrough_skips_existing_locations() {
    // A vertex shader that already consumes location 0.
    let il = to_bytes(&[
        0x00000000,
        0x00010000,
        20 | ((6 | (2 << 5)) << 16), // dcl_input_generic_interp(linear)
        33 << 16,                    // v0
        0x00000028,
        0x0000002A,
    ]);
    let module = ilc::compile_shader(&il).unwrap().code;
    let recompiled = ilc::recompile_shader(&to_bytes(&module), &[0]).unwrap();

    // Location 0 exists already; no passthrough copy is added.
    assert_eq!(count_op(&recompiled.code, SpvOp::Store), 0);
    let variables = find_all(&recompiled.code, SpvOp::Variable);
    assert_eq!(variables.len(), 1);
}

#[test]
fn test_passthrough_ids_do_not_collide() {
    let module = empty_vertex_module();
    let recompiled = ilc::recompile_shader(&to_bytes(&module), &[2, 7]).unwrap();
    let words = &recompiled.code;

    // Every result id stays below the declared bound and no id is defined
    // twice.
    let bound = words[3];
    let mut seen = std::collections::HashSet::new();
    for (opcode, operands) in instrs(words) {
        let result_id = match SpvOp::from_u32(opcode) {
            Some(SpvOp::Variable | SpvOp::Load | SpvOp::AccessChain) => Some(operands[1]),
            Some(SpvOp::TypePointer | SpvOp::TypeVector | SpvOp::TypeFloat | SpvOp::Label) => {
                Some(operands[0])
            }
            _ => None,
        };
        if let Some(id) = result_id {
            assert!(id < bound, "id {} exceeds bound {}", id, bound);
            assert!(seen.insert(id), "id {} defined twice", id);
        }
    }
}

#[test]
fn test_recompile_rejects_garbage() {
    assert!(ilc::recompile_shader(&[1, 2, 3], &[]).is_err());
    assert!(ilc::recompile_shader(&to_bytes(&[0xDEAD, 0, 0, 0, 0]), &[]).is_err());
}
