//! In-place descriptor binding rewrites on finished SPIR-V modules.

use spirv::Op;

use crate::BindingPatchEntry;

fn find_entry_by_id(id: u32, entries: &[BindingPatchEntry]) -> Option<&BindingPatchEntry> {
    entries.iter().find(|entry| entry.id == id)
}

/// Overwrite the `DescriptorSet` and `Binding` decoration operands of
/// every listed id, in place. The word count and everything else in the
/// module stays untouched; patching twice with the same entries is a
/// no-op the second time.
pub fn patch_shader_bindings(words: &mut [u32], entries: &[BindingPatchEntry]) {
    let mut i = 5;
    while i < words.len() {
        let opcode = words[i] & 0xFFFF;
        let word_count = (words[i] >> 16) as usize;
        if word_count == 0 {
            // A zero-length instruction would loop forever; the module is
            // broken, so leave the rest untouched.
            return;
        }

        if opcode == Op::Decorate as u32 && word_count >= 4 {
            let id = words[i + 1];
            let decoration = words[i + 2];
            if decoration == spirv::Decoration::DescriptorSet as u32
                || decoration == spirv::Decoration::Binding as u32
            {
                if let Some(entry) = find_entry_by_id(id, entries) {
                    words[i + 3] = if decoration == spirv::Decoration::DescriptorSet as u32 {
                        entry.descriptor_set_index
                    } else {
                        entry.binding_index
                    };
                }
            }
        }

        i += word_count;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn decorate(id: u32, decoration: spirv::Decoration, value: u32) -> [u32; 4] {
        [Op::Decorate as u32 | (4 << 16), id, decoration as u32, value]
    }

    #[test]
    fn test_patch_rewrites_only_listed_operands() {
        let mut words = vec![0x07230203, 0x00010000, 0, 10, 0];
        words.extend_from_slice(&decorate(5, spirv::Decoration::DescriptorSet, 0));
        words.extend_from_slice(&decorate(5, spirv::Decoration::Binding, 0));
        words.extend_from_slice(&decorate(6, spirv::Decoration::Binding, 2));
        let before = words.clone();

        patch_shader_bindings(
            &mut words,
            &[BindingPatchEntry {
                id: 5,
                descriptor_set_index: 3,
                binding_index: 7,
            }],
        );

        assert_eq!(words.len(), before.len());
        assert_eq!(words[8], 3); // DescriptorSet operand
        assert_eq!(words[12], 7); // Binding operand
        for (i, (a, b)) in words.iter().zip(before.iter()).enumerate() {
            if i != 8 && i != 12 {
                assert_eq!(a, b, "word {} must stay untouched", i);
            }
        }
    }

    #[test]
    fn test_patch_is_idempotent() {
        let mut words = vec![0x07230203, 0x00010000, 0, 10, 0];
        words.extend_from_slice(&decorate(5, spirv::Decoration::DescriptorSet, 1));
        let entries = [BindingPatchEntry {
            id: 5,
            descriptor_set_index: 4,
            binding_index: 9,
        }];

        patch_shader_bindings(&mut words, &entries);
        let once = words.clone();
        patch_shader_bindings(&mut words, &entries);
        assert_eq!(words, once);
    }

    #[test]
    fn test_patch_ignores_other_decorations() {
        let mut words = vec![0x07230203, 0x00010000, 0, 10, 0];
        words.extend_from_slice(&decorate(5, spirv::Decoration::Location, 0));
        let before = words.clone();
        patch_shader_bindings(
            &mut words,
            &[BindingPatchEntry {
                id: 5,
                descriptor_set_index: 3,
                binding_index: 7,
            }],
        );
        assert_eq!(words, before);
    }
}
