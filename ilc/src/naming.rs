//! Stable shader naming and diagnostic dumps.

use std::fmt::Write as _;
use std::fs::File;
use std::io::Write as _;
use std::sync::OnceLock;

use log::warn;
use sha1::{Digest, Sha1};

use ilc_core::bits::get_bits;
use ilc_core::error::{bail, Result};
use ilc_core::il::ShaderStage;
use ilc_core::kernel::Kernel;

/// `<stage>_<40-hex-sha1>` over arbitrary bytes.
fn hashed_name(stage: ShaderStage, code: &[u8]) -> String {
    let digest = Sha1::digest(code);
    let mut name = String::with_capacity(3 + 2 * digest.len());
    name.push_str(stage.mnemonic());
    name.push('_');
    for byte in digest {
        write!(name, "{:02x}", byte).unwrap();
    }
    name
}

/// Derive the stable `<stage>_<40-hex-sha1>` name of a raw IL binary. The
/// stage is read straight from the version token so a name exists even for
/// streams that later fail to decode.
pub fn shader_name(code: &[u8]) -> Result<String> {
    if code.len() < 8 {
        bail!("shader is too short for the header tokens");
    }
    let version = u32::from_le_bytes(code[4..8].try_into().unwrap());
    let stage_bits = get_bits(version, 16, 23);
    let stage = match ShaderStage::from_u32(stage_bits) {
        Some(stage) => stage,
        None => bail!("unsupported shader stage {}", stage_bits),
    };
    Ok(hashed_name(stage, code))
}

/// Whether `GRVK_DUMP_SHADERS=1` is set. Read once per process.
pub fn is_shader_dump_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| std::env::var("GRVK_DUMP_SHADERS").as_deref() == Ok("1"))
}

pub fn dump_buffer(code: &[u8], name: &str, format: &str) {
    let file_name = format!("{}_{}.bin", name, format);
    let result = File::create(&file_name).and_then(|mut file| file.write_all(code));
    if let Err(err) = result {
        warn!("failed to dump {}: {}", file_name, err);
    }
}

pub fn dump_kernel(kernel: &Kernel, name: &str) {
    let file_name = format!("{}_il.txt", name);
    let result = File::create(&file_name)
        .map_err(anyhow::Error::from)
        .and_then(|mut file| ilc_dis::Disassembler::new().disassemble(kernel, &mut file));
    if let Err(err) = result {
        warn!("failed to dump {}: {}", file_name, err);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hashed_name_format() {
        // SHA-1 of the empty input is pinned, which makes the whole name
        // deterministic.
        assert_eq!(
            hashed_name(ShaderStage::Pixel, &[]),
            "ps_da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[test]
    fn test_pixel_shader_name() {
        let code = [
            0x00, 0x00, 0x00, 0x00, // lang
            0x00, 0x00, 0x02, 0x00, // version: stage = pixel
        ];
        let name = shader_name(&code).unwrap();
        assert!(name.starts_with("ps_"));
        assert_eq!(name.len(), 3 + 40);
        assert!(name[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_name_rejects_truncated_header() {
        assert!(shader_name(&[0; 4]).is_err());
    }

    #[test]
    fn test_name_rejects_bad_stage() {
        let code = [0, 0, 0, 0, 0, 0, 0xFF, 0];
        assert!(shader_name(&code).is_err());
    }
}
