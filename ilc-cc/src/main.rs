use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::fs;

#[derive(Parser, Debug)]
#[command(author, version, about = "Offline IL -> SPIR-V compiler", long_about = None)]
struct Args {
    #[arg(required = true, help = "Input IL binary file paths.")]
    in_paths: Vec<String>,

    #[arg(long, help = "Also print the disassembly of every input.")]
    disassemble: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if std::env::var("GRVK_DUMP_SHADERS").as_deref() != Ok("1") {
        warn!("GRVK_DUMP_SHADERS isn't set. Logs only.");
    }

    let total = args.in_paths.len();
    for (i, in_path) in args.in_paths.iter().enumerate() {
        info!("compiling {}... ({}/{})", in_path, i + 1, total);

        let il = fs::read(in_path).with_context(|| format!("failed to open {}", in_path))?;

        if args.disassemble {
            let stdout = std::io::stdout();
            ilc::disassemble_shader(&il, &mut stdout.lock())
                .with_context(|| format!("failed to disassemble {}", in_path))?;
        }

        let shader = ilc::compile_shader(&il)
            .with_context(|| format!("failed to compile {}", in_path))?;
        info!(
            "compiled {} ({} words, {} bindings)",
            shader.name,
            shader.code.len(),
            shader.bindings.len()
        );
    }

    Ok(())
}
