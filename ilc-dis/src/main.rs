use clap::Parser;
use ilc_core::decode::{decode_stream, tokens_from_bytes};
use ilc_dis::Disassembler;
use std::{
    fs::File,
    io::{stderr, Read, Write},
    path::Path,
    process::exit,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(help = "Input IL binary file path.")]
    in_path: String,

    #[arg(
        short,
        long,
        help = "Output listing file path. The listing is printed to stdout \
        if this path is not given."
    )]
    out_path: Option<String>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let in_path = Path::new(&args.in_path);

    let mut in_file = File::open(in_path).unwrap_or_else(|e| {
        writeln!(stderr(), "error: failed to open input file: {}", e).unwrap();
        exit(1);
    });

    let mut il = Vec::new();
    in_file.read_to_end(&mut il).unwrap_or_else(|e| {
        writeln!(stderr(), "error: failed to read input file: {}", e).unwrap();
        exit(1);
    });

    let kernel = tokens_from_bytes(&il)
        .and_then(|tokens| decode_stream(&tokens))
        .unwrap_or_else(|e| {
            writeln!(stderr(), "error: failed to decode shader: {}", e).unwrap();
            exit(1);
        });

    let result = if let Some(out_path) = args.out_path {
        let mut out_file = File::create(Path::new(&out_path)).unwrap_or_else(|e| {
            writeln!(stderr(), "error: failed to open output file: {}", e).unwrap();
            exit(1);
        });
        Disassembler::new().disassemble(&kernel, &mut out_file)
    } else {
        let stdout = std::io::stdout();
        Disassembler::new().disassemble(&kernel, &mut stdout.lock())
    };

    result.unwrap_or_else(|e| {
        writeln!(stderr(), "error: failed to write listing: {}", e).unwrap();
        exit(1);
    });
}
