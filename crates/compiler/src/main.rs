//! Ada 83 compiler CLI
//!
//! `adac [-I <dir>]... <source.adb>` compiles one Ada source file and
//! writes LLVM textual IR to stdout (or to `--output`). Exit code 0 on
//! success, 1 on any diagnostic.

use clap::Parser as ClapParser;
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "adac")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ada 83 compiler - translate Ada sources to LLVM IR", long_about = None)]
struct Cli {
    /// Include directory searched for `with`ed units (repeatable;
    /// `-I DIR` and `-IDIR` are both accepted)
    #[arg(short = 'I', value_name = "DIR")]
    include: Vec<PathBuf>,

    /// Ada source file to compile
    input: PathBuf,

    /// Write the IR to a file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    match adac::compile_file(&cli.input, &cli.include) {
        Ok(ir) => {
            if let Some(path) = cli.output {
                if let Err(e) = fs::write(&path, ir) {
                    eprintln!("{}: {}", path.display(), e);
                    process::exit(1);
                }
            } else {
                print!("{}", ir);
            }
        }
        Err(diagnostics) => {
            for line in diagnostics {
                eprintln!("{}", line);
            }
            process::exit(1);
        }
    }
}
