use clap::Parser;
use lc3_vm::emulator::Emulator;
use lc3_vm::errors::ExecutionError;
use std::path::PathBuf;
use std::process::ExitCode;

/// Runs LC-3 object images in the terminal.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Object images, each loaded at its own .ORIG address in the given order.
    /// Execution starts at x3000.
    #[arg(required = true, value_name = "IMAGE")]
    images: Vec<PathBuf>,
}

const EXIT_LOAD_FAILED: u8 = 1;
const EXIT_IO_FAILED: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    // missing images: usage on stderr and exit status 2
    let cli = Cli::parse();

    let mut emu = Emulator::new();
    for image in &cli.images {
        if let Err(e) = emu.load_program_file(image) {
            eprintln!("failed to load image: {}: {e}", image.display());
            return ExitCode::from(EXIT_LOAD_FAILED);
        }
    }

    // the terminal is restored when execute returns, before anything is reported
    match emu.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(ExecutionError::Interrupted) => ExitCode::from(EXIT_INTERRUPTED),
        Err(e) if e.is_architectural_violation() => {
            eprintln!("{e}");
            std::process::abort()
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(EXIT_IO_FAILED)
        }
    }
}
