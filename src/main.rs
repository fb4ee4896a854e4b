//! The front end for the P compiler and interpreter: compile the source,
//! and run it when it compiled cleanly. The exit code is the number of
//! compile errors.

use clap::Parser;
use p_lang::mach::{Compiler, Machine, Outcome};
use std::io::Read;
use std::process::exit;

/// Compile and run a P program.
#[derive(Parser, Debug)]
#[command(name = "p", version, about)]
struct Args {
    /// Print compiler and machine progress messages
    #[arg(short, long)]
    verbose: bool,

    /// The source file, or '-' for standard input
    #[arg(default_value = "-")]
    file: String,
}

fn read_source(file: &str) -> std::io::Result<String> {
    if file == "-" {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source)?;
        Ok(source)
    } else {
        std::fs::read_to_string(file)
    }
}

fn main() {
    let args = Args::parse();
    let source = match read_source(&args.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("p: cannot read {}: {}", args.file, e);
            exit(1);
        }
    };

    let mut comp = Compiler::new("p", args.verbose);
    let nerrors = comp.compile(&source);
    for error in comp.errors() {
        eprintln!("p: {}", error);
    }

    if nerrors == 0 {
        if args.verbose {
            if args.file == "-" {
                println!("p: loading program from standard input, and starting P...");
            } else {
                println!("p: loading program '{}', and starting P...", args.file);
            }
        }
        let mut machine = Machine::new();
        let result = machine.run(comp.code(), args.verbose);
        if result != Outcome::Success {
            eprintln!("p: runtime error: {}!", result);
        }
        if args.verbose {
            println!("p: ending P after {} machine cycles", machine.cycles());
        }
    }

    exit(nerrors.min(255) as i32);
}
