//! Jinx CLI
//!
//! Development convenience wrapping the host API: compile and run a
//! script, check it for compile errors, or dump its bytecode. No bearing
//! on engine semantics (see DESIGN.md) — in the style of the teacher's
//! `seqc` binary, a thin `clap` front end over a library crate.

use clap::{Parser as ClapParser, Subcommand};
use jinx_core::opcode::Instruction;
use std::path::{Path, PathBuf};
use std::process;
use std::rc::Rc;

#[derive(ClapParser)]
#[command(name = "jinxc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Jinx compiler/runtime CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run a .jinx script, driving it to completion
    Run {
        /// Input script source file
        input: PathBuf,

        /// Library names to import (space-separated per flag)
        #[arg(long = "import", value_name = "LIBRARY")]
        imports: Vec<String>,

        /// Print performance counters after the run
        #[arg(long)]
        stats: bool,
    },

    /// Compile a .jinx script and report errors, without running it
    Check {
        input: PathBuf,

        #[arg(long = "import", value_name = "LIBRARY")]
        imports: Vec<String>,
    },

    /// Compile a .jinx script and print its disassembled bytecode
    Dump {
        input: PathBuf,

        #[arg(long = "import", value_name = "LIBRARY")]
        imports: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { input, imports, stats } => run(&input, &imports, stats),
        Commands::Check { input, imports } => check(&input, &imports),
        Commands::Dump { input, imports } => dump(&input, &imports),
    }
}

fn read_source(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {}", path.display(), e);
        process::exit(1);
    })
}

fn script_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("script")
        .to_string()
}

fn run(input: &Path, imports: &[String], print_stats: bool) {
    let source = read_source(input);
    let runtime = jinx_runtime::Runtime::new(jinx_runtime::EngineConfig::new());
    let bytecode = match runtime.compile(&source, &script_name(input), imports) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    let mut script = match runtime.create_script(&bytecode, Rc::new(())) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    while !script.is_finished() {
        if !script.execute() {
            break;
        }
    }

    if let Some(err) = script.error() {
        eprintln!("Runtime error: {err}");
        if print_stats {
            print_stats_table(&runtime);
        }
        process::exit(1);
    }

    if print_stats {
        print_stats_table(&runtime);
    }
}

fn print_stats_table(runtime: &jinx_runtime::Runtime) {
    let stats = runtime.get_performance_stats(false);
    println!("--- performance stats ---");
    println!("compiles:             {}", stats.compile_count);
    println!("executions:           {}", stats.execution_count);
    println!("completions:          {}", stats.completion_count);
    println!("instructions executed: {}", stats.instructions_executed);
    println!("total compile time:   {:?}", stats.total_compile_time);
    println!("total execution time: {:?}", stats.total_execution_time);
}

fn check(input: &Path, imports: &[String]) {
    let source = read_source(input);
    let runtime = jinx_runtime::Runtime::new(jinx_runtime::EngineConfig::new());
    match runtime.compile(&source, &script_name(input), imports) {
        Ok(_) => println!("{}: ok", input.display()),
        Err(e) => {
            eprintln!("{}: {}", input.display(), e);
            process::exit(1);
        }
    }
}

fn dump(input: &Path, imports: &[String]) {
    let source = read_source(input);
    let runtime = jinx_runtime::Runtime::new(jinx_runtime::EngineConfig::new());
    let bytecode = match runtime.compile(&source, &script_name(input), imports) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let mut reader = jinx_core::bytecode::ByteCodeReader::new(&bytecode);
    let header = match jinx_core::bytecode::Header::read(&mut reader) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error reading header: {e}");
            process::exit(1);
        }
    };
    println!(
        "signature: {:08x}  version: {}  name: {:?}  data_size: {}",
        header.signature, header.version, header.name, header.data_size
    );

    let instructions_start = reader.position();
    let data_end = jinx_core::bytecode::HEADER_LEN + header.data_size as usize;
    let mut body = jinx_core::bytecode::ByteCodeReader::with_pos(&bytecode[..data_end], instructions_start);
    while !body.is_at_end() {
        let pc = body.position();
        match Instruction::decode(&mut body) {
            Ok(ins) => println!("{pc:06x}: {ins:?}"),
            Err(e) => {
                println!("{pc:06x}: <decode error: {e}>");
                break;
            }
        }
    }
}
