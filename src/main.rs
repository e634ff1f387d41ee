use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use simple8::cpu::assembler::{self, Assembly, REFERENCE_ENCODINGS};
use simple8::cpu::{HaltCondition, RunConfig, CPU};
use simple8::read_program;
use simple8::rom::{hex_dump, Rom};
use simple8::Error;

/// Assembler and simulator for the simple8 instruction set.
#[derive(Parser)]
#[command(name = "simple8", version)]
struct Cli {
    /// Log every assembled line and executed instruction.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a program into a Verilog instruction ROM.
    Assemble {
        /// Program text, one instruction per line.
        program: PathBuf,

        /// Where to write the ROM description.
        #[arg(short, long, default_value = "instruction_memory.v")]
        output: PathBuf,
    },
    /// Assemble a program and run it on the simulator.
    Run(RunArgs),
    /// Check the encoder against hand-verified encodings.
    Verify,
}

#[derive(Parser)]
struct RunArgs {
    /// Program text, one instruction per line.
    program: PathBuf,

    /// Stop after this many instructions.
    #[arg(long, default_value_t = 50)]
    max_cycles: u32,

    /// Stop when PC reaches this address (after --halt-after instructions).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..16))]
    halt_pc: Option<u8>,

    /// Instructions that must run before --halt-pc can stop the run.
    #[arg(long, default_value_t = 0, requires = "halt_pc")]
    halt_after: u32,

    /// Stop on a jump to its own address.
    #[arg(long, conflicts_with = "halt_pc")]
    halt_self_loop: bool,

    /// Print the CPU state before every instruction.
    #[arg(long)]
    trace: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Assemble { program, output } => assemble(&program, &output),
        Commands::Run(args) => run(args),
        Commands::Verify => verify(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// Assemble a program file and print its diagnostics. Lines with errors make the
// whole program unusable for export or simulation.
fn assemble_file(path: &Path) -> Result<Assembly, Error> {
    let text = read_program(path)?;
    let assembly = assembler::assemble(&text);
    for d in &assembly.diagnostics {
        eprintln!("{}", d);
    }
    debug!("listing:\n{}", assembly.listing());
    if assembly.has_errors() {
        return Err(Error::Assembly(assembly.errors().count()));
    }
    Ok(assembly)
}

fn assemble(program: &Path, output: &Path) -> Result<(), Error> {
    let assembly = assemble_file(program)?;
    let bytes = assembly.bytes();
    let rom = Rom::from_program(&bytes)?;
    rom.write_verilog(output).map_err(|source| Error::Write {
        path: output.to_path_buf(),
        source,
    })?;

    println!(
        "Generated {} with {} instructions",
        output.display(),
        bytes.len()
    );
    println!("Hex dump: {}", hex_dump(&bytes));
    Ok(())
}

fn run(args: RunArgs) -> Result<(), Error> {
    let assembly = assemble_file(&args.program)?;
    let rom = Rom::from_program(&assembly.bytes())?;

    let halt = if args.halt_self_loop {
        HaltCondition::SelfLoop
    } else if let Some(pc) = args.halt_pc {
        HaltCondition::PcAfter {
            pc,
            cycles: args.halt_after,
        }
    } else {
        HaltCondition::Never
    };
    let config = RunConfig {
        max_cycles: args.max_cycles,
        halt,
    };

    let mut cpu = CPU::new(rom);
    let summary = if args.trace {
        cpu.run_with_callback(&config, |cpu| println!("{}", cpu.trace()))
    } else {
        cpu.run(&config)
    };

    let regs = summary.state.registers;
    println!("PC = {}", summary.state.pc);
    println!(
        "R0 = {:02X}, R1 = {:02X}, R2 = {:02X}, R3 = {:02X}",
        regs[0], regs[1], regs[2], regs[3]
    );
    println!("zero_flag = {}", summary.state.zero_flag as u8);
    println!("Total cycles: {} ({:?})", summary.cycles, summary.stop);
    Ok(())
}

fn verify() -> Result<(), Error> {
    let mut failures = 0;
    for (line, expected) in REFERENCE_ENCODINGS {
        let actual = match assembler::encode(line) {
            Ok(Some(encoded)) => Some(encoded.word),
            _ => None,
        };
        let ok = actual == Some(*expected);
        if !ok {
            failures += 1;
        }
        let shown = actual
            .map(|w| format!("{:08b}", w))
            .unwrap_or_else(|| "--------".to_string());
        println!(
            "{} {:12} -> {} (expected: {:08b})",
            if ok { "✓" } else { "✗" },
            line,
            shown,
            expected
        );
    }
    if failures > 0 {
        return Err(Error::VerificationFailed(failures));
    }
    Ok(())
}
