use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::fs::File;
use std::io::Write;

use relic86_core::dump::write_execution_dump;
use relic86_core::logging::{self, LogLevel};
use relic86_core::{Cpu, CoreConfig, FlatMemory, PauseHandler, SegmentedAddress, StopReason};

/// Run a flat DOS-style binary image and report the discovered functions.
#[derive(Parser)]
struct Args {
    /// Path to the image (loaded COM-style at <segment>:0100)
    image: String,

    /// Load segment (hex accepted with 0x prefix)
    #[arg(long, default_value = "0x1000", value_parser = parse_u16)]
    segment: u16,

    /// Instruction budget before giving up
    #[arg(long, default_value_t = 10_000_000)]
    max_instructions: u64,

    /// Write the function/global dump to this file
    #[arg(long, default_value = "dump.txt")]
    dump: String,

    /// Dump final register state as JSON to this file
    #[arg(long)]
    save: Option<String>,

    /// Core log level: off, error, warn, info, debug, trace
    #[arg(long)]
    log_level: Option<String>,

    /// Fail on I/O to unmapped ports
    #[arg(long, default_value_t = false)]
    strict_ports: bool,

    /// Fail on interrupts through zeroed vectors
    #[arg(long, default_value_t = false)]
    strict_interrupts: bool,

    /// Raise default log levels to debug
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x") {
        u16::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|e| format!("invalid 16-bit value {:?}: {}", s, e))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = CoreConfig {
        fail_on_unhandled_port: args.strict_ports,
        error_on_uninitialized_interrupt_handler: args.strict_interrupts,
        debug_mode: args.debug,
        force_log: None,
    };
    logging::configure(&config);
    if let Some(level) = args.log_level.as_deref() {
        let level = LogLevel::from_str(level)
            .with_context(|| format!("unknown log level {:?}", level))?;
        logging::set_all_levels(level);
    }

    let image = fs::read(&args.image).with_context(|| format!("reading {}", args.image))?;

    // COM-style layout: image at <segment>:0100, stack at the segment top
    let entry = SegmentedAddress::new(args.segment, 0x0100);
    let mut memory = FlatMemory::new();
    memory.load(entry.linear(), &image);

    let mut cpu = Cpu::with_config(memory, config);
    cpu.regs.cs = args.segment;
    cpu.regs.ds = args.segment;
    cpu.regs.es = args.segment;
    cpu.regs.ss = args.segment;
    cpu.regs.ip = 0x0100;
    cpu.regs.sp = 0xFFFE;

    let pause = PauseHandler::new();
    match cpu.run(&pause, args.max_instructions) {
        Ok(StopReason::Halted) => {
            println!("halted after {} instructions", cpu.cycles);
        }
        Ok(StopReason::InstructionLimit) => {
            println!(
                "instruction budget ({}) exhausted at {:04X}:{:04X}",
                args.max_instructions, cpu.regs.cs, cpu.regs.ip
            );
        }
        Ok(StopReason::Paused) => {
            println!("paused after {} instructions", cpu.cycles);
        }
        Err(err) => {
            eprintln!("fatal: {}", err);
            eprintln!("{}", cpu.snapshot());
            std::process::exit(1);
        }
    }

    let mut dump = File::create(&args.dump).with_context(|| format!("creating {}", args.dump))?;
    write_execution_dump(&mut dump, cpu.functions(), cpu.recorder())?;
    println!(
        "wrote {} ({} functions, {} globals)",
        args.dump,
        cpu.functions().functions().len(),
        cpu.recorder().touches().len()
    );

    if let Some(path) = args.save.as_deref() {
        let mut out = File::create(path).with_context(|| format!("creating {}", path))?;
        write!(out, "{}", serde_json::to_string_pretty(&cpu.snapshot())?)?;
        println!("wrote {}", path);
    }

    Ok(())
}
