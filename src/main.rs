use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, IntoDiagnostic, Result};

use weft::devices::Console;
use weft::disasm;
use weft::{
    AsmConfig, Assembly, Breakpoint, DeviceKind, Machine, MachineConfig, MachineStatus,
};

/// Weft is an assembler and emulator for a small 8-bit teaching computer.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.asm` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run text `.asm` or binary `.bin` file and report the final machine state
    Run {
        /// `.asm` or `.bin` file to run
        name: PathBuf,
        #[command(flatten)]
        machine: MachineArgs,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Create flat binary `.bin` image to run later
    Compile {
        /// `.asm` file to compile
        name: PathBuf,
        /// Destination to output .bin file
        dest: Option<PathBuf>,
    },
    /// Check a `.asm` file without running or outputting binary
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Print a listing of assembled or binary code
    Disasm {
        /// `.asm` or `.bin` file to list
        name: PathBuf,
    },
}

#[derive(clap::Args)]
struct MachineArgs {
    /// Maximum number of clock cycles [default: WEFT_CYCLE_LIMIT or 1000000]
    #[arg(short, long)]
    cycles: Option<u64>,
    /// Attach a device (console, timer); may be repeated
    #[arg(short, long = "device")]
    devices: Vec<DeviceKind>,
    /// Number of CPUs
    #[arg(long, default_value_t = 1)]
    cpus: usize,
    /// Cores per CPU
    #[arg(long, default_value_t = 1)]
    cores: usize,
    /// Pause at this address or label; may be repeated
    #[arg(short, long = "break")]
    breakpoints: Vec<String>,
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    weft::env::init();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(weft::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    let Some(command) = args.command else {
        if let Some(path) = args.path {
            let machine = MachineArgs {
                cycles: None,
                devices: vec![DeviceKind::Console],
                cpus: 1,
                cores: 1,
                breakpoints: Vec::new(),
            };
            return run(&path, &machine, false);
        }
        println!("\n~ weft v{VERSION} ~");
        println!("{SHORT_INFO}");
        std::process::exit(0);
    };

    match command {
        Command::Run {
            name,
            machine,
            minimal,
        } => run(&name, &machine, minimal),
        Command::Compile { name, dest } => {
            file_message(Green, "Assembling", &name);
            let assembly = assemble_file(&name)?;
            let out_file_name = match dest {
                Some(dest) => dest,
                None => name.with_extension("bin"),
            };
            fs::write(&out_file_name, assembly.image()).into_diagnostic()?;
            message(Green, "Finished", "emit binary");
            file_message(Green, "Saved", &out_file_name);
            Ok(())
        }
        Command::Check { name } => {
            file_message(Green, "Checking", &name);
            let _ = assemble_file(&name)?;
            message(Green, "Success", "no errors found!");
            Ok(())
        }
        Command::Disasm { name } => {
            let blocks = if is_binary(&name)? {
                vec![(0, fs::read(&name).into_diagnostic()?)]
            } else {
                file_message(Green, "Assembling", &name);
                contiguous_blocks(&assemble_file(&name)?)
            };
            for (start, bytes) in blocks {
                for instr in disasm::disassemble(start, &bytes) {
                    let raw: Vec<_> = instr.bytes.iter().map(|b| format!("{b:02x}")).collect();
                    println!("{:04x}:  {:<16} {instr}", instr.address, raw.join(" "));
                }
            }
            Ok(())
        }
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, right.as_str());
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

/// An address literal, or else a symbol of the assembled program.
fn parse_breakpoint(text: &str, assembly: Option<&Assembly>) -> Result<Breakpoint> {
    if let Some(value) = weft::parse_number(text) {
        let Ok(address) = u16::try_from(value) else {
            bail!("Breakpoint `{text}` is not a 16-bit address");
        };
        return Ok(Breakpoint::at(address));
    }
    let Some(assembly) = assembly else {
        bail!("Breakpoint `{text}` is not a number, and binary images have no labels");
    };
    let Some(value) = assembly.symbol_value(text) else {
        bail!("Breakpoint `{text}` is neither a number nor a label");
    };
    match u16::try_from(value) {
        Ok(address) => Ok(Breakpoint::labeled(address, text)),
        Err(_) => bail!("Label `{text}` is not a 16-bit address"),
    }
}

fn is_binary(name: &Path) -> Result<bool> {
    match name.extension().and_then(|ext| ext.to_str()) {
        Some("bin") => Ok(true),
        Some("asm" | "s") => Ok(false),
        Some(_) => bail!("File has unknown extension. Exiting..."),
        None => bail!("File has no extension. Exiting..."),
    }
}

/// Assemble, printing every diagnostic. Fails if any of them is an error.
fn assemble_file(name: &Path) -> Result<Assembly> {
    let src = fs::read_to_string(name).into_diagnostic()?;
    let assembly = weft::assemble(&src, &AsmConfig::default());
    for diag in &assembly.diagnostics {
        eprintln!("{:?}", diag.to_report(&src));
    }
    let errors = assembly.errors().count();
    if errors > 0 {
        bail!(
            "could not assemble `{}` due to {errors} previous error{}",
            name.display(),
            if errors == 1 { "" } else { "s" }
        );
    }
    Ok(assembly)
}

/// Runs of consecutive addresses in a byte map.
fn contiguous_blocks(assembly: &Assembly) -> Vec<(u16, Vec<u8>)> {
    let mut blocks: Vec<(u16, Vec<u8>)> = Vec::new();
    for (&address, &value) in &assembly.bytes {
        match blocks.last_mut() {
            Some((start, bytes)) if *start as usize + bytes.len() == address as usize => {
                bytes.push(value);
                continue;
            }
            _ => {}
        }
        blocks.push((address, vec![value]));
    }
    blocks
}

fn run(name: &Path, args: &MachineArgs, minimal: bool) -> Result<()> {
    let mut machine = Machine::new(MachineConfig {
        cpus: args.cpus,
        cores: args.cores,
        ..MachineConfig::default()
    });
    let assembly = if is_binary(name)? {
        file_message(MsgColor::Green, "Loading", name);
        let image = fs::read(name).into_diagnostic()?;
        machine.load_image(&image)?;
        None
    } else {
        file_message(MsgColor::Green, "Assembling", name);
        let assembly = assemble_file(name)?;
        machine.load_assembly(&assembly)?;
        Some(assembly)
    };
    for kind in &args.devices {
        machine.add_device_kind(*kind)?;
    }
    for text in &args.breakpoints {
        machine.add_breakpoint(parse_breakpoint(text, assembly.as_ref())?);
    }

    message(MsgColor::Green, "Running", "emitted binary");
    let limit = args.cycles.unwrap_or_else(weft::env::cycle_limit);
    let mut status = machine.run(limit)?;
    while let MachineStatus::Paused(address) = status {
        let label = machine
            .cpus()
            .first()
            .and_then(|cpu| cpu.breakpoints().get(address))
            .and_then(|breakpoint| breakpoint.label.as_deref());
        let location = match label {
            Some(label) => format!("0x{address:04x} ({label})"),
            None => format!("0x{address:04x}"),
        };
        message(MsgColor::Cyan, "Breakpoint", location.as_str());
        if !minimal {
            print_registers(&machine);
        }
        machine.resume();
        status = machine.run(limit.saturating_sub(machine.cycles()))?;
    }

    for (index, kind) in args.devices.iter().enumerate() {
        if *kind != DeviceKind::Console {
            continue;
        }
        if let Some(console) = machine.device::<Console>(index) {
            print!("{}", String::from_utf8_lossy(&console.output()));
        }
    }
    if !minimal {
        print_registers(&machine);
    }

    match status {
        MachineStatus::Running => message(
            MsgColor::Red,
            "Stopped",
            format!("cycle limit of {limit} reached").as_str(),
        ),
        _ => message(
            MsgColor::Green,
            "Halted",
            format!("after {} cycles", machine.cycles()).as_str(),
        ),
    }
    file_message(MsgColor::Green, "Completed", name);
    Ok(())
}

fn print_registers(machine: &Machine) {
    for cpu in machine.cpus() {
        for core in cpu.cores() {
            if !core.is_running() && !core.is_halted() {
                continue;
            }
            println!("cpu{}.{}: {}", cpu.index(), core.index(), core.regs);
        }
    }
}

const SHORT_INFO: &str = r"
Welcome to weft, an assembler and emulator for a small 8-bit computer.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
