//! nltool - run and inspect netlists.
//!
//! # Usage
//!
//! ```bash
//! nltool run -t 0.1 -l OUT -l CLK circuit.nl
//! nlwav -f wav -o out.wav log_OUT.log
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use netlist_core::{
    dsl::{self, Setup},
    error::Result,
    wav::write_log,
    NetlistTime,
};

/// Netlist simulation tool
#[derive(Parser, Debug)]
#[command(name = "nltool", author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Be verbose, repeat for more
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Be quiet, only errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a netlist
    Run {
        /// Netlist source file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Netlist block to run, defaults to the main netlist
        #[arg(short, long)]
        name: Option<String>,

        /// Seconds to simulate
        #[arg(short = 't', long, default_value_t = 1.0)]
        time_to_run: f64,

        /// Record a terminal or net into log_<NAME>.log
        #[arg(short = 'l', long = "log", value_name = "NAME")]
        logs: Vec<String>,

        /// Print device and solver statistics
        #[arg(short, long)]
        stats: bool,
    },
    /// Build a netlist and report errors without running it
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short, long)]
        name: Option<String>,
    },
    /// List the device types and their positional arguments
    Listdevices,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Warn,
        (false, 1) => LevelFilter::Info,
        (false, _) => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_setup(file: &Path, name: Option<&str>) -> Result<Setup> {
    let doc = dsl::parse_file(file)?;
    dsl::prepare(&doc, name)
}

fn run(file: &Path, name: Option<&str>, seconds: f64, logs: &[String], stats: bool) -> Result<()> {
    let mut setup = load_setup(file, name)?;
    for target in logs {
        setup.register_dev("LOG", &format!("log_{}", target), std::slice::from_ref(target))?;
    }
    let mut nl = setup.build()?;
    nl.set_use_stats(stats);

    nl.reset();
    let t = NetlistTime::from_fp(seconds);
    info!("Running {} for {:.6} seconds", file.display(), seconds);
    nl.process_queue(t);
    info!("Simulated to {:.6} s", nl.time().as_fp());
    nl.stop();

    for channel in nl.logs() {
        let path = format!("{}.log", channel.name);
        write_log(channel, BufWriter::new(File::create(&path)?))?;
        info!("Wrote {} samples to {}", channel.samples.len(), path);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    // statistics are reported at info level
    let verbose = match args.command {
        Command::Run { stats: true, .. } => args.verbose.max(1),
        _ => args.verbose,
    };
    init_logging(verbose, args.quiet);

    match args.command {
        Command::Run {
            file,
            name,
            time_to_run,
            logs,
            stats,
        } => run(&file, name.as_deref(), time_to_run, &logs, stats),
        Command::Validate { file, name } => {
            load_setup(&file, name.as_deref())?.build()?;
            println!("{}: ok", file.display());
            Ok(())
        }
        Command::Listdevices => {
            for (type_name, params) in Setup::new()?.device_types() {
                println!("{:<24} {}", type_name, params);
            }
            Ok(())
        }
    }
}
