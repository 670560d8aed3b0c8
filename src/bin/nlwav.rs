//! nlwav - convert netlist log files into wav, vcd or sampled tables.
//!
//! ```bash
//! nlwav -f vcdd -o x.vcd log_V*
//! nlwav -f wav -o x.wav log_V*
//! nlwav -f tab -o x.tab -s 0.0000005 -i 0.000001 -n 256 log_BLUE.log
//! ```

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};

use clap::{Parser, ValueEnum};
use log::{info, LevelFilter};
use netlist_core::{
    error::{NetlistError, Result},
    wav::{merge_logs, Aggregator, TabWriter, VcdFormat, VcdWriter, WavSink, WavWriter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Multichannel wav
    Wav,
    /// Analog VCD
    Vcda,
    /// Digital VCD, levels set by --high and --low
    Vcdd,
    /// Sampled table
    Tab,
}

/// Convert netlist log files into wav files
#[derive(Parser, Debug)]
#[command(name = "nlwav", author, version, about, long_about = None)]
struct Args {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Wav)]
    format: Format,

    /// Output file, `-` for stdout
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Sample rate of the wav output
    #[arg(short, long, default_value_t = 48000, help_heading = "wav options")]
    rate: u32,

    /// Amplification after mean correction
    #[arg(short, long, default_value_t = 10000.0, help_heading = "wav options")]
    amp: f64,

    /// Minimum input for high level
    #[arg(short = 'u', long, default_value_t = 2.0, help_heading = "vcdd options")]
    high: f64,

    /// Maximum input for low level
    #[arg(short, long, default_value_t = 1.0, help_heading = "vcdd options")]
    low: f64,

    /// Time when sampling starts
    #[arg(short, long, default_value_t = 0.0, help_heading = "tab options")]
    start: f64,

    /// Time between samples
    #[arg(short, long, default_value_t = 0.001, help_heading = "tab options")]
    increment: f64,

    /// Number of samples
    #[arg(short = 'n', long, default_value_t = 1_000_000, help_heading = "tab options")]
    samples: usize,

    /// Be verbose
    #[arg(short, long)]
    verbose: bool,

    /// Be quiet, no warnings
    #[arg(short, long)]
    quiet: bool,

    /// Input files, `-` reads stdin
    #[arg(value_name = "FILE", required = true)]
    inputs: Vec<String>,
}

/// Where converted data goes. Only files can patch the wav header.
enum Output {
    Stdout(io::Stdout),
    File(BufWriter<File>),
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout(s) => s.write(buf),
            Output::File(f) => f.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout(s) => s.flush(),
            Output::File(f) => f.flush(),
        }
    }
}

impl Seek for Output {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Output::Stdout(_) => Err(io::Error::new(io::ErrorKind::Unsupported, "stdout is not seekable")),
            Output::File(f) => f.seek(pos),
        }
    }
}

fn open_inputs(names: &[String]) -> Result<Vec<Box<dyn BufRead>>> {
    names
        .iter()
        .map(|name| -> Result<Box<dyn BufRead>> {
            if name == "-" {
                let mut buf = Vec::new();
                io::stdin().read_to_end(&mut buf)?;
                Ok(Box::new(io::Cursor::new(buf)))
            } else {
                let f = File::open(name).map_err(|e| NetlistError::FileReadError {
                    path: name.clone(),
                    source: e,
                })?;
                Ok(Box::new(BufReader::new(f)))
            }
        })
        .collect()
}

fn convert(args: &Args, mut inputs: Vec<Box<dyn BufRead>>, out: Output) -> Result<()> {
    let channels = inputs.len();
    match args.format {
        Format::Wav => {
            let seekable = matches!(out, Output::File(_));
            let channels = u16::try_from(channels)
                .map_err(|_| NetlistError::invalid_data("wav", format!("too many channels: {}", channels)))?;
            let wav = WavWriter::new(out, seekable, args.rate, channels)?;
            let sink = WavSink::new(wav, args.amp);
            let mut agg = Aggregator::new(sink, usize::from(channels), 1.0 / f64::from(args.rate));
            merge_logs(&mut inputs, &mut agg)?;
            let wav = agg.into_inner().into_writer();
            info!("{} bytes of sample data", wav.data_len());
            wav.finalize()?;
        }
        Format::Vcda | Format::Vcdd => {
            let format = if args.format == Format::Vcda {
                VcdFormat::Analog
            } else {
                VcdFormat::Digital
            };
            let mut vcd = VcdWriter::new(out, &args.inputs, format, args.high, args.low)?;
            merge_logs(&mut inputs, &mut vcd)?;
            vcd.finish()?;
        }
        Format::Tab => {
            let mut tab = TabWriter::new(out, channels, args.start, args.increment, args.samples);
            merge_logs(&mut inputs, &mut tab)?;
            info!("{} rows written", tab.rows());
            tab.finish()?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.quiet {
        LevelFilter::Error
    } else if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let inputs = open_inputs(&args.inputs)?;
    let out = if args.output == "-" {
        Output::Stdout(io::stdout())
    } else {
        Output::File(BufWriter::new(File::create(&args.output)?))
    };
    convert(&args, inputs, out)
}
