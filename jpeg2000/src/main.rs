use clap::error::ErrorKind;
use clap::Parser;
use log::{debug, error};
use std::fmt;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use jp2::{decode_jp2, has_jp2_signature};
use jpc::{
    ByteStream, DecodeError, Decoder, DecoderConfig, EventHandler, Outcome, TileProgress,
    UncompressedCodec,
};

const CODESTREAM_SIGNATURE: [u8; 4] = [0xFF, 0x4F, 0xFF, 0x51];

#[derive(Debug)]
enum CliError {
    InputStream,
    Codec,
    Setup,
    Header,
    Decode,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InputStream => write!(f, "Failed to create input stream"),
            Self::Codec => write!(f, "Failed to create codec"),
            Self::Setup => write!(f, "Failed to set up decoder"),
            Self::Header => write!(f, "Failed to read the image header"),
            Self::Decode => write!(f, "Failed to decode the image"),
        }
    }
}

/// Decode a JP2 file or raw codestream tile by tile.
#[derive(Parser)]
#[clap(version)]
struct Opts {
    /// Path to .jp2 or .j2k file
    path: String,

    /// Largest number of components accepted in the SIZ marker segment
    #[clap(long)]
    max_components: Option<u16>,

    /// Largest component bit depth accepted (at most 31)
    #[clap(long)]
    max_bit_depth: Option<u8>,

    /// Largest total number of samples over all components
    #[clap(long)]
    max_image_samples: Option<u64>,

    /// Reconstruct tiles on the rayon thread pool
    #[cfg(feature = "parallel")]
    #[clap(long)]
    parallel: bool,

    /// Exit with a failure status when a tile fails to decode
    #[clap(long)]
    fail_on_tile_error: bool,
}

impl Opts {
    fn config(&self) -> DecoderConfig {
        let defaults = DecoderConfig::default();
        DecoderConfig {
            max_components: self.max_components.unwrap_or(defaults.max_components),
            max_bit_depth: self.max_bit_depth.unwrap_or(defaults.max_bit_depth),
            max_image_samples: self.max_image_samples.unwrap_or(defaults.max_image_samples),
        }
    }
}

/// Library events on the console, informational ones on stdout.
struct ConsoleEvents;

impl EventHandler for ConsoleEvents {
    fn on_info(&self, message: &str) {
        println!("INFO: {}", message);
    }

    fn on_warning(&self, message: &str) {
        eprintln!("WARNING: {}", message);
    }

    fn on_error(&self, message: &str) {
        eprintln!("ERROR: {}", message);
    }
}

enum InputKind {
    Container,
    Codestream,
}

fn sniff(stream: &mut ByteStream) -> io::Result<Option<InputKind>> {
    let length = stream.len().min(12) as usize;
    let bytes = stream.read(length)?;
    stream.seek(0)?;

    if has_jp2_signature(&bytes) {
        Ok(Some(InputKind::Container))
    } else if bytes.starts_with(&CODESTREAM_SIGNATURE) {
        Ok(Some(InputKind::Codestream))
    } else {
        Ok(None)
    }
}

fn report(progress: TileProgress<'_>) {
    match progress {
        TileProgress::Started(i) => println!("Decoding tile {}...", i),
        TileProgress::Decoded(i) => println!("Tile {} decoded successfully.", i),
        TileProgress::Failed(i, reason) => {
            debug!("{}", reason);
            eprintln!("Failed to decode tile {}. Quitting.", i);
        }
    }
}

fn run(opts: &Opts) -> Result<Outcome, CliError> {
    let mut stream = ByteStream::open(&opts.path).map_err(|e| {
        error!("{}: {}", opts.path, e);
        CliError::InputStream
    })?;

    let kind = sniff(&mut stream)
        .map_err(|e| {
            error!("{}: {}", opts.path, e);
            CliError::Codec
        })?
        .ok_or(CliError::Codec)?;

    if let InputKind::Container = kind {
        let jp2 = decode_jp2(&mut stream).map_err(|e| {
            error!("{}", e);
            CliError::Header
        })?;
        let (start, end) = jp2.codestream_range().ok_or(CliError::Header)?;
        stream.seek(start).map_err(|e| {
            error!("{}", e);
            CliError::Header
        })?;
        stream.limit(end);
    }

    let mut decoder = Decoder::new(Arc::new(UncompressedCodec), Box::new(ConsoleEvents));
    decoder.setup(opts.config()).map_err(|_| CliError::Setup)?;
    decoder.read_header(stream).map_err(|_| CliError::Header)?;

    let (Some(header), Some(partition)) = (decoder.header(), decoder.partition()) else {
        return Err(CliError::Header);
    };
    println!("Image info:");
    println!(
        "Width: {}, Height: {}",
        header.component_width(0).unwrap_or(0),
        header.component_height(0).unwrap_or(0)
    );
    println!(
        "Number of tiles (X, Y): ({}, {})",
        partition.tiles_x(),
        partition.tiles_y()
    );
    println!("Total number of tiles: {}", partition.total_tiles());

    let outcome = decode(&mut decoder, opts);
    decoder.close();

    outcome.map_err(|e| {
        error!("{}", e);
        CliError::Decode
    })
}

#[cfg(feature = "parallel")]
fn decode(decoder: &mut Decoder, opts: &Opts) -> Result<Outcome, DecodeError> {
    if opts.parallel {
        decoder.decode_tiles_parallel(report)
    } else {
        decoder.decode_tiles(report)
    }
}

#[cfg(not(feature = "parallel"))]
fn decode(decoder: &mut Decoder, _opts: &Opts) -> Result<Outcome, DecodeError> {
    decoder.decode_tiles(report)
}

fn main() -> ExitCode {
    env_logger::init();

    let opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                let program = std::env::args().next().unwrap_or_else(|| "jp2tiles".into());
                eprintln!("Usage: {} <input.jp2>", program);
                return ExitCode::FAILURE;
            }
        },
    };

    match run(&opts) {
        Ok(Outcome::Aborted(_)) if opts.fail_on_tile_error => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
