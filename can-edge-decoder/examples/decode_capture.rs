//! Capture replay tool
//!
//! Feeds a raw capture dump (8-byte edge records) through a `CanDecoder` in
//! 120-byte chunks, the read size of the capture device poll, and prints the
//! decoded frames.
//!
//! Usage:
//!   decode_capture <capture.bin> [--config <decoder.toml>] [--json]
//!   decode_capture --demo [--json]
//!
//! Example:
//!   RUST_LOG=debug decode_capture bus_dump.bin --config wiring.toml

use anyhow::{bail, Context, Result};
use can_edge_decoder::synth::{CaptureSynth, FrameSpec};
use can_edge_decoder::{CanDecoder, DecodeReport, DecoderConfig};
use std::env;
use std::fs;
use std::path::PathBuf;

const CHUNK_SIZE: usize = 120;

struct Options {
    capture: Option<PathBuf>,
    config: Option<PathBuf>,
    json: bool,
    demo: bool,
}

fn parse_args() -> Result<Options> {
    let mut options = Options {
        capture: None,
        config: None,
        json: false,
        demo: false,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a file argument")?;
                options.config = Some(PathBuf::from(path));
            }
            "--json" => options.json = true,
            "--demo" => options.demo = true,
            other if other.starts_with("--") => bail!("Unknown option: {}", other),
            other => options.capture = Some(PathBuf::from(other)),
        }
    }

    if options.capture.is_none() && !options.demo {
        bail!("Usage: decode_capture <capture.bin> [--config <decoder.toml>] [--json] | --demo");
    }
    Ok(options)
}

/// A short bus recording: two standard frames, an extended remote request
fn demo_capture(config: &DecoderConfig) -> Vec<u8> {
    let mut synth = CaptureSynth::new(config).starting_at(1_000);
    synth
        .frame(&FrameSpec::standard(0x650, &[0xAB, 0xCD]))
        .frame(&FrameSpec::standard(0x123, &[0x01, 0x02, 0x03]))
        .frame(&FrameSpec::extended(0x18DA_F110, &[]).with_dlc(8).remote());
    synth.finish()
}

fn print_text(report: &DecodeReport) {
    println!("=== DECODED FRAMES ===");
    for (index, frame) in report.frames.iter().enumerate() {
        let crc = if frame.crc_ok() { "ok" } else { "MISMATCH" };
        println!(
            "[{:3}] bits {:5}..{:5}  {}  CRC 0x{:04X} ({})",
            index,
            frame.bit_range().start,
            frame.bit_range().end,
            frame,
            frame.crc(),
            crc
        );
        for violation in frame.violations() {
            println!("        ! {}", violation);
        }
    }

    println!("\n=== SUMMARY ===");
    println!("Bits decoded: {}", report.bit_count);
    println!("Stuff bits removed: {}", report.stuff_positions.len());
    println!("Frames: {}", report.frames.len());
    if let Some(partial) = &report.incomplete {
        println!(
            "Incomplete frame at bit {} (stopped in {}, {} of {} bits)",
            partial.frame_start, partial.field, partial.available, partial.needed
        );
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let options = parse_args()?;

    let config = match &options.config {
        Some(path) => DecoderConfig::load(path)
            .with_context(|| format!("Failed to load decoder config {:?}", path))?,
        None => DecoderConfig::default(),
    };

    let capture = match &options.capture {
        Some(path) => fs::read(path).with_context(|| format!("Failed to read capture {:?}", path))?,
        None => demo_capture(&config),
    };

    let mut decoder = CanDecoder::with_config(config).context("Invalid decoder config")?;
    let mut restarts = 0;
    for chunk in capture.chunks(CHUNK_SIZE) {
        let ingest = decoder.ingest(chunk).context("Capture ingest failed")?;
        restarts += ingest.restarts.len();
    }
    if restarts > 0 {
        eprintln!("Capture restarted {} times; showing the last session", restarts);
    }

    let report = decoder.decode();
    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Session started {}", decoder.session_started().to_rfc3339());
        print_text(&report);
    }
    Ok(())
}
