use anyhow::{bail, Context, Result};
use clap::Parser;
use fami_core::logging::{LogCategory, LogConfig, LogLevel};
use fami_core::TimingMode;
use fami_driver::{Document, PlayerConfig, PlayerSnapshot, SoundDriver};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

mod demo;
#[cfg(feature = "playback")]
mod playback;

#[derive(Parser)]
#[command(name = "famiplay", about = "Render tracker songs on emulated NES sound chips")]
struct Args {
    /// Song as JSON; the built-in demo plays when omitted
    song: Option<PathBuf>,

    /// Engine and driver settings as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the song's machine: "ntsc" or "pal"
    #[arg(long)]
    machine: Option<String>,

    /// Frame to start from
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Number of ticks to render
    #[arg(long, default_value_t = 600)]
    ticks: u64,

    /// Print one line of channel meters per row
    #[arg(long, default_value_t = false)]
    meters: bool,

    /// Print the final register state
    #[arg(long, default_value_t = false)]
    registers: bool,

    /// Suppress all per-row output (still writes --save)
    #[arg(long, default_value_t = false)]
    quiet: bool,

    /// Dump the final player snapshot to this file as JSON
    #[arg(long)]
    save: Option<PathBuf>,

    /// Write the built-in demo song to this file and exit
    #[arg(long)]
    dump_demo: Option<PathBuf>,

    /// Level for every core log category: off, error, warn, info, debug, trace
    #[arg(long, default_value = "off")]
    log_level: String,

    /// Per-category levels, e.g. "driver=debug,chip=trace"
    #[arg(long)]
    log: Option<String>,

    /// Play through the default audio device instead of rendering silently
    #[cfg(feature = "playback")]
    #[arg(long, default_value_t = false)]
    play: bool,
}

fn configure_logging(args: &Args) -> Result<()> {
    let config = LogConfig::global();
    let Some(level) = LogLevel::from_str(&args.log_level) else {
        bail!("Unknown log level: {}", args.log_level);
    };
    config.set_global_level(level);

    for entry in args.log.iter().flat_map(|s| s.split(',')) {
        let Some((category, level)) = entry.split_once('=') else {
            bail!("Expected category=level, got {entry:?}");
        };
        let Some(category) = LogCategory::from_str(category.trim()) else {
            bail!("Unknown log category: {category}");
        };
        let Some(level) = LogLevel::from_str(level.trim()) else {
            bail!("Unknown log level: {level}");
        };
        config.set_level(category, level);
    }
    Ok(())
}

fn parse_machine(name: &str) -> Result<TimingMode> {
    match name.to_ascii_lowercase().as_str() {
        "ntsc" => Ok(TimingMode::Ntsc),
        "pal" => Ok(TimingMode::Pal),
        other => bail!("Unsupported machine: {}", other),
    }
}

fn meter_line(snapshot: &PlayerSnapshot) -> String {
    let mut out = format!("{:02X}:{:02X} |", snapshot.frame, snapshot.row);
    for channel in &snapshot.channels {
        let note = channel.note.as_deref().unwrap_or("...");
        let bar = (channel.level.clamp(0.0, 1.0) * 4.0).round() as usize;
        out.push_str(&format!(" {:<4}{:>3} {:<4}|", channel.name, note, "#".repeat(bar)));
    }
    out
}

fn print_registers(snapshot: &PlayerSnapshot) {
    let mut chip = None;
    for reg in &snapshot.registers {
        if chip != Some(reg.chip) {
            chip = Some(reg.chip);
            println!("{:?}", reg.chip);
        }
        let mark = if reg.changed { '*' } else { ' ' };
        println!("  ${:04X} = {:02X}{}", reg.key, reg.value, mark);
    }
}

/// Run the driver on this thread without an audio device
fn render(driver: &mut SoundDriver, args: &Args) -> (u64, usize, i16) {
    let mut samples = 0;
    let mut peak = 0i16;
    let mut position = None;
    let mut ticks = 0;
    while ticks < args.ticks && driver.is_playing() {
        let out = driver.tick();
        ticks += 1;
        samples += out.len();
        peak = out
            .iter()
            .map(|s| s.saturating_abs())
            .fold(peak, i16::max);
        if args.meters && !args.quiet && position != Some(driver.position()) {
            position = Some(driver.position());
            println!("{}", meter_line(&driver.snapshot()));
        }
    }
    (ticks, samples, peak)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    configure_logging(&args)?;

    if let Some(path) = &args.dump_demo {
        let mut f = File::create(path)?;
        write!(f, "{}", serde_json::to_string_pretty(&demo::song())?)?;
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => PlayerConfig::default(),
    };
    let mut doc = match &args.song {
        Some(path) => Document::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => demo::song(),
    };
    if let Some(machine) = &args.machine {
        doc.machine = parse_machine(machine)?;
    }
    if args.start >= doc.frame_count() {
        bail!("Song has {} frames, cannot start at {}", doc.frame_count(), args.start);
    }

    let mut driver = SoundDriver::from_config(&config)?;
    if !args.quiet {
        println!(
            "{} ({:?}, {} channels)",
            if doc.title.is_empty() { "untitled" } else { doc.title.as_str() },
            doc.machine,
            doc.channels().len()
        );
    }
    driver.load_document(Arc::new(doc))?;
    driver.start(args.start)?;

    #[cfg(feature = "playback")]
    if args.play {
        let mut position = None;
        let limit = args.ticks;
        let (meters, quiet) = (args.meters, args.quiet);
        driver = playback::play(
            driver,
            config.engine.sample_rate,
            config.engine.channels,
            |handle| {
                let snapshot = handle.snapshot();
                if meters && !quiet && position != Some((snapshot.frame, snapshot.row)) {
                    position = Some((snapshot.frame, snapshot.row));
                    println!("{}", meter_line(&snapshot));
                }
                snapshot.playing && snapshot.ticks < limit
            },
        )?;
        return finish(&driver, &args);
    }

    let (ticks, samples, peak) = render(&mut driver, &args);
    if !args.quiet {
        let seconds = samples as f64
            / (config.engine.sample_rate as f64 * config.engine.channels as f64);
        println!(
            "Rendered {} ticks, {} samples ({:.2}s), peak {}",
            ticks, samples, seconds, peak
        );
    }
    finish(&driver, &args)
}

fn finish(driver: &SoundDriver, args: &Args) -> Result<()> {
    let snapshot = driver.snapshot();
    if args.registers && !args.quiet {
        print_registers(&snapshot);
    }
    if let Some(path) = &args.save {
        let mut f = File::create(path)?;
        write!(f, "{}", serde_json::to_string_pretty(&snapshot)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fami_driver::DriverConfig;
    use fami_core::EngineConfig;

    #[test]
    fn demo_renders_audio() {
        let args = Args::parse_from(["famiplay", "--ticks", "120", "--quiet"]);
        let mut driver = SoundDriver::new(EngineConfig::default(), DriverConfig::default()).unwrap();
        driver.load_document(Arc::new(demo::song())).unwrap();
        driver.start(0).unwrap();
        let (ticks, samples, peak) = render(&mut driver, &args);
        assert_eq!(ticks, 120);
        assert!(samples > 90_000);
        assert!(peak > 0);
    }

    #[test]
    fn log_flags_are_parsed() {
        let args = Args::parse_from(["famiplay", "--log", "driver=debug,nonsense=warn"]);
        assert!(configure_logging(&args).is_err());
        assert!(parse_machine("PAL").is_ok());
        assert!(parse_machine("dendy").is_err());
    }
}
