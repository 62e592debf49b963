//! rgbsync CLI
//!
//! Discovers RGB devices through one of the bundled backends and pushes colors through the
//! coalescing update pipeline.

use std::io::{self, Write};
use std::process;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::builder::EnumValueParser;
use clap::{crate_description, crate_name, crate_version, Arg, ArgAction, ArgMatches, Command, ValueEnum};
use log::{info, warn};

use rgbsync::{
    Color, DebugBackend, DebugDeviceSpec, DebugRecorder, DeviceFilter, DeviceKind, DeviceProvider,
    FlushFailure, FusionBackend, LedKey, ProviderRegistry, Result, RgbDeviceProvider, TriggerConfig,
    Zone,
};

/// Colors used to test the available zones.
const TESTCOLORS: [Color; 6] = [
    Color::RED,
    Color::GREEN,
    Color::BLUE,
    Color::MAGENTA,
    Color::YELLOW,
    Color::WHITE,
];

/// Available device backends.
#[derive(ValueEnum, Default, PartialEq, Eq, Debug, Copy, Clone)]
enum Backend {
    #[default]
    Fusion,
    Debug,
}

/// Runtime configuration.
struct Config {
    backend: Backend,
    trigger: TriggerConfig,
    filter: DeviceFilter,
    strict: bool,
}

impl Config {
    fn from_cli(matches: &ArgMatches) -> Result<Self> {
        let backend = matches.get_one::<Backend>("provider").copied().unwrap_or_default();

        let trigger = match matches.get_one::<f64>("update-rate") {
            Some(rate) => TriggerConfig::update_rate(*rate)?,
            None => TriggerConfig::default(),
        };

        let filter = match matches.get_many::<DeviceKind>("kind") {
            Some(kinds) => DeviceFilter::only(kinds.copied()),
            None => DeviceFilter::all(),
        };

        Ok(Self { backend, trigger, filter, strict: matches.get_flag("strict") })
    }
}

/// Initialized providers plus the debug frame recorder, if the debug backend is used.
struct Session {
    registry: ProviderRegistry,
    recorder: Option<DebugRecorder>,
}

impl Session {
    fn open(config: &Config) -> Result<Self> {
        let mut recorder = None;
        let mut provider: Box<dyn RgbDeviceProvider> = match config.backend {
            Backend::Fusion => Box::new(DeviceProvider::new(FusionBackend::new(), config.trigger)),
            Backend::Debug => {
                let backend = DebugBackend::new(vec![
                    DebugDeviceSpec::mainboard("Mainboard"),
                    DebugDeviceSpec::keyboard("Keyboard", 6, 22),
                    DebugDeviceSpec::strip("Strip", 60).honoring_alpha(),
                ]);
                recorder = Some(backend.recorder());
                Box::new(DeviceProvider::new(backend, config.trigger))
            },
        };

        provider.trigger().set_error_hook(Some(Arc::new(|failure: &FlushFailure| {
            warn!("Lost update for {}: {}", failure.subscriber, failure.error);
        })));

        if !provider.initialize(&config.filter, config.strict)? {
            return Err(rgbsync::Error::Initialization(format!(
                "no {} devices available",
                provider.vendor()
            )));
        }

        let mut registry = ProviderRegistry::new();
        registry.register(provider)?;

        Ok(Self { registry, recorder })
    }

    /// Stop all triggers and write whatever is still pending.
    fn flush(&self) -> Result<()> {
        // Stopping joins the delivery lanes, so no tick can race the final write.
        for provider in self.registry.providers() {
            provider.trigger().stop();
        }

        for device in self.registry.devices() {
            device.flush()?;
        }

        if let Some(recorder) = &self.recorder {
            for frame in recorder.take_frames() {
                info!("{} <- {} LED(s)", frame.device, frame.colors.len());
            }
        }

        Ok(())
    }

    fn close(mut self) -> Result<()> {
        self.registry.dispose_all()
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli();
    let result = Config::from_cli(&matches).and_then(|config| match matches.subcommand() {
        Some(("list", _)) => list(&config),
        Some(("zonetest", _)) => zonetest(&config),
        Some(("cycle", cycle_matches)) => cycle(&config, cycle_matches),
        Some(("set", set_matches)) => set(&config, set_matches),
        _ => set(&config, &matches),
    });

    if let Err(err) = result {
        eprintln!("\x1b[31mError:\x1b[0m {err}");
        process::exit(1);
    }
}

/// Print all discovered devices.
fn list(config: &Config) -> Result<()> {
    let session = Session::open(config)?;

    for device in session.registry.devices() {
        println!("{}", device.info());
        let leds: Vec<_> = device.leds().iter().map(ToString::to_string).collect();
        println!("  LEDs: {}", leds.join(", "));
    }

    session.close()
}

/// Apply a static color to the selected zones of every device exposing them.
fn set(config: &Config, matches: &ArgMatches) -> Result<()> {
    let zones: Vec<Zone> = match matches.get_many::<Zone>("zone") {
        Some(zones) => zones.copied().collect(),
        None => Zone::value_variants().to_vec(),
    };
    let color = required_color(matches);

    let session = Session::open(config)?;

    for device in session.registry.devices() {
        let updates: Vec<_> = zones
            .iter()
            .map(|zone| LedKey::Zone(*zone))
            .filter(|led| device.leds().contains(led))
            .map(|led| (led, color))
            .collect();

        if updates.is_empty() {
            println!("Skipping {}: none of the zones are available", device.name());
            continue;
        }

        device.set_colors(updates)?;
    }

    session.flush()?;
    println!("\x1b[32mSuccessfully applied changes.\x1b[0m");

    session.close()
}

/// Mark all zones in a unique color.
fn zonetest(config: &Config) -> Result<()> {
    println!("Are you sure you want to test the available RGB zones?");
    println!("\x1b[31mThis will overwrite your current lighting\x1b[0m.");
    print!(" [y/N] > ");
    let _ = io::stdout().flush();

    // Abort unless the user agrees to overwrite their lighting.
    if stdin_nextline().to_lowercase() != "y" {
        println!("Bailing out.");
        return Ok(());
    }

    let session = Session::open(config)?;

    println!("\nTesting available RGB zones...\n");

    for device in session.registry.devices() {
        for (zone, color) in Zone::value_variants().iter().zip(TESTCOLORS) {
            if !device.leds().contains(&LedKey::Zone(*zone)) {
                continue;
            }

            println!("Color for zone {:?} on {}: {}", zone, device.name(), color);
            device.set_color(*zone, color)?;
        }
    }

    session.flush()?;

    session.close()
}

/// Rotate through the test colors on every LED, letting the trigger throttle the writes.
fn cycle(config: &Config, matches: &ArgMatches) -> Result<()> {
    let seconds = matches.get_one::<u64>("seconds").copied().unwrap_or(5);
    let session = Session::open(config)?;

    let start = Instant::now();
    let end = start + Duration::from_secs(seconds);
    while Instant::now() < end {
        let step = (start.elapsed().as_millis() / 250) as usize;
        let color = TESTCOLORS[step % TESTCOLORS.len()];

        for device in session.registry.devices() {
            device.fill(color)?;
        }

        thread::sleep(Duration::from_millis(5));
    }

    session.flush()?;

    session.close()
}

/// Get clap CLI parameters.
fn cli() -> ArgMatches {
    let zone = Arg::new("zone")
        .help("Position of the LED")
        .long("zone")
        .short('z')
        .ignore_case(true)
        .action(ArgAction::Append)
        .value_parser(EnumValueParser::<Zone>::new());
    let color = Arg::new("color").help("LED color in RGB [0xRRGGBB]").long("color").short('c');

    Command::new(crate_name!())
        .version(crate_version!())
        .author("Christian Duerr <contact@christianduerr.com>")
        .about(crate_description!())
        .subcommand(Command::new("list").about("List available devices"))
        .subcommand(Command::new("zonetest").about("Test available RGB zones"))
        .subcommand(
            Command::new("set")
                .about("Apply a static color")
                .arg(zone.clone())
                .arg(color.clone()),
        )
        .subcommand(
            Command::new("cycle").about("Cycle colors on every LED").arg(
                Arg::new("seconds")
                    .help("Duration of the cycle in seconds")
                    .long("seconds")
                    .short('s')
                    .value_parser(clap::value_parser!(u64)),
            ),
        )
        .arg(
            Arg::new("provider")
                .help("Device provider")
                .long("provider")
                .short('p')
                .global(true)
                .ignore_case(true)
                .value_parser(EnumValueParser::<Backend>::new()),
        )
        .arg(
            Arg::new("update-rate")
                .help("Device updates per second")
                .long("update-rate")
                .short('r')
                .global(true)
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("kind")
                .help("Only load devices of this kind")
                .long("kind")
                .short('k')
                .global(true)
                .ignore_case(true)
                .action(ArgAction::Append)
                .value_parser(EnumValueParser::<DeviceKind>::new()),
        )
        .arg(
            Arg::new("strict")
                .help("Abort if any device fails to initialize")
                .long("strict")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(zone)
        .arg(color)
        .get_matches()
}

/// Read the color option from CLI or prompt for STDIN if not present.
fn required_color<T: FromStr>(matches: &ArgMatches) -> T {
    match matches.get_one::<String>("color").map(|value| T::from_str(value)) {
        Some(Ok(value)) => return value,
        Some(Err(_)) => eprintln!("\x1b[31mInvalid CLI color parameter.\x1b[0m\n"),
        _ => (),
    }

    loop {
        // Query the user for the option.
        print!("Please select a color (format: 0xRRGGBB):\n > ");
        let _ = io::stdout().flush();

        let input = stdin_nextline();

        match T::from_str(&input) {
            Ok(value) => {
                println!();
                break value;
            },
            Err(_) => eprintln!(
                "\x1b[31mColor '{}' does not match format 0xRRGGBB, please try again.\x1b[0m\n",
                input
            ),
        }
    }
}

/// Read next line from STDIN.
#[inline]
fn stdin_nextline() -> String {
    let mut input = String::new();

    let _ = io::stdin().read_line(&mut input);
    input = input.trim().to_string();

    input
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testcolors_match_zones() {
        assert_eq!(Zone::value_variants().len(), TESTCOLORS.len());
    }
}
