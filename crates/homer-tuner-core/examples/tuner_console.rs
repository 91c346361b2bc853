//! Homer Tuner Bench Console
//!
//! Drives a tuner from the command line for bench testing.
//!
//! Usage:
//!   cargo run --example tuner_console -- [OPTIONS] <COMMAND> [ARGS]
//!
//! Options:
//!   --port PORT       Serial port (default: from settings file)
//!   --baud RATE       Baud rate (default: from settings file, else 9600)
//!   --fine            Treat `set` values as motor steps instead of dial units
//!   --save            Store the port and baud rate in the settings file
//!
//! Commands:
//!   ports             List serial ports
//!   home [N]          Home all stubs, or stub N (1..3)
//!   read              Print stub positions
//!   set A B C         Move stubs to dial values A, B, C
//!   stop              Hard stop all motors
//!   autotune on|off   Switch continuous autotuning
//!   step              Switch autotuning off, then one autotuning step
//!   tune-pos on|off   Send tune positions during measurement
//!   reset             Restart the instrument
//!   park              Home, read positions and close
//!
//! Set RUST_LOG=homer_tuner_core=debug to see wire traffic.

use anyhow::{bail, Context, Result};
use homer_tuner_core::protocol::list_ports;
use homer_tuner_core::{StepResolution, Tuner, TunerConfig};
use tracing_subscriber::EnvFilter;

fn parse_switch(arg: Option<&String>) -> Result<bool> {
    match arg.map(String::as_str) {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        other => bail!("expected on|off, got {:?}", other),
    }
}

fn print_help() {
    println!("Usage: tuner_console [--port PORT] [--baud RATE] [--fine] [--save] <COMMAND> [ARGS]");
    println!("Commands: ports, home [N], read, set A B C, stop, autotune on|off,");
    println!("          step, tune-pos on|off, reset, park");
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let settings_path = TunerConfig::default_path();
    let mut config = match &settings_path {
        Some(path) => TunerConfig::load_or_default(path)?,
        None => TunerConfig::default(),
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut save = false;
    let mut rest = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                i += 1;
                config.port_name = args.get(i).context("--port needs a value")?.clone();
            }
            "--baud" | "-b" => {
                i += 1;
                config.baud_rate = args
                    .get(i)
                    .context("--baud needs a value")?
                    .parse()
                    .context("invalid baud rate")?;
            }
            "--fine" => config.resolution = StepResolution::Fine,
            "--save" => save = true,
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            _ => rest.push(args[i].clone()),
        }
        i += 1;
    }

    if save {
        if let Some(path) = &settings_path {
            config.save(path)?;
            println!("Settings saved to {}", path.display());
        }
    }

    let Some(command) = rest.first().map(String::as_str) else {
        print_help();
        return Ok(());
    };

    if command == "ports" {
        for port in list_ports() {
            println!(
                "{}\t{}",
                port.name,
                port.product.as_deref().unwrap_or("")
            );
        }
        return Ok(());
    }

    if config.port_name.is_empty() {
        bail!("no serial port given; use --port or save one with --save");
    }

    let resolution = config.resolution;
    let mut tuner = Tuner::new(config);
    tuner
        .connect_configured()
        .with_context(|| format!("opening {}", tuner.config().port_name))?;

    match command {
        "home" => match rest.get(1) {
            Some(n) => tuner.selected_stub_home(n.parse().context("invalid stub number")?)?,
            None => tuner.all_stubs_home()?,
        },
        "read" => {
            let p = tuner.read_motor_positions()?;
            println!("{}", p);
        }
        "set" => {
            if rest.len() != 4 {
                bail!("set needs three values");
            }
            let mut steps = [0u16; 3];
            for (slot, arg) in steps.iter_mut().zip(&rest[1..]) {
                let dial: f64 = arg.parse().with_context(|| format!("invalid value {}", arg))?;
                *slot = resolution.to_steps(dial);
            }
            tuner.set_motor_positions(steps[0], steps[1], steps[2])?;
            println!("moved to {}, {}, {} steps", steps[0], steps[1], steps[2]);
        }
        "stop" => tuner.hard_stop_motors()?,
        "autotune" => tuner.autotuning(parse_switch(rest.get(1))?)?,
        "step" => {
            tuner.autotuning(false)?;
            tuner.single_autotuning_step()?;
        }
        "tune-pos" => tuner.send_tune_positions(parse_switch(rest.get(1))?)?,
        "reset" => tuner.reset()?,
        "park" => match tuner.park_and_close() {
            Some(p) => println!("parked at {}", p),
            None => println!("closed (positions unavailable)"),
        },
        other => bail!("unknown command {:?}", other),
    }

    tuner.close();
    Ok(())
}
