// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

mod config;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{error, info};
use std::path::PathBuf;

use ied_common::error::status_of;
use ied_common::IedError;
use ied_vm::sim::SimHardware;
use ied_vm::{execute_script, execute_script_table, CompareMode, Endpoint, ExecStats, TableMatch};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum MatchMode {
    Eq,
    Ge,
}

impl From<MatchMode> for CompareMode {
    fn from(mode: MatchMode) -> Self {
        match mode {
            MatchMode::Eq => CompareMode::Eq,
            MatchMode::Ge => CompareMode::Ge,
        }
    }
}

/// ied-run - VBIOS IED script runner
#[derive(Parser, Debug)]
#[command(
    name = "ied-run",
    version,
    about = "Run VBIOS IED scripts against simulated display hardware"
)]
struct Args {
    /// Path to the raw firmware image holding the scripts
    #[arg(short, long)]
    image: PathBuf,

    /// Offset of the script (or script table) inside the image
    #[arg(short, long, value_parser = parse_offset)]
    script: u32,

    /// Offset of the condition table inside the image
    #[arg(long, value_parser = parse_offset, default_value = "0")]
    condition_table: u32,

    /// AUX channel used for DPCD access
    #[arg(long, default_value_t = 0)]
    aux_port: u8,

    /// Output resource index used for register patching
    #[arg(long, default_value_t = 0)]
    or_index: u8,

    /// Link index used for register patching
    #[arg(long, default_value_t = 0)]
    link_index: u8,

    /// Treat --script as a script table and select an entry by this value
    #[arg(long)]
    match_value: Option<u16>,

    /// Script table key width in bytes
    #[arg(long, default_value_t = 1)]
    match_width: u8,

    /// Script table comparison
    #[arg(long, value_enum, default_value_t = MatchMode::Ge)]
    match_mode: MatchMode,

    /// Path to an INI file with interpreter settings and initial hardware state
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_offset(s: &str) -> std::result::Result<u32, String> {
    config::parse_number(s).ok_or_else(|| format!("invalid offset: {s}"))
}

/// Status line for a finished run. Hardware transport failures are told
/// apart from errors in the script itself.
fn outcome(result: &std::result::Result<ExecStats, IedError>) -> String {
    let status = status_of(result);
    match result {
        Ok(_) => format!("finished with status {}", status),
        Err(e) if e.is_transport() => format!("hardware access failed with status {}", status),
        Err(_) => format!("rejected with status {}", status),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    let run_config = config::load_config(args.config.as_deref())?;
    info!(
        "Max call depth {}, IP wrap {:?}, poll interval {} us",
        run_config.settings.max_call_depth,
        run_config.settings.ip_wrap,
        run_config.settings.poll_interval_us
    );

    let image = std::fs::read(&args.image)
        .with_context(|| format!("Failed to read image: {}", args.image.display()))?;
    info!("Loaded image: {} ({} bytes)", args.image.display(), image.len());

    let mut hw = SimHardware::new(image);
    run_config.apply(&mut hw);
    let image_ref = hw.image_ref();

    let endpoint = Endpoint {
        aux_port: args.aux_port,
        or_index: args.or_index,
        link_index: args.link_index,
    };

    let settings = &run_config.settings;
    let result = match args.match_value {
        Some(value) => {
            let table = TableMatch::new(value, args.match_width, args.match_mode.into());
            execute_script_table(
                &mut hw,
                settings,
                image_ref,
                args.script,
                args.condition_table,
                endpoint,
                table,
            )
        }
        None => execute_script(
            &mut hw,
            settings,
            image_ref,
            args.script,
            args.condition_table,
            endpoint,
        ),
    };

    for event in hw.trace() {
        println!("{}", event);
    }

    let summary = outcome(&result);
    match result {
        Ok(stats) => {
            info!(
                "Script {}: {} instructions ({} skipped), max depth {}, {} us simulated",
                summary,
                stats.instructions,
                stats.skipped,
                stats.max_depth,
                hw.elapsed_us()
            );
            Ok(())
        }
        Err(e) => {
            error!("Script {}", summary);
            Err(e).with_context(|| format!("Script at 0x{:04X} failed", args.script))
        }
    }
}
