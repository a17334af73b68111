use clap::Parser;
use std::path::PathBuf;

use repacker_core::{run, RepackSettings};

#[derive(Debug, Parser)]
#[command(name = "repacker", version, about = "Cartridge table decoder and repacker")]
struct Args {
    #[arg(long, required_unless_present = "settings")]
    input: Option<PathBuf>,

    #[arg(long, required_unless_present = "settings")]
    output: Option<PathBuf>,

    /// Load every option from a JSON settings file instead.
    #[arg(long, value_name = "JSON", conflicts_with_all = ["input", "output"])]
    settings: Option<PathBuf>,

    /// Write the decoded records as JSON.
    #[arg(long, value_name = "JSON")]
    dump: Option<PathBuf>,

    /// Accept images whose CRC32 does not match the supported one.
    #[arg(long, default_value_t = false)]
    skip_crc: bool,

    /// Re-decode the repacked image and compare every record.
    #[arg(long, default_value_t = false)]
    verify: bool,

    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn settings_from_args(args: Args) -> Result<RepackSettings, repacker_core::RepackError> {
    if let Some(path) = args.settings.as_ref() {
        let mut settings = RepackSettings::from_json_file(path)?;
        settings.debug |= args.debug;
        settings.verify_round_trip |= args.verify;
        settings.verify_crc &= !args.skip_crc;
        if args.dump.is_some() {
            settings.dump_path = args.dump;
        }
        return Ok(settings);
    }

    match (args.input, args.output) {
        (Some(input_path), Some(output_path)) => Ok(RepackSettings {
            input_path,
            output_path,
            verify_crc: !args.skip_crc,
            verify_round_trip: args.verify,
            dump_path: args.dump,
            debug: args.debug,
        }),
        _ => Err(repacker_core::RepackError::Config(
            "--input and --output are required without --settings".to_string(),
        )),
    }
}

fn main() {
    let args = Args::parse();
    let debug = args.debug;

    let settings = match settings_from_args(args) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };

    let level = if debug || settings.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(settings) {
        log::error!("repack failed");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
