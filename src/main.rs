use std::path::PathBuf;

use clap::{AppSettings, Parser};
use log::info;

use callisto_quicklook::batch;

#[derive(Parser)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_long_args = true)]
#[clap(about = "Render quicklook images for a directory of e-Callisto observation files")]
struct Args {
    /// The directory to search for observation files.
    #[clap(default_value = ".")]
    dir: PathBuf,

    /// The number of concurrent workers.
    #[clap(short, long, default_value_t = batch::DEFAULT_WORKERS)]
    workers: usize,

    /// Prefix for output image names (usually the station name).
    #[clap(short, long, default_value = "")]
    prefix: String,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences))]
    verbosity: u8,

    /// Disable progress bars.
    #[clap(long)]
    no_progress_bars: bool,
}

fn main() {
    let args = Args::parse();
    setup_logging(args.verbosity);

    match batch::run_batch(
        &args.dir,
        &args.prefix,
        args.workers,
        args.no_progress_bars,
    ) {
        Ok(summary) => {
            if !summary.all_succeeded() {
                eprintln!(
                    "{} of {} files failed to process",
                    summary.failed, summary.total
                );
                std::process::exit(1);
            }
            info!("Processed {} files", summary.total);
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn setup_logging(verbosity: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        2 => builder.filter_level(log::LevelFilter::Trace),
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
            builder.format(|buf, record| {
                use std::io::Write;

                let timestamp = buf.timestamp();
                let level = record.level();
                let target = record.target();
                let line = record.line().unwrap_or(0);
                let message = record.args();

                writeln!(buf, "[{timestamp} {level} {target}:{line}] {message}")
            })
        }
    };
    builder.init();
}
