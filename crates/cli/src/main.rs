//! CLI entry point for hevcify
//!
//! Parses command line arguments, sets up logging and runs one batch.

use clap::{Args, Parser, Subcommand};
use hevcify::{BatchOptions, BatchRunner, Config, OverwritePolicy};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// hevcify - batch re-encode a video library to HEVC
#[derive(Parser, Debug)]
#[command(name = "hevcify")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transcode every video under a directory to the target codec
    Tohevc(TohevcArgs),
}

#[derive(Args, Debug)]
struct TohevcArgs {
    /// Directory to scan
    #[arg(long)]
    dir: PathBuf,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Also re-encode files already in the target codec
    #[arg(long = "re")]
    re_encode: bool,

    /// Constant rate factor, lower is higher quality (default from config, 34)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=51))]
    crf: Option<u8>,

    /// Answer yes to every overwrite prompt
    #[arg(short = 'y', long, conflicts_with = "no")]
    yes: bool,

    /// Answer no to every overwrite prompt
    #[arg(short = 'N', long)]
    no: bool,

    /// Show the encoder's own overwrite prompts and forward your answers
    #[arg(long, conflicts_with_all = ["yes", "no"])]
    pass_through: bool,

    /// Append this suffix to the source path instead of inserting a marker
    #[arg(long)]
    suffix: Option<String>,

    /// Write into an .mp4 container
    #[arg(long)]
    force_mp4: bool,

    /// Path to a config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, hevcify::config::ConfigError> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration");
            Config::load(path)
        }
        None => Config::from_env(),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let Command::Tohevc(args) = cli.command;

    let config = match load_config(args.config.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let opts = BatchOptions {
        root: args.dir,
        recursive: args.recursive,
        re_encode: args.re_encode,
        crf: args.crf,
        policy: OverwritePolicy::from_flags(args.yes, args.no, args.pass_through),
        suffix_override: args.suffix,
        force_mp4: args.force_mp4,
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(async {
        let runner = BatchRunner::new(config)?;
        runner.run(&opts).await
    });

    match outcome {
        Ok(report) => {
            print!("{}", report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<TohevcArgs, clap::Error> {
        let mut argv = vec!["hevcify", "tohevc"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).map(|cli| match cli.command {
            Command::Tohevc(a) => a,
        })
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_dir_is_required() {
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--dir", "/media"]).unwrap();
        assert_eq!(args.dir, PathBuf::from("/media"));
        assert!(!args.recursive);
        assert!(!args.re_encode);
        assert_eq!(args.crf, None);
        assert_eq!(
            OverwritePolicy::from_flags(args.yes, args.no, args.pass_through),
            OverwritePolicy::AskInteractively
        );
    }

    #[test]
    fn test_all_flags() {
        let args = parse(&[
            "--dir", "/media", "-r", "--re", "--crf", "28", "-y", "--suffix", ".out", "--force-mp4",
        ])
        .unwrap();
        assert!(args.recursive);
        assert!(args.re_encode);
        assert_eq!(args.crf, Some(28));
        assert!(args.yes);
        assert_eq!(args.suffix.as_deref(), Some(".out"));
        assert!(args.force_mp4);
    }

    #[test]
    fn test_yes_and_no_conflict() {
        assert!(parse(&["--dir", "/media", "-y", "-N"]).is_err());
        assert!(parse(&["--dir", "/media", "-N", "--pass-through"]).is_err());
    }

    #[test]
    fn test_crf_out_of_range() {
        assert!(parse(&["--dir", "/media", "--crf", "52"]).is_err());
        assert!(parse(&["--dir", "/media", "--crf", "51"]).is_ok());
    }
}
