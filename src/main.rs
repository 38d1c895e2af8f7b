use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use pipeworks::driver::{DriverOptions, run_driver};
use pipeworks::elements::default_registry;
use pipeworks::utils::logger::LoggerConfig;

/// Runs a pipeworks router configuration at user level: installs the
/// configuration, reporting any errors to standard error, and then generally
/// runs until interrupted.
#[derive(Parser, Debug)]
#[command(name = "pipeworks", version, disable_help_flag = true)]
struct Cli {
    /// Read router configuration from FILE ('-' for stdin)
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: Option<PathBuf>,

    /// Use EXPR as router configuration
    #[arg(short = 'e', long = "expression", value_name = "EXPR")]
    expression: Option<String>,

    /// Start N router threads
    #[arg(long, value_name = "N", default_value_t = 1)]
    threads: usize,

    /// Provide a writable 'hotconfig' handler
    #[arg(short = 'R', long = "allow-reconfigure")]
    allow_reconfigure: bool,

    /// Call ELEMENT.H read handler after running and print the result
    #[arg(short = 'h', long = "handler", value_name = "ELEMENT.H")]
    handlers: Vec<String>,

    /// Use ELEMENT.H read handler value for exit status
    #[arg(short = 'x', long = "exit-handler", value_name = "ELEMENT.H")]
    exit_handler: Option<String>,

    /// Write flat configuration to FILE ('-' for stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Do not run the driver
    #[arg(short = 'q', long = "quit")]
    quit: bool,

    /// Do not print warnings
    #[arg(short = 'w', long = "no-warnings")]
    no_warnings: bool,

    /// Print this message and exit
    #[arg(long = "help", action = ArgAction::Help)]
    help: Option<bool>,

    /// Router configuration file (same as --file)
    #[arg(value_name = "ROUTERFILE")]
    router_file: Option<PathBuf>,
}

fn load_config_text(cli: &Cli) -> Result<String> {
    let sources =
        usize::from(cli.expression.is_some()) + usize::from(cli.file.is_some() || cli.router_file.is_some());
    if cli.file.is_some() && cli.router_file.is_some() {
        bail!("router configuration specified twice");
    }
    if sources > 1 {
        bail!("router configuration specified twice");
    }

    if let Some(expr) = &cli.expression {
        return Ok(expr.clone());
    }
    let path = cli.file.as_ref().or(cli.router_file.as_ref());
    match path {
        None => bail!("no router configuration (use --file or --expression)"),
        Some(p) if p.as_os_str() == "-" => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("reading configuration from stdin")?;
            Ok(text)
        }
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("{}", p.display())),
    }
}

fn main() {
    let cli = Cli::parse();
    let _log_guard = LoggerConfig::from_env().init().ok().flatten();

    let config_text = match load_config_text(&cli) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("pipeworks: {e:#}");
            std::process::exit(1);
        }
    };

    let opts = DriverOptions {
        config_text,
        threads: cli.threads,
        allow_reconfigure: cli.allow_reconfigure,
        output_flatconfig: cli.output,
        quit_without_running: cli.quit,
        handlers: cli.handlers,
        exit_handler: cli.exit_handler,
        warnings: !cli.no_warnings,
    };

    match run_driver(&opts, Arc::new(default_registry())) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("pipeworks: {e:#}");
            std::process::exit(1);
        }
    }
}
