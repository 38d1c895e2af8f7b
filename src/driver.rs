//! Lifecycle driver: parse a configuration, install it under a master, run
//! the router threads, then service post-run handler calls and compute the
//! process exit status.

use anyhow::{Context, Result, anyhow};
use signal_hook::consts::{SIGINT, SIGPIPE, SIGTERM};
use signal_hook::flag;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use tracing::warn;

use crate::config::MasterConfig;
use crate::element::ElementRegistry;
use crate::error::RouterError;
use crate::handler::Handler;
use crate::master::Master;
use crate::parse;
use crate::router::{Router, install_config};

/// Everything the front-end decides before the driver takes over.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub config_text: String,
    pub threads: usize,
    pub allow_reconfigure: bool,
    pub output_flatconfig: Option<PathBuf>,
    pub quit_without_running: bool,
    pub handlers: Vec<String>,
    pub exit_handler: Option<String>,
    pub warnings: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        DriverOptions {
            config_text: String::new(),
            threads: 1,
            allow_reconfigure: false,
            output_flatconfig: None,
            quit_without_running: false,
            handlers: Vec::new(),
            exit_handler: None,
            warnings: true,
        }
    }
}

static INSTALL_SIGNALS: Once = Once::new();

// Interrupt and terminate stop the runcount; a second one force-exits.
// Broken pipes are ignored. Installed once, on first router installation.
fn install_signal_handlers(master: &Arc<Master>) {
    let stop = master.stop_flag();
    INSTALL_SIGNALS.call_once(move || {
        for sig in [SIGINT, SIGTERM] {
            let _ = flag::register_conditional_shutdown(sig, 1, Arc::clone(&stop));
            let _ = flag::register(sig, Arc::clone(&stop));
        }
        // SAFETY: the handler body is a no-op, which is async-signal-safe.
        unsafe {
            let _ = signal_hook::low_level::register(SIGPIPE, || {});
        }
    });
}

/// Register the `hotconfig` write handler on every router activated under
/// this master, wired to the hot-swap rendezvous.
pub fn enable_reconfigure(master: &Arc<Master>, registry: &Arc<ElementRegistry>, warnings: bool) {
    let master_hook = Arc::clone(master);
    let registry_hook = Arc::clone(registry);
    master.set_activation_hook(move |router| {
        let master = Arc::clone(&master_hook);
        let registry = Arc::clone(&registry_hook);
        router.add_handler(
            None,
            Handler::write("hotconfig", move |_, _, text| {
                let parsed = parse::parse_string(text).map_err(|e| {
                    anyhow::Error::new(RouterError::HotswapRejected(format!("{e:#}")))
                })?;
                if warnings && parsed.declarations.is_empty() {
                    warn!("[Driver] hot-swap configuration has no elements");
                }
                let staged = Router::parse(Arc::clone(&master), &registry, &parsed)
                    .map_err(|e| {
                        anyhow::Error::new(RouterError::HotswapRejected(format!("{e:#}")))
                    })?;
                master
                    .request_hotswap(Arc::new(staged))
                    .map_err(anyhow::Error::new)
            })
            .raw()
            .nonexclusive(),
        );
    });
}

// `element.handler` paths split at the first dot; no dot means router scope.
fn split_handler_path(path: &str) -> (Option<&str>, &str) {
    match path.split_once('.') {
        Some((element, handler)) => (Some(element), handler),
        None => (None, path),
    }
}

fn print_read_result(full_name: &str, result: &str, raw: bool, print_name: bool) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if print_name {
        let _ = writeln!(out, "{full_name}:");
    }
    let _ = out.write_all(result.as_bytes());
    if !raw && !result.is_empty() && !result.ends_with('\n') {
        let _ = out.write_all(b"\n");
    }
    if print_name {
        let _ = out.write_all(b"\n");
    }
}

fn call_one_read_handler(
    router: &Arc<Router>,
    eindex: Option<usize>,
    hname: &str,
    print_name: bool,
) -> Result<(), RouterError> {
    let result = router.call_read(eindex, hname)?;
    let raw = router
        .handler(eindex, hname)
        .map(|h| h.flags.raw)
        .unwrap_or(false);
    let full = match eindex {
        Some(i) => Handler::unparse_name(router.ename(i), hname),
        None => hname.to_string(),
    };
    print_read_result(&full, &result, raw, print_name);
    Ok(())
}

/// Call each `-h` handler spec, expanding wildcard and class patterns, and
/// print results to stdout. Returns the number of errors reported.
pub fn call_read_handlers(router: &Arc<Router>, specs: &[String]) -> usize {
    let print_names = specs.len() > 1;
    let mut errors = 0;

    for spec in specs {
        let (element_part, hname) = split_handler_path(spec);
        let Some(pattern) = element_part else {
            if let Err(e) = call_one_read_handler(router, None, hname, print_names) {
                eprintln!("{e}");
                errors += 1;
            }
            continue;
        };

        // Exact instance name: the handler must exist. Pattern or class
        // match: call it on every matching element that exposes it.
        if let Some(i) = router.find(pattern) {
            if let Err(e) = call_one_read_handler(router, Some(i), hname, print_names) {
                eprintln!("{e}");
                errors += 1;
            }
            continue;
        }

        match router.expand_element_pattern(pattern) {
            None => {
                if pattern.contains(['?', '*', '[']) {
                    eprintln!("no element matching '{pattern}'");
                } else {
                    eprintln!("no element '{pattern}'");
                }
                errors += 1;
            }
            Some(indexes) => {
                for i in indexes {
                    let readable = router
                        .handler(Some(i), hname)
                        .map(|h| h.read_visible())
                        .unwrap_or(false);
                    if readable
                        && let Err(e) = call_one_read_handler(router, Some(i), hname, true)
                    {
                        eprintln!("{e}");
                        errors += 1;
                    }
                }
            }
        }
    }
    errors
}

// The exit-handler value: an integer, else a boolean read as 0/1, else error.
fn parse_exit_value(text: &str) -> Result<i32> {
    let text = text.trim();
    if let Ok(v) = text.parse::<i32>() {
        return Ok(v);
    }
    match text {
        "true" => Ok(0),
        "false" => Ok(1),
        _ => Err(anyhow!("exit handler value should be integer")),
    }
}

/// Install, run, and introspect a router; returns the process exit status.
pub fn run_driver(opts: &DriverOptions, registry: Arc<ElementRegistry>) -> Result<i32> {
    let master = Master::new(MasterConfig::with_threads(opts.threads));

    let parsed = parse::parse_string(&opts.config_text).context("configuration parse failed")?;
    if opts.allow_reconfigure {
        enable_reconfigure(&master, &registry, opts.warnings);
    }

    let router =
        install_config(&master, &registry, &parsed, opts.warnings).map_err(|e| anyhow!("{e}"))?;

    install_signal_handlers(&master);
    router.activate();

    let mut exit_value = 0;

    if let Some(path) = &opts.output_flatconfig {
        let flat = router
            .call_read(None, "flatconfig")
            .map_err(|e| anyhow!("{e}"))?;
        if path.as_os_str() == "-" {
            print!("{flat}");
        } else if let Err(e) = std::fs::write(path, &flat) {
            eprintln!("{}: {e}", path.display());
            exit_value = 1;
        }
    }

    if !opts.quit_without_running && router.nelements() > 0 {
        master.run();
    } else if !opts.quit_without_running && opts.warnings {
        warn!("[Driver] configuration has no elements, exiting");
    }

    // A hot-swap may have replaced the router while the driver ran.
    let router = master.current_router().unwrap_or(router);

    if !opts.handlers.is_empty() && call_read_handlers(&router, &opts.handlers) > 0 {
        exit_value = 1;
    }

    if let Some(spec) = &opts.exit_handler {
        let (element_part, hname) = split_handler_path(spec);
        let eindex = match element_part {
            Some(name) => match router.find(name) {
                Some(i) => Some(i),
                None => {
                    eprintln!("no element '{name}'");
                    return Ok(-1);
                }
            },
            None => None,
        };
        match router.call_read(eindex, hname) {
            Err(e) => {
                eprintln!("{e}");
                exit_value = -1;
            }
            Ok(value) => match parse_exit_value(&value) {
                Ok(v) => exit_value = v,
                Err(e) => {
                    eprintln!("{e}");
                    exit_value = -1;
                }
            },
        }
    }

    Ok(exit_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_paths_split_at_first_dot() {
        assert_eq!(split_handler_path("q.size"), (Some("q"), "size"));
        assert_eq!(split_handler_path("flatconfig"), (None, "flatconfig"));
        assert_eq!(split_handler_path("a.b.c"), (Some("a"), "b.c"));
    }

    #[test]
    fn exit_values() {
        assert_eq!(parse_exit_value("7\n").unwrap(), 7);
        assert_eq!(parse_exit_value("true").unwrap(), 0);
        assert_eq!(parse_exit_value("false").unwrap(), 1);
        assert!(parse_exit_value("maybe").is_err());
    }
}
