//! objcache CLI
//!
//! Either `objcache <compiler> [args...]`, a symlink named after the
//! compiler, or one of the maintenance flags.

use clap::Parser;
use objcache::config::Config;
use objcache::logging::init_logging;
use objcache::{Invocation, Orchestrator, SignalHandler, TOOL_NAME};
use objcache_store::{EvictionPolicy, Housekeeper, LocalCache};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::process;

#[derive(Parser)]
#[command(name = "objcache")]
#[command(about = "Transparent compiler cache", version)]
struct Cli {
    /// Show hit and miss counters
    #[arg(long, short = 's')]
    show_stats: bool,

    /// Reset hit and miss counters
    #[arg(long, short = 'z')]
    zero_stats: bool,

    /// Remove every cache entry
    #[arg(long, short = 'C')]
    clear: bool,

    /// Print the effective configuration as JSON
    #[arg(long, short = 'c')]
    show_config: bool,

    /// Evict entries down to the configured size limit
    #[arg(long)]
    housekeeping: bool,

    /// With --housekeeping, report what would be removed without removing it
    #[arg(long, requires = "housekeeping")]
    dry_run: bool,

    /// Compiler command to run through the cache
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() {
    let argv: Vec<String> = std::env::args_os()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    let env: BTreeMap<String, String> = std::env::vars_os()
        .map(|(k, v)| {
            (
                k.to_string_lossy().into_owned(),
                v.to_string_lossy().into_owned(),
            )
        })
        .collect();

    if invoked_as_compiler(argv.first()) {
        process::exit(run_wrapped(argv, env));
    }

    let cli = Cli::parse_from(&argv);
    if !cli.command.is_empty() {
        process::exit(run_wrapped(cli.command, env));
    }

    let config = match Config::load(&env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: error: {}", TOOL_NAME, e);
            process::exit(1);
        }
    };
    init_logging(&config.log_level, env.get("RUST_LOG").map(String::as_str));

    if cli.show_config {
        run_show_config(&config);
    }
    if cli.zero_stats {
        run_zero_stats(&config);
    }
    if cli.clear {
        run_clear(&config);
    }
    if cli.housekeeping {
        run_housekeeping(&config, cli.dry_run);
    }
    if cli.show_stats {
        run_show_stats(&config);
    }
    if !(cli.show_config || cli.zero_stats || cli.clear || cli.housekeeping || cli.show_stats) {
        eprintln!("{}: no compiler given (see --help)", TOOL_NAME);
        process::exit(1);
    }
}

/// True when we were started through a symlink named after a compiler.
fn invoked_as_compiler(argv0: Option<&String>) -> bool {
    argv0
        .and_then(|a| Path::new(a).file_stem())
        .map(|stem| !stem.to_string_lossy().eq_ignore_ascii_case(TOOL_NAME))
        .unwrap_or(false)
}

fn run_wrapped(args: Vec<String>, env: BTreeMap<String, String>) -> i32 {
    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("{}: error: cannot determine working directory: {}", TOOL_NAME, e);
            return 1;
        }
    };

    let config = match Config::load(&env) {
        Ok(config) => config,
        Err(e) => {
            init_logging("warn", env.get("RUST_LOG").map(String::as_str));
            tracing::warn!(error = %e, "invalid configuration, running uncached");
            let mut config = Config::with_defaults(cwd.join(".objcache"));
            config.disable = true;
            config
        }
    };
    init_logging(&config.log_level, env.get("RUST_LOG").map(String::as_str));

    let handler = SignalHandler::new();
    if let Err(e) = handler.install() {
        tracing::debug!(error = %e, "failed to install interrupt handler");
    }

    let orchestrator = Orchestrator::new(config).with_signal_state(handler.state());
    let invocation = Invocation { args, env, cwd };
    let stdout = io::stdout();
    let stderr = io::stderr();
    match orchestrator.run(&invocation, &mut stdout.lock(), &mut stderr.lock()) {
        Ok(outcome) => {
            tracing::debug!(kind = ?outcome.kind, exit_code = outcome.exit_code, "done");
            outcome.exit_code
        }
        Err(e) => {
            eprintln!("{}: error: {}", TOOL_NAME, e);
            1
        }
    }
}

fn open_cache(config: &Config) -> LocalCache {
    match LocalCache::open(&config.dir) {
        Ok(cache) => cache.with_compression(config.compress),
        Err(e) => {
            eprintln!("Error opening cache {}: {}", config.dir.display(), e);
            process::exit(1);
        }
    }
}

fn run_show_config(config: &Config) {
    match config.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            process::exit(1);
        }
    }
}

fn run_show_stats(config: &Config) {
    let cache = open_cache(config);
    let stats = match cache.stats() {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("Error reading statistics: {}", e);
            process::exit(1);
        }
    };

    println!("Cache directory: {}", config.dir.display());
    println!("  Hits:   {}", stats.local_hits);
    println!("  Misses: {}", stats.local_misses);
    match stats.hit_ratio_percent() {
        Some(ratio) => println!("  Hit ratio: {:.1}%", ratio),
        None => println!("  Hit ratio: n/a"),
    }
    let policy = EvictionPolicy::size_based(config.max_cache_size);
    match Housekeeper::new(&cache, policy).usage() {
        Ok(usage) => {
            println!("  Entries: {}", usage.entries);
            println!("  Size: {} bytes", usage.bytes);
        }
        Err(e) => {
            eprintln!("Error measuring cache: {}", e);
            process::exit(1);
        }
    }
    if config.max_cache_size > 0 {
        println!("  Size limit: {} bytes", config.max_cache_size);
    }
}

fn run_zero_stats(config: &Config) {
    let cache = open_cache(config);
    if let Err(e) = cache.zero_stats() {
        eprintln!("Error resetting statistics: {}", e);
        process::exit(1);
    }
    println!("Statistics zeroed");
}

fn run_clear(config: &Config) {
    let cache = open_cache(config);
    let policy = EvictionPolicy::size_based(config.max_cache_size);
    match Housekeeper::new(&cache, policy).clear() {
        Ok(removed) => println!("Removed {} cache entries", removed),
        Err(e) => {
            eprintln!("Error clearing cache: {}", e);
            process::exit(1);
        }
    }
}

fn run_housekeeping(config: &Config, dry_run: bool) {
    let cache = open_cache(config);
    let mut policy = EvictionPolicy::size_based(config.max_cache_size);
    if dry_run {
        policy = policy.with_dry_run();
    }
    match Housekeeper::new(&cache, policy).run() {
        Ok(result) => {
            let verb = if dry_run { "would evict" } else { "evicted" };
            println!("Scanned {} items, {} {}", result.scanned, verb, result.evicted);
            println!("  Reclaimed: {} bytes", result.bytes_reclaimed());
            println!("  Orphans removed: {}", result.orphans_removed);
            for error in &result.errors {
                eprintln!("  Warning: {}", error);
            }
        }
        Err(e) => {
            eprintln!("Error running housekeeping: {}", e);
            process::exit(1);
        }
    }
}
