use std::env;
use std::path::PathBuf;

use glimpse_sw::config::StorageBackend;
use glimpse_sw::AppConfig;

fn print_usage() {
    eprintln!("Usage: glimpse-sw [OPTIONS]");
    eprintln!();
    eprintln!("Caching proxy that serves a Glimpse site with offline support.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <PATH>       Config file (default: $XDG_CONFIG_HOME/glimpse-sw/config.toml)");
    eprintln!("  --host <HOST>         Bind address (default: 127.0.0.1)");
    eprintln!("  --port <PORT>         Bind port (default: 8787)");
    eprintln!("  --upstream <URL>      Server the site is fetched from (default: http://127.0.0.1:8080)");
    eprintln!("  --origin <URL>        Public origin clients use to reach the proxy");
    eprintln!("  --version-tag <TAG>   Cache version; changing it purges older caches on start");
    eprintln!("  --cache-dir <PATH>    Disk cache directory");
    eprintln!("  --memory              Keep caches in memory only");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Logging is controlled with RUST_LOG (default: info).");
}

fn value(args: &[String], i: usize, flag: &str) -> String {
    args.get(i).cloned().unwrap_or_else(|| {
        eprintln!("Error: {flag} requires a value");
        std::process::exit(1);
    })
}

#[tokio::main]
async fn main() -> glimpse_sw::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .map(|i| PathBuf::from(value(&args, i + 1, "--config")));
    let mut config = AppConfig::load(config_path.as_deref())?;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => i += 1,
            "--host" => {
                i += 1;
                config.proxy.host = value(&args, i, "--host");
            }
            "--port" => {
                i += 1;
                let port = value(&args, i, "--port");
                config.proxy.port = port.parse().unwrap_or_else(|_| {
                    eprintln!("Error: invalid port '{port}'");
                    std::process::exit(1);
                });
            }
            "--upstream" => {
                i += 1;
                config.proxy.upstream = value(&args, i, "--upstream");
            }
            "--origin" => {
                i += 1;
                config.proxy.public_origin = Some(value(&args, i, "--origin"));
            }
            "--version-tag" => {
                i += 1;
                config.worker.cache = config.worker.cache.with_version(value(&args, i, "--version-tag"));
            }
            "--cache-dir" => {
                i += 1;
                config.storage.backend = StorageBackend::Disk;
                config.storage.dir = Some(PathBuf::from(value(&args, i, "--cache-dir")));
            }
            "--memory" => config.storage.backend = StorageBackend::Memory,
            other => {
                eprintln!("Error: unknown argument '{other}'");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    log::info!(
        "Starting glimpse-sw {} (caches {} / {})",
        env!("CARGO_PKG_VERSION"),
        config.worker.cache.static_name(),
        config.worker.cache.dynamic_name()
    );
    glimpse_sw::proxy::run(config).await
}
