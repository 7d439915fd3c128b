//! Binary entrypoint: parse arguments, load configuration, initialize
//! logging, and hand off to the supervisor.

use std::process::ExitCode;

use kinesis_log_agent::cli;
use kinesis_log_agent::config::Config;
use kinesis_log_agent::supervisor;

fn init_logging() {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Utc::now().to_rfc3339(),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stdout())
        .apply()
        .expect("logging can only be initialized once");
}

fn main() -> ExitCode {
    let args = cli::parse_args();

    if args.print_version {
        println!("kinesis-log-agent {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    init_logging();

    let config_path = args.config.expect("clap guarantees config is present unless -v was given");
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            log::error!(target: "kinesis_log_agent", "failed to load configuration from {}: {e}", config_path.display());
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!(target: "kinesis_log_agent", "failed to start the async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(supervisor::run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!(target: "kinesis_log_agent", "fatal error: {e}");
            ExitCode::FAILURE
        }
    }
}
