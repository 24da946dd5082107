use std::process::ExitCode;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

/// Reads `transfer.info` (and `me.info`/`priv.key` on re-runs) from the
/// working directory and performs one upload session. No arguments.
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("filecourier: cannot determine working directory: {e}");
            return ExitCode::FAILURE;
        }
    };

    match filecourier::run(&cwd, None) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("filecourier: {e}");
            ExitCode::FAILURE
        }
    }
}
