use tracing_subscriber::EnvFilter;

fn main() {
    // SAFETY: no runtime or other thread exists yet.
    unsafe { taskrunner::engine::failure::enable_error_backtraces() };
    run();
}

#[tokio::main(flavor = "current_thread")]
async fn run() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match taskrunner::cli::run_cli().await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
