use std::process::ExitCode;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    lineup_cli::run()
}
