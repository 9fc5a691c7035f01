use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match chart_signal_lib::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("chart-signal: {e}");
            ExitCode::FAILURE
        }
    }
}
