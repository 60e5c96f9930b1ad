use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match ensenso_node_lib::run(std::env::args().skip(1)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
