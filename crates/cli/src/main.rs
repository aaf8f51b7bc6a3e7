use clap::Parser;
use stac_client_cli::StacClient;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = StacClient::parse();
    match args.run(true).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {err:#}");
            ExitCode::FAILURE
        }
    }
}
