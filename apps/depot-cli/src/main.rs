//! # Depot CLI Entry Point
//!
//! The actual setup is in lib.rs for better testability. This file only maps
//! the result to an exit code.

use std::process::ExitCode;

use depot_cli::error::ApiError;

#[tokio::main]
async fn main() -> ExitCode {
    match depot_cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let api = err
                .downcast::<ApiError>()
                .unwrap_or_else(|other| ApiError::internal(format!("{:#}", other)));
            eprintln!("{}", api.to_json());
            ExitCode::FAILURE
        }
    }
}
