mod cli;
mod demo;
mod infra;

use background_intake::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
