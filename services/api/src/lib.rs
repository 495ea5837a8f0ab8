mod assess;
mod cli;
mod commands;
mod infra;
mod routes;
mod server;

use minpaku_feasibility::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
