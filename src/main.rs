mod config;
mod errors;
mod handlers;
mod payments;
mod state;
#[cfg(test)]
mod test_support;

use actix_web::{App, HttpServer, middleware::Logger, web};
use common::TransactionStatus;
use dotenv::dotenv;
use pretty_env_logger::env_logger::{Builder, Env};

use crate::config::AppConfig;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    if cli::run_cli().await {
        return Ok(());
    }

    let logger_env = Env::default().default_filter_or("debug");
    let mut logger_builder = Builder::from_env(logger_env);
    logger_builder.init();

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Application initialization failed: {:#}", e);
        std::io::Error::other(e.to_string())
    })?;

    let state = config.create_app_state().await.map_err(|e| {
        log::error!("Application initialization failed: {:#}", e);
        std::io::Error::other(e.to_string())
    })?;

    log::info!("App state initialized successfully");

    match state
        .db
        .count_transactions_by_status(TransactionStatus::Refunding)
        .await
    {
        Ok(0) => {}
        Ok(stuck) => log::warn!(
            "{} transactions are stuck in refunding; check the chain and run `release-refund` where no refund was sent",
            stuck
        ),
        Err(e) => log::error!("Failed to count refunding transactions: {:#}", e),
    }

    let data = web::Data::new(state);

    // Spawn the retry runner
    {
        let runner_state = data.clone();
        let interval = config.retry_interval;
        tokio::spawn(async move {
            payments::start_retry_runner(runner_state, interval).await;
        });
    }

    log::info!("Listening on {}:{}", config.host, config.port);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .app_data(handlers::json_config())
            .wrap(Logger::new("%a %t %r %s  %{Referer}i %Dms"))
            .configure(handlers::routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
