mod auth;
mod calendar;
mod classifier;
mod config;
mod db;
mod dispatch;
mod error;
#[cfg(test)]
mod fakes;
mod gmail;
mod llm;
mod models;
mod processor;
mod providers;
mod responder;
mod slack;
mod sync;

use crate::calendar::{CalendarClient, GOOGLE_CALENDAR_API};
use crate::classifier::Classifier;
use crate::dispatch::Dispatchers;
use crate::gmail::GmailClient;
use crate::processor::{Assistant, LoopSettings};
use crate::responder::Responder;
use crate::slack::SlackNotifier;
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let debug_logging = std::env::args().any(|arg| arg == "--debug");
    let default_filter = if debug_logging { "mailpilot=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    // Handle token reset
    if std::env::args().any(|arg| arg == "--reset-token") {
        auth::RingStorage.clear_token().await?;
        println!("Token cleared. Please restart without --reset-token to re-authenticate.");
        return Ok(());
    }

    let (config, secrets) = match config::load_validated() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let slack = Arc::new(SlackNotifier::new(
        &config.slack.api_base,
        &secrets.slack_bot_token,
        &config.slack.channel,
    )?);

    if std::env::args().any(|arg| arg == "--check") {
        let team = slack.auth_test().await.context("Slack token check failed")?;
        println!("Configuration OK. Slack workspace: {}", team);
        return Ok(());
    }

    let db = db::Database::new(&config.database_url).await?;
    db.run_migrations().await?;

    let secret = auth::Authenticator::load_secret(&config.credentials_path).await?;
    let google_auth = auth::Authenticator::authenticate(secret).await?;

    let mailbox = Arc::new(GmailClient::connect(google_auth.clone())?);
    let calendar = Arc::new(CalendarClient::new(
        GOOGLE_CALENDAR_API,
        Arc::new(google_auth),
    )?);

    let classify_model = llm::build_language_model(&config.llm, &secrets.llm_api_key, &config.llm.model)?;
    let reply_model =
        llm::build_language_model(&config.llm, &secrets.llm_api_key, config.llm.reply_model())?;

    let assistant = Assistant::new(
        mailbox.clone(),
        db,
        Classifier::new(classify_model),
        Responder::new(reply_model),
        Dispatchers::new(mailbox, calendar, slack, config.meetings.clone()),
        LoopSettings {
            max_results: config.max_results,
            thread_context_limit: config.thread_context_limit,
            poll_interval: config.poll_interval(),
            error_backoff: config.error_backoff(),
            identity: config.identity.clone(),
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Stopping email assistant...");
        let _ = shutdown_tx.send(true);
    });

    let mut state = sync::PollState::default();
    if std::env::args().any(|arg| arg == "--once") {
        let outcome = assistant.run_cycle(&shutdown_rx).await;
        if let processor::CycleOutcome::FetchFailed(reason) = &outcome {
            error!("Single cycle could not reach the mailbox: {}", reason);
        }
        state.record(outcome);
        assistant.database().close().await;
    } else {
        assistant.run(shutdown_rx, &mut state).await;
    }

    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Could not listen for SIGTERM: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Could not listen for Ctrl+C: {}", e);
    }
}
