use std::sync::Arc;

use anyhow::Context;

use chat_enroll::api::ApiClient;
use chat_enroll::channels::{Channel, CliChannel, Outbox, TelegramChannel};
use chat_enroll::commands::{RegistrationHandler, registration_form};
use chat_enroll::config::BotConfig;
use chat_enroll::dispatch::Dispatcher;
use chat_enroll::forms::{FormEngine, SessionStore, spawn_expiry_task};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().context("loading configuration")?;

    eprintln!("🤖 chat-enroll v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: {}", config.api.base_url);

    // ── Remote API ───────────────────────────────────────────────────────
    let api = Arc::new(ApiClient::new(config.api.clone()));
    if !api.authenticate().await {
        tracing::warn!("Starting without an API credential; calls will re-authenticate on 403");
    }

    // ── Forms ────────────────────────────────────────────────────────────
    let sessions = SessionStore::new(config.session.idle_ttl);
    let _expiry_handle = spawn_expiry_task(Arc::clone(&sessions), config.session.sweep_interval);

    let mut engine = FormEngine::new(sessions);
    engine.register(
        registration_form()?,
        Arc::new(RegistrationHandler::new(api, config.links.clone())),
    );
    let engine = Arc::new(engine);

    // ── Channel ──────────────────────────────────────────────────────────
    match config.telegram_token.clone() {
        Some(token) => {
            eprintln!("   Channel: telegram\n");
            serve(Arc::new(TelegramChannel::new(token)), engine, &config).await
        }
        None => {
            eprintln!("   Channel: cli (use #key to press a button, e.g. #register)\n");
            serve(Arc::new(CliChannel::new()), engine, &config).await
        }
    }
}

async fn serve<C>(channel: Arc<C>, engine: Arc<FormEngine>, config: &BotConfig) -> anyhow::Result<()>
where
    C: Channel + 'static,
{
    channel
        .health_check()
        .await
        .with_context(|| format!("{} health check", channel.name()))?;
    let events = channel.start().await?;

    let outbox: Arc<dyn Outbox> = channel.clone();
    let dispatcher = Dispatcher::new(
        engine,
        outbox,
        config.links.clone(),
        config.rate_limit,
        config.session,
    );
    dispatcher.run(events).await;

    channel.shutdown().await?;
    Ok(())
}
