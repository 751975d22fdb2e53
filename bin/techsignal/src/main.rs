use std::sync::Arc;

use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, EngineCommand, Result, Signal, SignalSink};
use engine::{ingest_readings, Engine};
use strategy::{
    spawn_delivery, BarEvaluator, EventDispatcher, FanoutSink, IndicatorStore, LogSink,
    StrategyFileConfig,
};
use telegram_ctrl::{start_bot, BotDeps, TelegramSink};

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run().await {
        error!(error = %e, "TechSignal failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env()?;
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)?;
    let rules = Arc::new(strategy_file.rule_set()?);
    let symbol = strategy_file.symbol.clone();
    info!(symbol = %symbol, rules = rules.len(), "TechSignal starting");

    if rules.is_empty() {
        warn!("No supportDetection rules configured, no signals will be emitted");
    }

    // ── Indicator snapshot (fed by the external pipeline on stdin) ───────────
    let store = Arc::new(IndicatorStore::new());
    {
        let store = store.clone();
        tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            if let Err(e) = ingest_readings(stdin, store).await {
                warn!(error = %e, "Indicator ingestion stopped");
            }
        });
    }

    // ── Engine ────────────────────────────────────────────────────────────────
    let (engine, engine_handle) = Engine::new(rules.subscriptions(&symbol));

    // ── Signal delivery ───────────────────────────────────────────────────────
    let (signal_tx, signal_rx) = mpsc::unbounded_channel::<Signal>();
    let mut sink = FanoutSink::new().with(Arc::new(LogSink));

    let bot = cfg.telegram_token.as_ref().map(|t| teloxide::Bot::new(t.clone()));
    if let Some(bot) = &bot {
        sink = sink.with(Arc::new(TelegramSink::new(
            bot.clone(),
            &cfg.telegram_allowed_user_ids,
            strategy_file.market(),
        )));
    } else {
        info!("TELEGRAM_TOKEN not set, signals are logged only");
    }
    let sink: Arc<dyn SignalSink> = Arc::new(sink);

    // ── Evaluation ────────────────────────────────────────────────────────────
    let evaluator = BarEvaluator::new(symbol.clone(), rules.clone(), store)
        .require_price_at_or_below_average(strategy_file.require_price_at_or_below_average);
    let dispatcher = EventDispatcher::new(evaluator, cfg.indicator_lookup_timeout);

    // ── Telegram C2 ───────────────────────────────────────────────────────────
    if let Some(bot) = bot {
        let (command_tx, mut command_rx) = mpsc::channel::<EngineCommand>(32);
        let handle = engine_handle.clone();
        tokio::spawn(async move {
            while let Some(cmd) = command_rx.recv().await {
                handle.send(cmd).await;
            }
        });

        let deps = BotDeps {
            command_tx,
            engine_state: engine_handle.shared_state(),
            symbol: symbol.clone(),
            rules: rules.clone(),
            allowed_user_ids: Arc::new(cfg.telegram_allowed_user_ids.clone()),
        };
        tokio::spawn(start_bot(bot, deps));
    }

    // ── Spawn all tasks ───────────────────────────────────────────────────────
    let bar_rx = engine_handle.subscribe_bars();
    tokio::spawn(engine.run());
    let dispatcher_task =
        tokio::spawn(dispatcher.run(bar_rx, signal_tx, engine_handle.shared_state()));
    let delivery = spawn_delivery(signal_rx, sink);

    if cfg.autostart {
        engine_handle.send(EngineCommand::Start).await;
    } else {
        info!("AUTOSTART disabled, waiting for /start");
    }

    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Draining signal queue.");
    engine_handle.send(EngineCommand::Stop).await;

    // Dropping the dispatcher's sender closes the queue behind the last signal.
    dispatcher_task.abort();
    let _ = dispatcher_task.await;
    match tokio::time::timeout(cfg.shutdown_grace, delivery).await {
        Ok(Ok(())) => info!("Signal queue drained. Exiting."),
        Ok(Err(e)) => warn!(error = %e, "Signal delivery task failed"),
        Err(_) => warn!(grace = ?cfg.shutdown_grace, "Signal delivery did not finish in time"),
    }
    Ok(())
}
