//! oracle-guardian — autonomous on-chain security monitor.
//!
//! Wires the Chain Adapter, Observer, Anomaly Filter, Reasoner, Decider,
//! Actor, and Restore Scheduler into one observation loop, and serves the
//! dashboard's read/admin HTTP+WebSocket API alongside it. See
//! `SPEC_FULL.md` for the full component contract.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use oracle_guardian::api::{self, AdminCommand, AppState};
use oracle_guardian::attack_sim::{AttackSimulator, HttpAttackSimulator};
use oracle_guardian::chain::{retry_transient, ChainAdapter, JsonRpcChainAdapter};
use oracle_guardian::decider::DeciderConfig;
use oracle_guardian::events::{EventBus, EventStore};
use oracle_guardian::filter::FilterConfig;
use oracle_guardian::models::Config;
use oracle_guardian::pipeline::{CycleOutcome, Pipeline, PipelineConfig};
use oracle_guardian::reasoner::llm::{LlmClient, OpenRouterClient};
use oracle_guardian::reasoner::Reasoner;
use oracle_guardian::restore::RestoreScheduler;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Repeated (≥10 consecutive) observation failures slow the poll interval
/// to 10x configured, until a successful observation resets it — SPEC_FULL §7.
const DEGRADE_SLOWDOWN_FACTOR: u32 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    if env::var("LLM_API_KEY").unwrap_or_default().trim().is_empty() {
        error!("LLM_API_KEY is not set; the reasoner cannot run without an LLM credential");
        std::process::exit(3);
    }

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "fatal configuration error");
            std::process::exit(1);
        }
    };

    info!(poll_interval_sec = cfg.poll_interval_sec, "oracle-guardian starting");

    let chain = Arc::new(
        JsonRpcChainAdapter::new(
            cfg.chain_rpc_url.clone(),
            cfg.signer_key.clone(),
            cfg.contract_oracle.clone(),
            cfg.contract_amm.clone(),
            cfg.contract_vault.clone(),
            cfg.contract_weth.clone(),
            cfg.contract_usdc.clone(),
            Duration::from_secs(10),
        )
        .context("failed to build chain adapter")?,
    );

    if let Err(e) = retry_transient(|| {
        let chain = chain.clone();
        async move { chain.current_block().await }
    })
    .await
    {
        error!(error = %e, "chain endpoint unreachable after retries, cannot start");
        std::process::exit(2);
    }

    let llm = Arc::new(
        OpenRouterClient::new(cfg.llm_api_key.clone(), cfg.llm_model.clone())
            .context("failed to build LLM client")?,
    );

    let event_store = Arc::new(EventStore::new(cfg.event_store_capacity));
    let bus = Arc::new(EventBus::new());

    let reasoner = Reasoner::new(
        llm,
        cfg.analyzed_events_capacity,
        Duration::from_secs(cfg.llm_call_timeout_sec),
        cfg.llm_model.clone(),
    );

    let restore = Arc::new(RestoreScheduler::new(
        chain.clone(),
        Duration::from_secs(cfg.restore_delay_sec),
        cfg.repause_after_restore,
    ));

    let pipeline_cfg = PipelineConfig {
        filter: FilterConfig {
            price_deviation_threshold_pct: cfg.price_deviation_threshold_pct,
            extreme_move_threshold_pct: cfg.extreme_move_threshold_pct,
            large_swap_weth: cfg.large_swap_weth,
        },
        decider: DeciderConfig {
            pause_confidence_threshold: cfg.pause_confidence_threshold,
            block_liquidation_confidence_threshold: cfg.block_liquidation_confidence_threshold,
        },
    };

    let pipeline = Pipeline::new(
        chain.clone(),
        reasoner,
        restore,
        event_store.clone(),
        bus.clone(),
        pipeline_cfg,
    );

    let attack_sim: Arc<dyn AttackSimulator> =
        Arc::new(HttpAttackSimulator::new(env::var("ATTACK_SIM_URL").ok()));

    let (admin_tx, admin_rx) = mpsc::channel(8);

    let app_state = AppState {
        event_store: event_store.clone(),
        bus: bus.clone(),
        admin_tx,
    };
    let app = api::build_router(app_state);

    let addr = format!("0.0.0.0:{}", cfg.http_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind http server on {addr}"))?;
    info!(addr = %addr, "dashboard API listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        {
            error!(error = %e, "http server exited with error");
        }
    });

    let poll_interval_sec = cfg.poll_interval_sec;
    let observation = tokio::spawn(run_observation_loop(pipeline, admin_rx, attack_sim, poll_interval_sec));

    tokio::select! {
        _ = server => {}
        _ = observation => {}
    }

    info!("oracle-guardian shut down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// The observation loop: ticks the pipeline on `poll_interval_sec` (slowed
/// 10x while degraded), and services admin commands from the HTTP layer in
/// between ticks. The pipeline owns all of its own synchronization (event
/// store, actor's in-flight mutex), so this loop is the only place the
/// chain adapter, reasoner, and restore scheduler are ever driven from.
async fn run_observation_loop<C, L>(
    mut pipeline: Pipeline<C, L>,
    mut admin_rx: mpsc::Receiver<AdminCommand>,
    attack_sim: Arc<dyn AttackSimulator>,
    poll_interval_sec: u64,
) where
    C: ChainAdapter + 'static,
    L: LlmClient + 'static,
{
    let mut degraded = false;
    let mut ticker = tokio::time::interval(Duration::from_secs(poll_interval_sec));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match pipeline.run_cycle().await {
                    CycleOutcome::Degraded => {
                        if !degraded {
                            degraded = true;
                            warn!(
                                factor = DEGRADE_SLOWDOWN_FACTOR,
                                "slowing poll interval after repeated observation failures"
                            );
                            ticker = tokio::time::interval(Duration::from_secs(
                                poll_interval_sec * DEGRADE_SLOWDOWN_FACTOR as u64,
                            ));
                        }
                    }
                    CycleOutcome::Observed if degraded => {
                        degraded = false;
                        info!("observation recovered, restoring normal poll interval");
                        ticker = tokio::time::interval(Duration::from_secs(poll_interval_sec));
                    }
                    _ => {}
                }
            }
            cmd = admin_rx.recv() => {
                match cmd {
                    Some(AdminCommand::SimulateAttack(reply)) => {
                        let response = attack_sim.simulate().await;
                        let _ = reply.send(response);
                    }
                    Some(AdminCommand::ResetAmm(reply)) => {
                        let response = handle_reset_amm(&mut pipeline).await;
                        let _ = reply.send(response);
                    }
                    None => break,
                }
            }
        }
    }
}

async fn handle_reset_amm<C, L>(pipeline: &mut Pipeline<C, L>) -> oracle_guardian::api::routes::ResetAmmResponse
where
    C: ChainAdapter + 'static,
    L: LlmClient + 'static,
{
    let Some(target) = pipeline.last_oracle_price() else {
        return oracle_guardian::api::routes::ResetAmmResponse {
            success: false,
            message: "no oracle price observed yet".to_string(),
            new_price: None,
            tx_hash: None,
        };
    };

    let outcome = pipeline.manual_restore(target).await;
    oracle_guardian::api::routes::ResetAmmResponse {
        success: outcome.success,
        message: outcome.message,
        new_price: outcome.new_price,
        tx_hash: outcome.tx_hash,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oracle_guardian=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
