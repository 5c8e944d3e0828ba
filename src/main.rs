use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tracing::{error, info, warn};

use stateset_checkout as checkout;
use stateset_checkout::services::commerce::{CheckoutService, CheckoutSettings};
use stateset_checkout::services::coupons::NoCoupons;
use stateset_checkout::services::payment_gateway::{
    http_gateway::HttpPaymentGateway, PaymentGateway, UnconfiguredGateway,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = checkout::config::load_config().context("failed to load configuration")?;
    checkout::config::init_tracing(cfg.log_level(), cfg.log_json);
    checkout::handlers::health::init_start_time();

    let db_pool = checkout::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the database")?;
    if cfg.auto_migrate {
        checkout::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = checkout::events::EventSender::new(event_tx);
    tokio::spawn(checkout::events::process_events(event_rx));

    let gateway: Arc<dyn PaymentGateway> = match HttpPaymentGateway::from_config(&cfg)? {
        Some(gateway) => {
            info!("Payment gateway client configured");
            Arc::new(gateway)
        }
        None => {
            if cfg.is_production() {
                error!("Payment gateway not configured in production; card checkouts will be rejected");
            } else {
                warn!("Payment gateway not configured; card checkouts will be rejected");
            }
            Arc::new(UnconfiguredGateway)
        }
    };

    let settings = CheckoutSettings::from(&cfg);
    info!(
        policy = ?settings.transaction_policy,
        currency = %settings.currency,
        "Checkout settings loaded"
    );
    let storage = Arc::new(checkout::repositories::SeaOrmStore::new(db_arc.clone()));
    let service = CheckoutService::new(
        storage,
        gateway,
        Arc::new(NoCoupons),
        settings,
        event_sender,
    );

    let app = checkout::app_router(checkout::AppState::new(service, Some(db_arc)));

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    info!("stateset-checkout listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
