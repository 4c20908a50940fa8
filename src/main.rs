use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use records_request::api::{AppState, api_routes, cors_layer};
use records_request::config::AppConfig;
use records_request::entitlement::{EntitlementCache, Entitlements, HttpBillingService};
use records_request::generation::HttpGenerationService;
use records_request::notify::{ConfirmationNotifier, LogNotifier, SmtpNotifier};
use records_request::payment::{HttpCheckoutService, PaymentHandoff};
use records_request::remote::FunctionsClient;
use records_request::store::{Database, LibSqlBackend};
use records_request::submission::SubmissionPipeline;
use records_request::wizard::{DraftStore, WizardServices};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = AppConfig::from_env().context("Invalid configuration")?;

    // Initialize tracing; the guard flushes the file writer on exit
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_target(false);
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "records-request.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    eprintln!("📨 Records Request v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Functions: {}", config.functions_url);
    eprintln!("   API: http://0.0.0.0:{}/api/wizard", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Hosted functions ─────────────────────────────────────────────────
    let functions = FunctionsClient::new(
        config.functions_url.clone(),
        config.functions_api_key.clone(),
        config.request_timeout,
    );
    let catalog = Arc::new(config.plans.clone());

    // ── Notifications ────────────────────────────────────────────────────
    let notifier: Arc<dyn ConfirmationNotifier> = match config.email.clone() {
        Some(email) => {
            eprintln!("   Email: enabled (SMTP: {})", email.smtp_host);
            Arc::new(SmtpNotifier::new(email))
        }
        None => {
            eprintln!("   Email: disabled (confirmations are logged)");
            Arc::new(LogNotifier)
        }
    };

    // ── Wizard services ──────────────────────────────────────────────────
    let pipeline = SubmissionPipeline::new(
        Arc::clone(&db),
        Arc::clone(&catalog),
        notifier,
        PaymentHandoff::new(
            Arc::new(HttpCheckoutService::new(functions.clone())),
            Arc::clone(&catalog),
        ),
    );
    let services = Arc::new(WizardServices {
        db: Arc::clone(&db),
        generation: Arc::new(HttpGenerationService::new(functions.clone())),
        entitlements: Entitlements::new(
            Arc::clone(&db),
            Arc::new(HttpBillingService::new(functions)),
            catalog,
            config.allow_test_override,
        ),
        cache: Arc::new(EntitlementCache::new(config.entitlement_ttl)),
        pipeline: Arc::new(pipeline),
    });
    if config.allow_test_override {
        eprintln!("   Test subscription overrides: enabled");
    }

    let state = AppState {
        drafts: Arc::new(DraftStore::new(services)),
        billing_events_token: config.billing_events_token.clone().map(Arc::new),
    };
    let app = api_routes(state).layer(cors_layer(config.cors_origin.as_deref()));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Records request server started");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
