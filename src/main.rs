use std::{future::IntoFuture, pin::pin, process, sync::Arc};

use nbpress::{
    application::{error::AppError, metadata::SyncOutcome},
    config,
    infra::{bootstrap::Services, error::InfraError, http, telemetry},
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, &args.url).await,
        config::Command::Sync(args) => run_sync(settings, args.post_id).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let services = Services::from_settings(&settings).await?;
    let router = http::build_router(services.http_state());

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "nbpress::serve",
        addr = %settings.server.addr,
        site_url = %settings.site.url,
        media_dir = %settings.storage.directory.display(),
        "HTTP server listening"
    );

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { signal.notified().await })
        .into_future();
    let mut server = pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| AppError::from(InfraError::from(err)))?;
        }
    }

    info!(
        target = "nbpress::serve",
        grace_secs = settings.server.graceful_shutdown.as_secs(),
        "Shutdown requested; draining connections"
    );
    shutdown.notify_one();

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(result) => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(_) => {
            warn!(
                target = "nbpress::serve",
                "Graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

async fn run_render(settings: config::Settings, url: &str) -> Result<(), AppError> {
    let services = Services::from_settings(&settings).await?;
    let document = services.publish.single_line_document(url).await?;
    println!("{document}");
    Ok(())
}

async fn run_sync(settings: config::Settings, post_id: Uuid) -> Result<(), AppError> {
    if settings.store.path.is_none() {
        return Err(InfraError::configuration(
            "sync needs a persistent store; set store.path or pass --store-path",
        )
        .into());
    }

    let services = Services::from_settings(&settings).await?;
    match services.metadata.sync(post_id, None).await? {
        SyncOutcome::Applied(update) => {
            info!(
                target = "nbpress::sync",
                post_id = %post_id,
                title = update.title.as_deref().unwrap_or(""),
                slug = update.slug.as_deref().unwrap_or(""),
                "Metadata applied"
            );
        }
        SyncOutcome::Skipped(reason) => {
            info!(
                target = "nbpress::sync",
                post_id = %post_id,
                reason = ?reason,
                "Nothing to sync"
            );
        }
    }
    Ok(())
}
