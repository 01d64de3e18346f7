use std::{future::IntoFuture, process, sync::Arc};

use tessera::{
    application::{
        error::AppError,
        pieces::{PieceCatalog, PieceError, PieceService},
        repos::{PageMetaRepo, PiecesRepo},
    },
    config::{self, CompileArgs, RefreshMetaArgs, RefreshPieceArgs},
    domain::types::{ContentCode, MetaKey, ViewAddress},
    infra::{
        access::{ActorCredential, ActorDirectory, RolePermissions},
        db::PostgresRepositories,
        error::InfraError,
        http::{self, CmsState},
        telemetry,
        views::{FsFileManager, FsViewCache, FsViewEngine},
    },
};
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Compile(args) => run_compile(settings, args).await,
        config::Command::RefreshPiece(args) => run_refresh_piece(settings, args).await,
        config::Command::RefreshMeta(args) => run_refresh_meta(settings, args).await,
    }
}

struct ApplicationContext {
    pieces: Arc<PieceService>,
    actors: Arc<ActorDirectory>,
    db: Arc<PostgresRepositories>,
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings).await?;
    let state = CmsState {
        pieces: app.pieces,
        actors: app.actors,
        db: Some(app.db),
    };
    serve_http(&settings, state).await
}

async fn run_compile(settings: config::Settings, args: CompileArgs) -> Result<(), AppError> {
    let app = build_application_context(&settings).await?;
    let address = ViewAddress::new(&args.namespace, &args.view)?;

    app.pieces
        .compile_view(&address)
        .await
        .map_err(PieceError::from)?;

    info!(
        target = "tessera::cli",
        namespace = address.namespace(),
        view = address.view(),
        "view compiled"
    );
    Ok(())
}

async fn run_refresh_piece(
    settings: config::Settings,
    args: RefreshPieceArgs,
) -> Result<(), AppError> {
    let app = build_application_context(&settings).await?;
    let code = ContentCode::parse(&args.code)?;

    let piece = app
        .pieces
        .find_piece(&code)
        .await
        .map_err(PieceError::from)?
        .ok_or_else(|| AppError::not_found(format!("piece `{code}`")))?;
    let report = app.pieces.refresh_piece(&piece).await?;

    for pruned in &report.pruned {
        warn!(
            target = "tessera::cli",
            code = %code,
            namespace = %pruned.namespace,
            view = %pruned.view,
            "location pruned"
        );
    }
    info!(
        target = "tessera::cli",
        code = %code,
        compiled = report.compiled.len(),
        pruned = report.pruned.len(),
        "piece refreshed"
    );
    Ok(())
}

async fn run_refresh_meta(
    settings: config::Settings,
    args: RefreshMetaArgs,
) -> Result<(), AppError> {
    let app = build_application_context(&settings).await?;
    let key = MetaKey::parse(&args.namespace, &args.view, &args.code)?;

    let meta = app
        .pieces
        .find_meta(&key)
        .await
        .map_err(PieceError::from)?
        .ok_or_else(|| AppError::not_found(format!("page meta `{}:{}`", key.address, key.code)))?;
    app.pieces.refresh_meta(&meta).await?;
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let repositories =
        PostgresRepositories::connect(database_url, settings.database.max_connections).await?;
    repositories.migrate().await?;

    Ok(Arc::new(repositories))
}

async fn build_application_context(
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let db = init_repositories(settings).await?;

    let pieces_repo: Arc<dyn PiecesRepo> = db.clone();
    let meta_repo: Arc<dyn PageMetaRepo> = db.clone();
    let catalog = Arc::new(PieceCatalog::new(pieces_repo, meta_repo));

    let cache = FsViewCache::new(&settings.views.cache_directory);
    let engine = FsViewEngine::new(&settings.views.directory, cache.clone(), catalog.clone());
    let permissions = RolePermissions::new(settings.cms.roles.clone());

    let pieces = PieceService::new(
        catalog,
        Arc::new(engine),
        Arc::new(cache),
        Arc::new(FsFileManager),
        Arc::new(permissions),
    )
    .with_edit_permission(settings.cms.edit_permission.clone());

    let credentials = settings
        .cms
        .actors
        .iter()
        .map(|actor| ActorCredential::new(&actor.name, actor.roles.clone(), &actor.token_sha256))
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        target = "tessera::bootstrap",
        views = %settings.views.directory.display(),
        cache = %settings.views.cache_directory.display(),
        actors = credentials.len(),
        "application context ready"
    );

    Ok(ApplicationContext {
        pieces: Arc::new(pieces),
        actors: Arc::new(ActorDirectory::new(credentials)),
        db,
    })
}

async fn serve_http(settings: &config::Settings, state: CmsState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let addr = settings.server.addr;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| AppError::from(InfraError::Bind { addr, source }))?;
    info!(target = "tessera::bootstrap", addr = %addr, "listening");

    let (stopping_tx, stopping_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stopping_tx.send(());
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    let drain_deadline = async move {
        match stopping_rx.await {
            Ok(()) => tokio::time::sleep(grace).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = drain_deadline => {
            warn!(
                target = "tessera::bootstrap",
                grace_secs = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
        }
    }

    info!(target = "tessera::bootstrap", "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(
            target = "tessera::bootstrap",
            error = %err,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    info!(target = "tessera::bootstrap", "shutdown requested");
}
