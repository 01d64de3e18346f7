//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::pieces::DEFAULT_EDIT_PERMISSION;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "tessera";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_VIEWS_DIR: &str = "views";
const DEFAULT_VIEWS_CACHE_DIR: &str = "cache/views";

/// Command-line arguments for the Tessera binary.
#[derive(Debug, Parser)]
#[command(name = "tessera", version, about = "Tessera content server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TESSERA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Drop the cached artifacts of a view and compile it again.
    Compile(CompileArgs),
    /// Recompile every view a piece appears in.
    #[command(name = "refresh-piece")]
    RefreshPiece(RefreshPieceArgs),
    /// Recompile the view a page meta record belongs to.
    #[command(name = "refresh-meta")]
    RefreshMeta(RefreshMetaArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct StorageOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the directory holding view templates.
    #[arg(long = "views-directory", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub views_directory: Option<PathBuf>,

    /// Override the directory receiving compiled views.
    #[arg(long = "views-cache-directory", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub views_cache_directory: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub storage: StorageOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct CompileArgs {
    #[command(flatten)]
    pub storage: StorageOverrides,

    /// Namespace of the view.
    #[arg(value_name = "NAMESPACE")]
    pub namespace: String,

    /// View path inside the namespace, e.g. `blog/index`.
    #[arg(value_name = "VIEW")]
    pub view: String,
}

#[derive(Debug, Args, Clone)]
pub struct RefreshPieceArgs {
    #[command(flatten)]
    pub storage: StorageOverrides,

    /// Code of the piece to refresh.
    #[arg(value_name = "CODE")]
    pub code: String,
}

#[derive(Debug, Args, Clone)]
pub struct RefreshMetaArgs {
    #[command(flatten)]
    pub storage: StorageOverrides,

    #[arg(value_name = "NAMESPACE")]
    pub namespace: String,

    #[arg(value_name = "VIEW")]
    pub view: String,

    /// Code of the page meta record.
    #[arg(value_name = "CODE")]
    pub code: String,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub views: ViewsSettings,
    pub cms: CmsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct ViewsSettings {
    pub directory: PathBuf,
    pub cache_directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CmsSettings {
    pub edit_permission: String,
    /// Role name to permission patterns.
    pub roles: HashMap<String, Vec<String>>,
    pub actors: Vec<ActorSettings>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ActorSettings {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Hex SHA-256 of the actor's bearer token.
    pub token_sha256: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("TESSERA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Compile(args)) => raw.apply_storage_overrides(&args.storage),
        Some(Command::RefreshPiece(args)) => raw.apply_storage_overrides(&args.storage),
        Some(Command::RefreshMeta(args)) => raw.apply_storage_overrides(&args.storage),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    views: RawViewsSettings,
    cms: RawCmsSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        override_with(&mut self.server.host, &overrides.server_host);
        override_with(&mut self.server.port, &overrides.server_port);
        override_with(
            &mut self.server.graceful_shutdown_seconds,
            &overrides.server_graceful_shutdown_seconds,
        );
        override_with(&mut self.logging.level, &overrides.log_level);
        override_with(&mut self.logging.json, &overrides.log_json);
        override_with(
            &mut self.database.max_connections,
            &overrides.database_max_connections,
        );
        self.apply_storage_overrides(&overrides.storage);
    }

    fn apply_storage_overrides(&mut self, overrides: &StorageOverrides) {
        override_with(&mut self.database.url, &overrides.database_url);
        override_with(&mut self.views.directory, &overrides.views_directory);
        override_with(
            &mut self.views.cache_directory,
            &overrides.views_cache_directory,
        );
    }
}

fn override_with<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            views,
            cms,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            views: build_views_settings(views)?,
            cms: build_cms_settings(cms)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let port = match server.port.unwrap_or(DEFAULT_PORT) {
        0 => return Err(LoadError::invalid("server.port", "must be greater than zero")),
        port => port,
    };
    let host = server.host.as_deref().unwrap_or(DEFAULT_HOST);
    let addr = format!("{host}:{port}")
        .parse::<SocketAddr>()
        .map_err(|err| {
            LoadError::invalid("server.host", format!("`{host}:{port}` is not an address: {err}"))
        })?;

    let graceful_shutdown = match server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS)
    {
        0 => {
            return Err(LoadError::invalid(
                "server.graceful_shutdown_seconds",
                "must be greater than zero",
            ));
        }
        secs => Duration::from_secs(secs),
    };

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = logging
        .level
        .as_deref()
        .map(LevelFilter::from_str)
        .transpose()
        .map_err(|err| LoadError::invalid("logging.level", err.to_string()))?
        .unwrap_or(LevelFilter::INFO);
    let format = match logging.json {
        Some(true) => LogFormat::Json,
        _ => LogFormat::Compact,
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database
        .url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty());
    let max_connections = database
        .max_connections
        .map_or(NonZeroU32::new(DEFAULT_DB_MAX_CONNECTIONS), NonZeroU32::new)
        .ok_or_else(|| {
            LoadError::invalid("database.max_connections", "must be greater than zero")
        })?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_views_settings(views: RawViewsSettings) -> Result<ViewsSettings, LoadError> {
    let directory = views
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_VIEWS_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "views.directory",
            "path must not be empty",
        ));
    }
    let cache_directory = views
        .cache_directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_VIEWS_CACHE_DIR));
    if cache_directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "views.cache_directory",
            "path must not be empty",
        ));
    }
    if cache_directory == directory {
        return Err(LoadError::invalid(
            "views.cache_directory",
            "must differ from views.directory",
        ));
    }

    Ok(ViewsSettings {
        directory,
        cache_directory,
    })
}

fn build_cms_settings(cms: RawCmsSettings) -> Result<CmsSettings, LoadError> {
    let edit_permission = cms
        .edit_permission
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_EDIT_PERMISSION.to_string());
    if edit_permission.is_empty() {
        return Err(LoadError::invalid(
            "cms.edit_permission",
            "must not be empty",
        ));
    }

    let mut names = HashSet::new();
    for actor in &cms.actors {
        if actor.name.trim().is_empty() {
            return Err(LoadError::invalid("cms.actors", "actor name must not be empty"));
        }
        if !names.insert(actor.name.as_str()) {
            return Err(LoadError::invalid(
                "cms.actors",
                format!("actor `{}` is defined twice", actor.name),
            ));
        }
        let hash = actor.token_sha256.trim();
        if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(LoadError::invalid(
                "cms.actors",
                format!(
                    "actor `{}` token_sha256 must be 64 hex digits",
                    actor.name
                ),
            ));
        }
    }

    Ok(CmsSettings {
        edit_permission,
        roles: cms.roles,
        actors: cms.actors,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawViewsSettings {
    directory: Option<PathBuf>,
    cache_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCmsSettings {
    edit_permission: Option<String>,
    roles: HashMap<String, Vec<String>>,
    actors: Vec<ActorSettings>,
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
