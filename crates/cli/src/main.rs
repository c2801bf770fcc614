mod config;
mod display;
mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand};
use policy::{AuthGate, root_token};
use runtime::{
    Client, ClientCache, FileLocalStore, HttpApi, LaunchContext, ParkingApi, REVOKE_THRESHOLD,
    SyncEvent, Tick, magic_link,
};
use server::{Api, RouterOptions};
use storage::{Car, Config as SharedConfig, DocumentStore, JsonFileStore, SqliteStore};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{Config, StoreBackend};
use error::{Error, Result};

const CONFIG_FILE: &str = "parktrack.toml";
const KEY_LEN: usize = 16;

#[derive(Parser)]
#[command(name = "parktrack")]
#[command(about = "Shared family parking tracker", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the parking API server
    Serve,
    /// Follow the dashboard as it changes
    Watch {
        /// Magic link to sign in with before watching
        #[arg(short, long)]
        link: Option<String>,
    },
    /// Show where every car is parked
    Status,
    /// Report where a car is parked
    Park {
        /// Car id or name
        car: String,
        /// Location, e.g. "2B"
        location: Option<String>,
        #[arg(short, long)]
        floor: Option<String>,
        #[arg(short, long)]
        section: Option<String>,
    },
    /// Manage access keys (admin)
    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },
    /// Sign in with a magic link
    Open {
        link: String,
        /// Park the car named in the link at this location
        #[arg(short, long)]
        location: Option<String>,
    },
    /// Sign in as admin with the admin password
    Unlock { password: String },
    /// Show or change local preferences
    Prefs {
        /// Dashboard columns for the current identity
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        grid: Option<u32>,
        /// Display name attached to parks from this client
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum UsersCommand {
    /// List stored users
    List,
    /// Create a user and print their magic link
    Add {
        name: String,
        /// Key to assign; a random one is generated if omitted
        #[arg(short, long)]
        key: Option<String>,
    },
    /// Revoke a user's key
    Remove { key: String },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(matches!(cli.command, Commands::Serve));

    let mut config = load_config(cli.config.as_deref())?;
    config.apply_env(|name| std::env::var(name).ok())?;

    match cli.command {
        Commands::Serve => cmd_serve(&config).await,
        Commands::Watch { link } => cmd_watch(&config, link.as_deref()).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Park {
            car,
            location,
            floor,
            section,
        } => {
            let location = compose_location(location, floor, section)?;
            cmd_park(&config, &car, &location).await
        }
        Commands::Users { command } => cmd_users(&config, command).await,
        Commands::Open { link, location } => cmd_open(&config, &link, location.as_deref()).await,
        Commands::Unlock { password } => cmd_unlock(&config, &password).await,
        Commands::Prefs { grid, name } => cmd_prefs(&config, grid, name),
    }
}

/// Logs go to stderr so the dashboard on stdout stays clean.
/// The server logs at info by default, client commands only warn.
fn init_tracing(serving: bool) {
    let default = if serving { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None if Path::new(CONFIG_FILE).exists() => Ok(Config::load(CONFIG_FILE)?),
        None => Ok(Config::default()),
    }
}

async fn cmd_serve(config: &Config) -> Result<()> {
    let gate = AuthGate::new(
        config.auth.admin_secret.as_deref(),
        config.auth.allow_insecure_default,
    )?;

    let path = &config.store.path;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let store: Arc<dyn DocumentStore> = match config.store.backend {
        StoreBackend::Json => Arc::new(JsonFileStore::new(path)),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(path)?),
    };
    // Bootstrap now so a broken store fails at startup, not on the first request.
    store.load()?;

    let options = RouterOptions {
        base_path: config.server.base_path.clone(),
        delay: Duration::from_millis(config.server.artificial_delay_ms),
    };
    let app = server::router(Arc::new(Api::new(store, gate)), &options);

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!(
        addr = %listener.local_addr()?,
        api = %server::mount_path(&options.base_path),
        store = %path.display(),
        backend = ?config.store.backend,
        "server listening"
    );
    server::serve(listener, app).await?;
    info!("server stopped");
    Ok(())
}

async fn cmd_watch(config: &Config, link: Option<&str>) -> Result<()> {
    let launch = match link {
        Some(link) => LaunchContext::from_link(link)?,
        None => LaunchContext::default(),
    };
    let client = open_client(config, launch)?;
    require_token(&client).await?;

    let mut events = client.subscribe();
    let sync = client.spawn_sync(Duration::from_millis(config.client.poll_interval_ms));

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SyncEvent::Applied { .. }) => {
                    println!("{}", dashboard(&client).await);
                }
                Ok(SyncEvent::Revoked { notice }) => {
                    eprintln!("{notice}");
                    break;
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "dashboard fell behind"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    sync.shutdown().await;
    Ok(())
}

async fn cmd_status(config: &Config) -> Result<()> {
    let client = open_client(config, LaunchContext::default())?;
    require_token(&client).await?;

    let tick = client.tick().await?;
    let warning = tick_report(tick, &mut *client.cache().lock().await)?;
    if let Some(warning) = warning {
        eprintln!("{warning}");
    }
    print!("{}", dashboard(&client).await);
    Ok(())
}

async fn cmd_park(config: &Config, query: &str, location: &str) -> Result<()> {
    let client = open_client(config, LaunchContext::default())?;
    require_token(&client).await?;

    // Refresh first so newly added cars resolve.
    let tick = client.tick().await?;
    let warning = tick_report(tick, &mut *client.cache().lock().await)?;
    if let Some(warning) = warning {
        warn!(%warning, "resolving against cached cars");
    }
    let car = {
        let cache = client.cache().lock().await;
        resolve_car(cache.config(), query)
            .cloned()
            .ok_or_else(|| Error::UnknownCar {
                query: query.to_string(),
            })?
    };

    let entry = match client.park(&car.id, location).await {
        Ok(entry) => entry,
        Err(e) => return Err(write_error(e, &mut *client.cache().lock().await)),
    };
    println!("{} parked at {} by {}", car.name, entry.location, entry.user);
    Ok(())
}

async fn cmd_users(config: &Config, command: UsersCommand) -> Result<()> {
    let client = open_client(config, LaunchContext::default())?;
    let key = require_token(&client).await?;
    let api = client.api();

    match command {
        UsersCommand::List => {
            let users = api.list_users(&key).await?;
            if users.is_empty() {
                println!("No users.");
                return Ok(());
            }
            println!("{:<20}  {:<18}  CREATED", "NAME", "KEY");
            println!("{}", "-".repeat(60));
            for user in users {
                let created = chrono::DateTime::from_timestamp_millis(user.created_at)
                    .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("{:<20}  {:<18}  {created}", user.name, user.key);
            }
        }
        UsersCommand::Add { name, key: user_key } => {
            let user_key = user_key.unwrap_or_else(generate_key);
            let user = api.create_user(&key, &name, &user_key).await?;
            let link = magic_link(&config.client.server_url, &user.key, &user.name)?;
            println!("Created {} with key {}", user.name, user.key);
            println!("{link}");
        }
        UsersCommand::Remove { key: user_key } => {
            api.delete_user(&key, &user_key).await?;
            println!("Removed {user_key}");
        }
    }
    Ok(())
}

async fn cmd_open(config: &Config, link: &str, location: Option<&str>) -> Result<()> {
    let launch = LaunchContext::from_link(link)?;
    let car = launch.car.clone();
    let client = open_client(config, launch)?;
    require_token(&client).await?;

    println!("Signed in as {}", client.cache().lock().await.display_name());

    match (car, location) {
        (Some(car), Some(location)) => cmd_park_with(&client, &car, location).await?,
        (None, Some(_)) => warn!("link names no car; location ignored"),
        (Some(car), None) => println!("Link is for {car}; run 'parktrack park {car} <location>'"),
        (None, None) => {}
    }
    Ok(())
}

async fn cmd_park_with(client: &Client<HttpApi>, car_id: &str, location: &str) -> Result<()> {
    let tick = client.tick().await?;
    let warning = tick_report(tick, &mut *client.cache().lock().await)?;
    if let Some(warning) = warning {
        eprintln!("{warning}");
    }
    let entry = match client.park(car_id, location).await {
        Ok(entry) => entry,
        Err(e) => return Err(write_error(e, &mut *client.cache().lock().await)),
    };
    println!("{car_id} parked at {} by {}", entry.location, entry.user);
    Ok(())
}

async fn cmd_unlock(config: &Config, password: &str) -> Result<()> {
    let client = open_client(config, LaunchContext::default())?;
    client
        .install_verified(&root_token(password))
        .await
        .map_err(unlock_error)?;
    println!("Admin key installed.");
    Ok(())
}

fn cmd_prefs(config: &Config, grid: Option<u32>, name: Option<String>) -> Result<()> {
    let mut cache = open_cache(config, LaunchContext::default())?;
    if let Some(name) = name {
        cache.set_identity(name)?;
    }
    if let Some(grid) = grid {
        cache.set_grid_columns(grid)?;
    }
    println!("Name: {}", cache.display_name());
    println!("Grid columns: {}", cache.grid_columns());
    Ok(())
}

fn open_cache(config: &Config, launch: LaunchContext) -> Result<ClientCache> {
    let path = match &config.client.state_file {
        Some(path) => path.clone(),
        None => dirs_data_dir()
            .unwrap_or_else(|| ".parktrack".into())
            .join("client.json"),
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    Ok(ClientCache::start(Box::new(FileLocalStore::new(path)), launch)?)
}

fn open_client(config: &Config, launch: LaunchContext) -> Result<Client<HttpApi>> {
    let cache = open_cache(config, launch)?;
    let api = HttpApi::new(&config.client.server_url)?;
    Ok(Client::new(api, cache))
}

async fn require_token(client: &Client<HttpApi>) -> Result<String> {
    client
        .cache()
        .lock()
        .await
        .token()
        .map(str::to_owned)
        .ok_or(Error::NotSignedIn)
}

async fn dashboard(client: &Client<HttpApi>) -> String {
    let cache = client.cache().lock().await;
    let mut out = format!("Signed in as {}\n\n", cache.display_name());
    out.push_str(&display::render_dashboard(
        cache.config(),
        cache.status(),
        cache.grid_columns(),
        &Local::now(),
    ));
    out
}

/// Inspect what a tick left in the cache.
///
/// A revocation is an error. A refused key or a failed refresh becomes a
/// warning to print above the last known state.
fn tick_report(tick: Tick, cache: &mut ClientCache) -> Result<Option<String>> {
    if !cache.take_notices().is_empty() {
        return Err(Error::AccessRevoked);
    }
    Ok(match tick {
        Tick::Rejected => Some(format!("{}; showing the last known state", key_rejected(cache))),
        Tick::Failed => Some("Could not refresh from the server; showing the last known state".into()),
        Tick::Skipped | Tick::Applied | Tick::Stale => None,
    })
}

/// What to report for a write the server did not confirm.
fn write_error(err: runtime::Error, cache: &mut ClientCache) -> Error {
    if !cache.take_notices().is_empty() {
        Error::AccessRevoked
    } else if err.is_unauthorized() {
        key_rejected(cache)
    } else {
        err.into()
    }
}

fn key_rejected(cache: &ClientCache) -> Error {
    Error::KeyRejected {
        failures: cache.session().fail_count(),
        limit: REVOKE_THRESHOLD,
    }
}

fn unlock_error(err: runtime::Error) -> Error {
    if err.is_unauthorized() {
        Error::IncorrectPassword
    } else {
        err.into()
    }
}

fn generate_key() -> String {
    let mut key = uuid::Uuid::new_v4().simple().to_string();
    key.truncate(KEY_LEN);
    key
}

fn compose_location(
    location: Option<String>,
    floor: Option<String>,
    section: Option<String>,
) -> Result<String> {
    match (location, floor, section) {
        (Some(location), _, _) if !location.trim().is_empty() => Ok(location),
        (_, Some(floor), Some(section)) => Ok(format!("{floor}{section}")),
        _ => Err(Error::MissingLocation),
    }
}

fn resolve_car<'a>(config: &'a SharedConfig, query: &str) -> Option<&'a Car> {
    config.car(query).or_else(|| {
        config
            .cars
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(query))
    })
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join("Library/Application Support/parktrack"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("parktrack"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("parktrack"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::{LocalState, MemoryLocalStore, Outcome, REVOKED_NOTICE};
    use storage::IconType;

    fn signed_in_cache() -> ClientCache {
        let store = MemoryLocalStore::new(LocalState {
            token: Some("k-dad".into()),
            user: Some("Dad".into()),
            ..Default::default()
        });
        ClientCache::start(Box::new(store), LaunchContext::default()).unwrap()
    }

    #[test]
    fn revocation_is_reported_after_a_tick() {
        let mut cache = signed_in_cache();
        for _ in 0..3 {
            cache.observe(Outcome::Unauthorized).unwrap();
        }
        let err = tick_report(Tick::Rejected, &mut cache).unwrap_err();
        assert!(matches!(err, Error::AccessRevoked));
        assert_eq!(err.to_string(), REVOKED_NOTICE);
    }

    #[test]
    fn refused_key_is_not_a_network_problem() {
        let mut cache = signed_in_cache();
        cache.observe(Outcome::Unauthorized).unwrap();

        let warning = tick_report(Tick::Rejected, &mut cache).unwrap().unwrap();
        assert!(warning.contains("rejected"), "{warning}");
        assert!(warning.contains("1 of 3"), "{warning}");

        let warning = tick_report(Tick::Failed, &mut cache).unwrap().unwrap();
        assert!(warning.starts_with("Could not refresh"), "{warning}");
        assert_eq!(tick_report(Tick::Applied, &mut cache).unwrap(), None);
    }

    #[test]
    fn write_errors_explain_the_session() {
        let mut cache = signed_in_cache();
        cache.observe(Outcome::Unauthorized).unwrap();
        assert!(matches!(
            write_error(runtime::Error::Unauthorized, &mut cache),
            Error::KeyRejected { failures: 1, limit: 3 }
        ));
        assert!(matches!(
            write_error(runtime::Error::Network("reset".into()), &mut cache),
            Error::Runtime(_)
        ));

        cache.observe(Outcome::Unauthorized).unwrap();
        cache.observe(Outcome::Unauthorized).unwrap();
        assert!(matches!(
            write_error(runtime::Error::Unauthorized, &mut cache),
            Error::AccessRevoked
        ));
    }

    #[test]
    fn wrong_admin_password_is_reported_as_such() {
        assert!(matches!(
            unlock_error(runtime::Error::Unauthorized),
            Error::IncorrectPassword
        ));
        assert!(matches!(
            unlock_error(runtime::Error::Network("refused".into())),
            Error::Runtime(_)
        ));
    }

    #[test]
    fn grid_must_be_positive() {
        assert!(Cli::try_parse_from(["parktrack", "prefs", "--grid", "0"]).is_err());
        let cli = Cli::try_parse_from(["parktrack", "prefs", "--grid", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Prefs { grid: Some(3), .. }));
    }

    #[test]
    fn generated_keys_are_short_and_alphanumeric() {
        let key = generate_key();
        assert_eq!(key.len(), KEY_LEN);
        assert!(key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(key, generate_key());
    }

    #[test]
    fn location_prefers_explicit_value() {
        let loc = compose_location(Some("B2-17".into()), Some("3".into()), Some("A".into()));
        assert_eq!(loc.unwrap(), "B2-17");
    }

    #[test]
    fn location_from_floor_and_section() {
        let loc = compose_location(None, Some("2".into()), Some("B".into()));
        assert_eq!(loc.unwrap(), "2B");
        assert!(matches!(
            compose_location(None, Some("2".into()), None),
            Err(Error::MissingLocation)
        ));
    }

    #[test]
    fn cars_resolve_by_id_or_name() {
        let config = SharedConfig {
            cars: vec![Car {
                id: "c1".into(),
                name: "Civic".into(),
                icon_type: IconType::Sedan,
                color: "#c00".into(),
                text_color: "#fff".into(),
            }],
            ..SharedConfig::default()
        };
        assert_eq!(resolve_car(&config, "c1").map(|c| c.name.as_str()), Some("Civic"));
        assert_eq!(resolve_car(&config, "civic").map(|c| c.id.as_str()), Some("c1"));
        assert!(resolve_car(&config, "golf").is_none());
    }

    #[test]
    fn cli_parses_park_with_floor_and_section() {
        let cli = Cli::parse_from(["parktrack", "park", "c1", "--floor", "2", "--section", "B"]);
        match cli.command {
            Commands::Park {
                car, floor, section, location,
            } => {
                assert_eq!(car, "c1");
                assert_eq!(location, None);
                assert_eq!(floor.as_deref(), Some("2"));
                assert_eq!(section.as_deref(), Some("B"));
            }
            _ => panic!("expected park"),
        }
    }
}
