//! Callgate daemon - authentication gateway for WebSocket calling

use anyhow::{Context, Result};
use callgate::auth::{SharedSecret, SharedSecretStore, DEFAULT_SESSION_DURATION};
use callgate::server::{CallgateServer, CallgateServerConfig};
use callgate::storage::{AccountRepository, MemoryStore, PostgresConfig, PostgresStore, SALT_PARAMETER};
use clap::Parser;
use std::fs::{File, OpenOptions};
use std::os::fd::IntoRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "callgated")]
#[command(about = "Callgate authentication gateway daemon")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8080", env = "CALLGATE_BIND")]
    bind: String,

    /// Seconds of inactivity before a session expires
    #[arg(long, env = "CALLGATE_SESSION_DURATION", default_value_t = DEFAULT_SESSION_DURATION)]
    session_duration: u64,

    /// Domain attribute for cookies
    #[arg(long, env = "CALLGATE_COOKIE_DOMAIN")]
    cookie_domain: Option<String>,

    /// Salt for session cookies; loaded from the database when absent
    #[arg(long, env = "CALLGATE_SESSION_SALT", hide_env_values = true)]
    session_salt: Option<String>,

    /// Secret for WebSocket tickets
    #[arg(long, env = "CALLGATE_WS_SECRET", hide_env_values = true)]
    ws_secret: Option<String>,

    /// Database URL; accounts are kept in memory when absent
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Run as daemon (background)
    #[arg(short, long)]
    daemon: bool,

    /// PID file path (only with --daemon)
    #[arg(long, env = "CALLGATE_PIDFILE")]
    pidfile: Option<PathBuf>,

    /// Append logs to this file instead of stdout
    #[arg(long, env = "CALLGATE_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let mut args = Args::parse();

    // Resolve paths before the daemon moves to `/`
    let log_file = open_log_file(args.log_file.as_deref())?;
    args.pidfile = args.pidfile.as_deref().map(absolute_path).transpose()?;

    // Fork while the process is still single-threaded
    if args.daemon {
        if log_file.is_none() {
            eprintln!("callgated: --daemon without --log-file discards all log output");
        }
        daemonize(&args)?;
    }

    init_tracing(&args.log_level, log_file);

    build_runtime()?.block_on(run_server(args))
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("Failed to read working directory")?
        .join(path))
}

fn open_log_file(path: Option<&Path>) -> Result<Option<File>> {
    path.map(|p| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(p)
            .with_context(|| format!("Failed to open log file: {:?}", p))
    })
    .transpose()
}

fn init_tracing(log_level: &str, log_file: Option<File>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let (file_layer, stdout_layer) = match log_file {
        Some(file) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            None,
        ),
        None => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

fn daemonize(args: &Args) -> Result<()> {
    use std::io::Write;

    match unsafe { libc::fork() } {
        -1 => return Err(anyhow::anyhow!("Fork failed")),
        0 => {}
        pid => {
            // Parent writes the pidfile and leaves
            if let Some(pidfile) = &args.pidfile {
                let mut f = File::create(pidfile)
                    .with_context(|| format!("Failed to create pidfile: {:?}", pidfile))?;
                writeln!(f, "{}", pid)?;
            }
            std::process::exit(0);
        }
    }

    if unsafe { libc::setsid() } == -1 {
        return Err(anyhow::anyhow!("setsid failed"));
    }

    std::env::set_current_dir("/")?;

    redirect_stdio()
}

/// Point fds 0-2 at /dev/null so later sockets never land on them
fn redirect_stdio() -> Result<()> {
    let devnull = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .context("Failed to open /dev/null")?;
    let fd = devnull.into_raw_fd();

    for target in 0..=2 {
        if unsafe { libc::dup2(fd, target) } == -1 {
            return Err(anyhow::anyhow!("dup2 onto fd {} failed", target));
        }
    }

    if fd > 2 {
        unsafe {
            libc::close(fd);
        }
    }

    Ok(())
}

/// Open the account store and resolve the session salt
async fn open_store(
    args: &Args,
) -> Result<(Arc<dyn AccountRepository>, Option<SharedSecret>)> {
    let configured_salt = args
        .session_salt
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(SharedSecret::new);

    let Some(url) = &args.database_url else {
        warn!("No DATABASE_URL; accounts are kept in memory and lost on exit");
        return Ok((Arc::new(MemoryStore::new()), configured_salt));
    };

    let db_config = PostgresConfig::from_url(url).context("Invalid DATABASE_URL")?;
    let store = PostgresStore::new(db_config).await?;

    let salt = match configured_salt {
        Some(salt) => Some(salt),
        None => store
            .load_parameter(SALT_PARAMETER)
            .await
            .context("Failed to load session salt")?
            .filter(|s| !s.is_empty())
            .map(SharedSecret::new),
    };

    Ok((Arc::new(store), salt))
}

async fn run_server(args: Args) -> Result<()> {
    let (store, session_salt) = open_store(&args).await?;

    let bind_addr = args.bind.parse().context("Invalid bind address")?;

    let config = CallgateServerConfig {
        bind_addr,
        session_duration: args.session_duration,
        cookie_domain: args.cookie_domain.clone(),
        secrets: SharedSecretStore::new(
            session_salt,
            args.ws_secret.as_deref().map(SharedSecret::new),
        ),
    };

    let server = CallgateServer::new(config, store);

    info!(addr = %args.bind, "Callgate daemon starting");

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = shutdown_signal() => {
            info!(
                sessions = server.state().sessions.count(),
                "Shutdown signal received, stopping server"
            );
        }
    }

    if let Some(pidfile) = &args.pidfile {
        if pidfile.exists() {
            if let Err(e) = std::fs::remove_file(pidfile) {
                warn!(error = %e, "Failed to remove pidfile");
            }
        }
    }

    info!("Callgate daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
