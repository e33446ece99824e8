//! Callgate operator CLI

mod cli;

use crate::cli::{AccountCommands, Cli, Commands};
use anyhow::{Context, Result};
use callgate::accounts::{AccountService, ActivationOutcome, SignupRequest};
use callgate::aor::AorPattern;
use callgate::auth::ticket::{EXTRA_COOKIE, INFO_COOKIE, MAC_COOKIE};
use callgate::auth::{
    session_token, unix_now, PasswordHash, SharedSecret, SharedSecretStore, TicketIssuer,
    TicketVerdict, TicketVerifier,
};
use callgate::server::cookies::{ticket_set_cookies, CookieAttributes};
use callgate::server::{CallgateServer, CallgateServerConfig};
use callgate::storage::{PostgresConfig, PostgresStore, SALT_PARAMETER};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Only the commands that touch the database need it
    let get_db_config = || -> Result<PostgresConfig> {
        if let Some(url) = &cli.database_url {
            PostgresConfig::from_url(url).context("Invalid DATABASE_URL")
        } else {
            PostgresConfig::from_env().context("DATABASE_URL not set")
        }
    };

    match cli.command {
        Commands::Serve {
            bind,
            session_duration,
            cookie_domain,
        } => {
            serve(
                get_db_config()?,
                bind,
                session_duration,
                cookie_domain,
                cli.session_salt,
                cli.ws_secret,
            )
            .await
        }
        Commands::Ticket {
            from,
            to,
            ttl,
            extra,
        } => ticket(cli.ws_secret, &from, &to, ttl, extra.as_deref()),
        Commands::VerifyTicket {
            info,
            extra,
            mac,
            from,
            to,
            at,
        } => verify_ticket(cli.ws_secret, &info, extra.as_deref(), &mac, &from, &to, at),
        Commands::PasswordHash { username, password } => {
            println!("{}", PasswordHash::compute(&username, &password).as_str());
            Ok(())
        }
        Commands::SessionToken { username } => {
            let salt = cli
                .session_salt
                .context("CALLGATE_SESSION_SALT or --session-salt required")?;
            println!("{}", session_token(&username, &SharedSecret::new(salt)));
            Ok(())
        }
        Commands::Account { command } => account(get_db_config()?, command).await,
        Commands::Init { salt } => init(get_db_config()?, salt).await,
        Commands::Status => status(get_db_config()?).await,
    }
}

fn ws_secret(secret: Option<String>) -> Result<SharedSecret> {
    secret
        .filter(|s| !s.is_empty())
        .map(SharedSecret::new)
        .context("CALLGATE_WS_SECRET or --ws-secret required")
}

async fn serve(
    db_config: PostgresConfig,
    bind: String,
    session_duration: u64,
    cookie_domain: Option<String>,
    session_salt: Option<String>,
    ws_secret: Option<String>,
) -> Result<()> {
    let store = Arc::new(PostgresStore::new(db_config).await?);

    let session_salt = match session_salt {
        Some(salt) => Some(salt),
        None => store
            .load_parameter(SALT_PARAMETER)
            .await
            .context("Failed to load session salt")?,
    };

    let config = CallgateServerConfig {
        bind_addr: bind.parse().context("Invalid bind address")?,
        session_duration,
        cookie_domain,
        secrets: SharedSecretStore::new(
            session_salt.map(SharedSecret::new),
            ws_secret.map(SharedSecret::new),
        ),
    };

    let server = CallgateServer::new(config, store);

    info!("Starting callgate gateway...");
    server.run().await?;

    Ok(())
}

fn ticket(secret: Option<String>, from: &str, to: &str, ttl: u64, extra: Option<&str>) -> Result<()> {
    let from = AorPattern::parse(from).with_context(|| format!("Invalid from pattern: {}", from))?;
    let to = AorPattern::parse(to).with_context(|| format!("Invalid to pattern: {}", to))?;
    if from.is_universal() && to.is_universal() {
        warn!("Ticket admits any caller to any callee");
    }

    let issuer = TicketIssuer::new(ws_secret(secret)?);
    let ticket = issuer.issue(from, to, ttl, extra, unix_now())?;

    println!("{}={}", INFO_COOKIE, ticket.info);
    if let Some(extra) = &ticket.extra {
        println!("{}={}", EXTRA_COOKIE, extra);
    }
    println!("{}={}", MAC_COOKIE, ticket.mac);
    println!();
    println!("Expires at: {}", ticket.expires_at());
    println!("Set-Cookie headers:");
    for header in ticket_set_cookies(&ticket, &CookieAttributes::default()) {
        println!("  Set-Cookie: {}", header);
    }

    Ok(())
}

fn verify_ticket(
    secret: Option<String>,
    info: &str,
    extra: Option<&str>,
    mac: &str,
    from: &str,
    to: &str,
    at: Option<u64>,
) -> Result<()> {
    let verifier = TicketVerifier::new(ws_secret(secret)?);
    let now = at.unwrap_or_else(unix_now);

    match verifier.verify(info, extra, mac, from, to, now) {
        TicketVerdict::Admitted(payload) => {
            println!("admitted");
            println!("  from: {}", payload.from);
            println!("  to: {}", payload.to);
            println!("  valid: [{}, {})", payload.issued_at, payload.expires_at());
            Ok(())
        }
        TicketVerdict::Rejected(reason) => {
            println!("rejected: {}", reason);
            std::process::exit(1);
        }
    }
}

async fn account(db_config: PostgresConfig, command: AccountCommands) -> Result<()> {
    let store = Arc::new(PostgresStore::new(db_config).await?);
    let accounts = AccountService::new(store);

    match command {
        AccountCommands::Create {
            username,
            password,
            email,
            fullname,
            domain,
        } => {
            let account = accounts
                .signup(SignupRequest {
                    username,
                    password,
                    fullname,
                    domain,
                    email,
                })
                .await?;

            println!("Created account {} ({})", account.username, account.state);
            println!("Activation code: {}", account.activation_code);
        }
        AccountCommands::Activate { username, code } => {
            match accounts.activate(&username, &code).await? {
                ActivationOutcome::Activated => println!("Activated {}", username),
                ActivationOutcome::AlreadyActive => println!("{} was already active", username),
                ActivationOutcome::Rejected => {
                    anyhow::bail!("Activation rejected for {}", username)
                }
            }
        }
        AccountCommands::Disable { username } => {
            accounts.disable(&username).await?;
            println!("Disabled {}", username);
        }
        AccountCommands::Show { username } => {
            let account = accounts
                .lookup(&username)
                .await?
                .with_context(|| format!("No such account: {}", username))?;

            println!("Account: {}", account.username);
            println!("  id: {}", account.id);
            println!("  state: {}", account.state);
            println!("  email: {}", account.email);
            if !account.fullname.is_empty() {
                println!("  fullname: {}", account.fullname);
            }
            if !account.domain.is_empty() {
                println!("  domain: {}", account.domain);
            }
            println!("  activation date: {}", account.activation_date);
        }
    }

    Ok(())
}

async fn init(db_config: PostgresConfig, salt: Option<String>) -> Result<()> {
    let store = PostgresStore::new(db_config).await?;

    if let Some(salt) = salt {
        if salt.is_empty() {
            anyhow::bail!("Session salt may not be empty");
        }
        store.store_parameter(SALT_PARAMETER, &salt).await?;
        println!("Session salt stored");
    }

    println!("Database schema initialized successfully");
    Ok(())
}

async fn status(db_config: PostgresConfig) -> Result<()> {
    let store = PostgresStore::new(db_config).await?;

    println!("Callgate Status");
    println!("===============");
    println!("Database: Connected");
    println!("Accounts: {}", store.account_count().await?);

    let salt = store.load_parameter(SALT_PARAMETER).await?;
    println!(
        "Session salt: {}",
        if salt.is_some() { "stored" } else { "not stored" }
    );

    Ok(())
}
