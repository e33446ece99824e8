//! CLI command definitions

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "callgate")]
#[command(about = "Operator tool for the callgate gateway", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database URL
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Salt for session cookies
    #[arg(long, env = "CALLGATE_SESSION_SALT", global = true, hide_env_values = true)]
    pub session_salt: Option<String>,

    /// Secret for WebSocket tickets
    #[arg(long, env = "CALLGATE_WS_SECRET", global = true, hide_env_values = true)]
    pub ws_secret: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway in the foreground
    Serve {
        /// Address to bind to
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        bind: String,

        /// Seconds of inactivity before a session expires
        #[arg(long, default_value_t = callgate::auth::DEFAULT_SESSION_DURATION)]
        session_duration: u64,

        /// Domain attribute for cookies
        #[arg(long, env = "CALLGATE_COOKIE_DOMAIN")]
        cookie_domain: Option<String>,
    },

    /// Mint a WebSocket ticket
    ///
    /// Examples:
    ///   callgate ticket --from 'alice@*' --to '*@example.org' --ttl 3600
    ///   callgate ticket --from '*@*' --to '*@*' --extra 'conference=7'
    Ticket {
        /// Caller pattern, `user@host` with `*` wildcards
        #[arg(long, default_value = "*@*")]
        from: String,

        /// Callee pattern, `user@host` with `*` wildcards
        #[arg(long, default_value = "*@*")]
        to: String,

        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: u64,

        /// Opaque data covered by the MAC
        #[arg(long)]
        extra: Option<String>,
    },

    /// Check a ticket against a pair of endpoints
    VerifyTicket {
        /// Value of the WSSessionInfo cookie
        #[arg(long)]
        info: String,

        /// Value of the WSSessionExtra cookie
        #[arg(long)]
        extra: Option<String>,

        /// Value of the WSSessionMAC cookie
        #[arg(long)]
        mac: String,

        /// Calling address
        #[arg(long)]
        from: String,

        /// Called address
        #[arg(long)]
        to: String,

        /// Unix time to check at; defaults to now
        #[arg(long)]
        at: Option<u64>,
    },

    /// Print the stored password hash for a username and password
    PasswordHash { username: String, password: String },

    /// Print the session token for a username
    SessionToken { username: String },

    /// Manage accounts
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },

    /// Initialize the database schema
    Init {
        /// Store this session salt in the parameters table
        #[arg(long)]
        salt: Option<String>,
    },

    /// Show database status
    Status,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create an unverified account and print its activation code
    Create {
        username: String,

        #[arg(long)]
        password: String,

        #[arg(long)]
        email: String,

        #[arg(long, default_value = "")]
        fullname: String,

        #[arg(long, default_value = "")]
        domain: String,
    },

    /// Activate an account with its activation code
    Activate { username: String, code: String },

    /// Disable an account
    Disable { username: String },

    /// Show account details
    Show { username: String },
}
