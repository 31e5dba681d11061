//! WOPI CLI
//!
//! Command-line tools for WOPI host operators.
//!
//! # Commands
//!
//! - `discovery` - List the applications, actions and proof keys of a discovery document
//! - `action-url` - Resolve and expand the client URL for a file extension and action
//! - `proof-message` - Print the bytes a client signs for a request
//! - `verify-proof` - Check proof headers against a discovery document
//! - `issue-token` - Issue a signed access token
//! - `check-token` - Validate a signed access token

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// WOPI host command-line tools.
#[derive(Parser)]
#[command(name = "wopi")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Discovery document: a file path or an http(s) URL
    #[arg(global = true, short, long)]
    discovery: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List applications, actions and proof keys
    Discovery {
        /// Only show actions for this extension
        #[arg(short, long)]
        ext: Option<String>,
    },

    /// Resolve the client URL for an extension and action
    ActionUrl {
        /// File extension, e.g. docx
        #[arg(short, long)]
        ext: String,

        /// Action name, e.g. edit
        #[arg(short, long)]
        action: String,

        /// CheckFileInfo URL of the file
        #[arg(short, long)]
        wopi_src: String,

        /// UI language, e.g. en-US
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Print the proof message for a request
    ProofMessage {
        /// Access token
        #[arg(short, long)]
        token: String,

        /// Full request URL
        #[arg(short, long)]
        url: String,

        /// X-WOPI-TimeStamp value (ticks); defaults to now
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Verify proof headers against the discovery proof keys
    VerifyProof {
        /// Access token
        #[arg(short, long)]
        token: String,

        /// Full request URL
        #[arg(short, long)]
        url: String,

        /// X-WOPI-TimeStamp value
        #[arg(long)]
        timestamp: String,

        /// X-WOPI-Proof value
        #[arg(long)]
        proof: String,

        /// X-WOPI-ProofOld value
        #[arg(long)]
        proof_old: Option<String>,

        /// Accepted clock skew in minutes
        #[arg(long, default_value = "20")]
        skew_minutes: u64,
    },

    /// Issue a signed access token
    IssueToken {
        /// HMAC secret
        #[arg(short, long)]
        secret: String,

        /// File id the token is scoped to
        #[arg(long)]
        file_id: String,

        /// Subject user id
        #[arg(long)]
        user_id: String,

        /// Lifetime in seconds
        #[arg(long, default_value = "36000")]
        ttl_secs: u64,
    },

    /// Validate a signed access token
    CheckToken {
        /// HMAC secret
        #[arg(short, long)]
        secret: String,

        /// File id the token must be scoped to
        #[arg(long)]
        file_id: String,

        /// Token to check
        #[arg(long)]
        token: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let format = cli.format.as_str();
    match cli.command {
        Commands::Discovery { ext } => {
            let source = cli.discovery.ok_or("--discovery required for discovery")?;
            commands::discovery::run(&source, ext.as_deref(), format)?;
        }
        Commands::ActionUrl {
            ext,
            action,
            wopi_src,
            language,
        } => {
            let source = cli.discovery.ok_or("--discovery required for action-url")?;
            commands::action_url::run(&source, &ext, &action, &wopi_src, language.as_deref())?;
        }
        Commands::ProofMessage {
            token,
            url,
            timestamp,
        } => {
            commands::proof::message(&token, &url, timestamp.as_deref(), format)?;
        }
        Commands::VerifyProof {
            token,
            url,
            timestamp,
            proof,
            proof_old,
            skew_minutes,
        } => {
            let source = cli.discovery.ok_or("--discovery required for verify-proof")?;
            let input = wopi_server::ProofValidatorInput {
                access_token: token,
                url,
                timestamp: Some(timestamp),
                proof: Some(proof),
                proof_old,
            };
            commands::proof::verify(&source, &input, skew_minutes)?;
        }
        Commands::IssueToken {
            secret,
            file_id,
            user_id,
            ttl_secs,
        } => {
            commands::token::issue(&secret, &file_id, &user_id, ttl_secs, format)?;
        }
        Commands::CheckToken {
            secret,
            file_id,
            token,
        } => {
            commands::token::check(&secret, &file_id, &token, format)?;
        }
        Commands::Version => {
            println!("WOPI CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
