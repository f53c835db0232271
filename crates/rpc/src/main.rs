//! TrustCore CLI - Main entry point

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use trustcore_core::{Identity, TrustConfig};
use trustcore_ledger::{Checkpoint, EventFilter};
use trustcore_rpc::commands::{self, Subject};
use trustcore_rpc::AppContext;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "trustcore")]
#[command(about = "TrustCore - audit ledger and data access control", long_about = None)]
struct Cli {
    /// Data directory path
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    /// JSON configuration file (overrides --data)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and report the chain head
    Init,

    /// Append an audit event
    Append {
        /// Event type tag
        event_type: String,
        /// Acting user ID
        #[arg(long)]
        actor: String,
        /// Acting user's role
        #[arg(long)]
        role: String,
        /// Session ID (generated if omitted)
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        application: Option<String>,
        #[arg(long)]
        decision: Option<String>,
        /// JSON payload
        #[arg(long)]
        payload: Option<String>,
    },

    /// Query audit events
    Events {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value = "50")]
        limit: usize,
        /// Continue after this event ID
        #[arg(long)]
        after: Option<u64>,
        /// Snapshot bound from a previous page
        #[arg(long)]
        through: Option<u64>,
    },

    /// Verify the hash chain
    Verify {
        /// Verify an exported JSONL file instead of the database
        #[arg(long)]
        file: Option<PathBuf>,
        /// Resume after this checkpoint ID (requires --hash)
        #[arg(long, requires = "hash")]
        after: Option<u64>,
        /// Hash of the checkpoint event (requires --after)
        #[arg(long, requires = "after")]
        hash: Option<String>,
    },

    /// Show the data scope for a role
    Scope {
        role: String,
        #[arg(long, default_value = "anonymous")]
        user: String,
    },

    /// Export audit events as JSONL evidence
    Export {
        output: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(clap::Args)]
struct FilterArgs {
    #[arg(long)]
    session: Option<String>,
    #[arg(long)]
    application: Option<String>,
    #[arg(long)]
    decision: Option<String>,
    #[arg(long)]
    event_type: Option<String>,
    /// Inclusive lower bound (RFC 3339)
    #[arg(long)]
    from: Option<DateTime<Utc>>,
    /// Exclusive upper bound (RFC 3339)
    #[arg(long)]
    to: Option<DateTime<Utc>>,
}

impl FilterArgs {
    fn into_filter(self) -> EventFilter {
        EventFilter {
            session_id: self.session,
            subject_application_id: self.application,
            subject_decision_id: self.decision,
            event_type: self.event_type,
            from: self.from,
            to: self.to,
            ..EventFilter::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TrustConfig::from_file(path)?,
        None => TrustConfig::in_dir(&cli.data),
    }
    .with_env_overrides();

    match cli.command {
        // Offline commands never open the database
        Commands::Scope { role, user } => commands::scope(&role, &user)?,

        Commands::Verify {
            file: Some(file), ..
        } => commands::verify_file(&file)?,

        command => {
            let ctx = AppContext::open(config)?;
            run(&ctx, command).await?;
        }
    }

    Ok(())
}

async fn run(ctx: &AppContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init => commands::init(ctx)?,

        Commands::Append {
            event_type,
            actor,
            role,
            session,
            application,
            decision,
            payload,
        } => {
            let identity = Identity::from_claims(actor, &role, "", "")?;
            let subject = Subject {
                session_id: Some(session.unwrap_or_else(|| Uuid::new_v4().to_string())),
                application_id: application,
                decision_id: decision,
            };
            commands::append(ctx, &identity, &event_type, subject, payload.as_deref())?;
        }

        Commands::Events {
            filter,
            limit,
            after,
            through,
        } => {
            let mut filter = filter.into_filter().limit(limit);
            filter.after_id = after;
            filter.through_id = through;
            commands::events(ctx, &filter)?;
        }

        Commands::Verify { after, hash, .. } => {
            let resume = after.zip(hash).map(|(id, hash)| Checkpoint { id, hash });
            commands::verify(ctx, resume).await?;
        }

        Commands::Export { output, filter } => {
            commands::export(ctx, &filter.into_filter(), &output)?;
        }

        Commands::Scope { role, user } => commands::scope(&role, &user)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_verify_checkpoint_needs_both_halves() {
        for args in [
            vec!["trustcore", "verify", "--hash", "abc"],
            vec!["trustcore", "verify", "--after", "7"],
        ] {
            let err = Cli::try_parse_from(args).err().unwrap();
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }

        let cli = Cli::try_parse_from(["trustcore", "verify", "--after", "7", "--hash", "abc"]).unwrap();
        match cli.command {
            Commands::Verify { after, hash, .. } => {
                assert_eq!(after, Some(7));
                assert_eq!(hash.as_deref(), Some("abc"));
            }
            _ => panic!("expected verify"),
        }
    }
}
