//! pdfdesk-admin - operational tasks against the pdfdesk database
//!
//! Every mutating command asks for confirmation unless `--yes` is given.

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pdfdesk_shared::Role;
use pdfdesk_store::Database;

mod commands;

use commands::Console;

/// pdfdesk administration tool
#[derive(Parser)]
#[command(name = "pdfdesk-admin")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, env = "DATABASE_PATH", default_value = "./pdfdesk.db", global = true)]
    database: PathBuf,

    /// Answer yes to every confirmation prompt
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all accounts
    ListUsers,

    /// Set a new password, read twice from stdin
    ResetPassword {
        #[arg(short, long)]
        email: String,
    },

    /// Change an account's role
    SetRole {
        #[arg(short, long)]
        email: String,

        /// admin or user
        #[arg(short, long)]
        role: Role,
    },

    /// Block an account and revoke its sessions
    Block {
        #[arg(short, long)]
        email: String,
    },

    /// Unblock an account
    Unblock {
        #[arg(short, long)]
        email: String,
    },

    /// Insert system log entries from a JSON array
    SeedLogs {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Delete expired refresh sessions
    PurgeSessions,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,pdfdesk_admin=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let db = Database::open_at(&cli.database)?;
    let mut console = Console::new(io::stdin().lock(), io::stdout().lock(), cli.yes);

    match cli.command {
        Commands::ListUsers => commands::list_users(&db, &mut console),
        Commands::ResetPassword { email } => commands::reset_password(&db, &mut console, &email),
        Commands::SetRole { email, role } => commands::set_role(&db, &mut console, &email, role),
        Commands::Block { email } => commands::set_blocked(&db, &mut console, &email, true),
        Commands::Unblock { email } => commands::set_blocked(&db, &mut console, &email, false),
        Commands::SeedLogs { file } => commands::seed_logs(&db, &mut console, &file),
        Commands::PurgeSessions => commands::purge_sessions(&db, &mut console),
    }
}
