//! Tether CLI — the main entry point.
//!
//! Commands:
//! - `init`     — Write the default config and create the store
//! - `refs`     — Inspect, purge and repair externalized references
//! - `expand`   — Resolve a reference marker to its payload
//! - `task`     — Create and inspect task documents
//! - `failures` — Inspect and maintain the failure ledger
//! - `prompt`   — Assemble a prompt and print it with its statistics

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tether",
    about = "Tether — context memory and attention assembly for coding agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config and create the storage root
    Init,

    /// Externalized reference maintenance
    Refs {
        #[command(subcommand)]
        action: RefsAction,
    },

    /// Print the payload behind a `(see: …)` marker
    Expand {
        /// Text containing a reference marker
        text: String,
    },

    /// Task documents
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Failure ledger
    Failures {
        #[command(subcommand)]
        action: FailuresAction,
    },

    /// Assemble a prompt and print it followed by its statistics
    Prompt {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        input: String,

        /// Retrieved memory snippet (repeatable)
        #[arg(long = "memory")]
        memories: Vec<String>,

        /// Recent conversation entry, oldest first (repeatable)
        #[arg(long = "turn")]
        turns: Vec<String>,

        /// Project instruction document to inject
        #[arg(long)]
        meta: Option<std::path::PathBuf>,
    },
}

#[derive(Subcommand)]
enum RefsAction {
    /// Totals by type and user
    Stats {
        #[arg(short, long)]
        user: Option<String>,
    },
    /// A user's references, newest first
    List {
        #[arg(short, long)]
        user: String,
    },
    /// Print a reference's payload
    Show { ref_id: String },
    /// Delete references older than the retention window
    Purge {
        /// Override `references.retention_days`
        #[arg(short, long)]
        days: Option<u32>,
    },
    /// Report dangling index entries and orphan blobs
    Check {
        /// Drop dangling entries and delete orphan blobs
        #[arg(long)]
        repair: bool,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Write a new task document and print its id
    Create {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        goal: String,
        #[arg(long)]
        id: Option<String>,
    },
    /// Print a task document
    Show {
        #[arg(short, long)]
        user: String,
        #[arg(long)]
        id: Option<String>,
    },
    /// List a user's task documents
    List {
        #[arg(short, long)]
        user: String,
    },
}

#[derive(Subcommand)]
enum FailuresAction {
    /// A user's failures in ledger order
    List {
        #[arg(short, long)]
        user: String,
        #[arg(long)]
        resolved: bool,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Record a failure (or bump an existing one)
    Record {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        action: String,
        #[arg(short, long)]
        error: String,
        #[arg(short, long, default_value = "")]
        context: String,
        #[arg(short = 'L', long, default_value = "")]
        lesson: String,
    },
    /// Mark a failure as resolved
    Resolve {
        #[arg(short, long)]
        user: String,
        failure_id: String,
    },
    /// Summary counts for a user
    Stats {
        #[arg(short, long)]
        user: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Init => commands::init::run()?,
        Commands::Refs { action } => match action {
            RefsAction::Stats { user } => commands::refs::stats(user.as_deref())?,
            RefsAction::List { user } => commands::refs::list(&user)?,
            RefsAction::Show { ref_id } => commands::refs::show(&ref_id)?,
            RefsAction::Purge { days } => commands::refs::purge(days)?,
            RefsAction::Check { repair } => commands::refs::check(repair)?,
        },
        Commands::Expand { text } => commands::refs::expand(&text)?,
        Commands::Task { action } => match action {
            TaskAction::Create { user, goal, id } => {
                commands::task::create(&user, &goal, id.as_deref())?
            }
            TaskAction::Show { user, id } => commands::task::show(&user, id.as_deref())?,
            TaskAction::List { user } => commands::task::list(&user)?,
        },
        Commands::Failures { action } => match action {
            FailuresAction::List {
                user,
                resolved,
                limit,
            } => commands::failures::list(&user, resolved, limit)?,
            FailuresAction::Record {
                user,
                action,
                error,
                context,
                lesson,
            } => commands::failures::record(&user, &action, &error, &context, &lesson)?,
            FailuresAction::Resolve { user, failure_id } => {
                commands::failures::resolve(&user, &failure_id)?
            }
            FailuresAction::Stats { user } => commands::failures::stats(&user)?,
        },
        Commands::Prompt {
            user,
            input,
            memories,
            turns,
            meta,
        } => commands::prompt::run(&user, &input, &memories, &turns, meta.as_deref())?,
    }

    Ok(())
}
