mod app;
mod commands;
mod config;
mod rate_limit;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use app::App;
use config::WorkspaceConfig;
use kv_core::VersionLabel;

#[derive(Parser)]
#[command(name = "kv", about = "Local-first knowledge repository")]
struct Cli {
    /// Path to a TOML config file layered under the built-in defaults.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save a note's working draft.
    SaveDraft {
        note_id: String,
        #[arg(long)]
        body_file: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Publish the current draft as a new version.
    Publish {
        note_id: String,
        #[arg(long = "collection")]
        collection_ids: Vec<String>,
        #[arg(long)]
        major: bool,
        #[arg(long)]
        client_token: String,
    },
    /// Roll a note back to a previously published version.
    Rollback {
        note_id: String,
        target_version_id: String,
        #[arg(long)]
        client_token: String,
    },
    /// Search published content.
    Search {
        text: String,
        #[arg(long = "collection")]
        collection_scope: Vec<String>,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// List a note's version history.
    ListVersions {
        note_id: String,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        page_size: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match WorkspaceConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config: {err}");
            std::process::exit(1);
        }
    };

    let app = match App::open(&config) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("failed to open workspace: {err}");
            std::process::exit(1);
        }
    };

    let exit_code = run(&app, cli.command);
    app.shutdown();
    std::process::exit(exit_code);
}

fn run(app: &App, command: Command) -> i32 {
    let result = dispatch(app, command);
    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            app::map_error_for_exit(&err)
        }
    }
}

fn dispatch(app: &App, command: Command) -> kv_core::Result<()> {
    match command {
        Command::SaveDraft { note_id, body_file, tags } => {
            let body_md = std::fs::read_to_string(&body_file).map_err(kv_core::Error::Io)?;
            commands::save_draft(app, &note_id, &body_md, tags)?;
            println!("draft saved for note {note_id}");
            Ok(())
        }
        Command::Publish { note_id, collection_ids, major, client_token } => {
            let label = if major { Some(VersionLabel::Major) } else { None };
            let outcome = commands::publish(app, note_id, collection_ids, label, client_token)?;
            print_json(&outcome);
            Ok(())
        }
        Command::Rollback { note_id, target_version_id, client_token } => {
            let outcome = commands::rollback(app, note_id, target_version_id, client_token)?;
            print_json(&outcome);
            Ok(())
        }
        Command::Search { text, collection_scope, page, page_size } => {
            let query_id = kv_core::ids::query_id();
            let response = commands::search(app, text, collection_scope, page, page_size, query_id)?;
            print_json(&response);
            Ok(())
        }
        Command::ListVersions { note_id, page, page_size } => {
            let versions = commands::list_versions(app, &note_id, page, page_size)?;
            print_json(&versions);
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("failed to render output: {err}"),
    }
}
