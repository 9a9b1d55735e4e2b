use std::collections::HashSet;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use linkup_lib::{
    config::Config,
    db, http,
    logging::{self, Console},
    migrate, AppState,
};

#[derive(Debug, Parser)]
#[command(name = "linkup", about = "LinkUp events and storefront API server", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending migrations and serve the HTTP API (the default).
    Serve(ServeArgs),
    /// Database maintenance and inspection commands.
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Default, clap::Args)]
struct ServeArgs {
    /// Address to listen on, e.g. 127.0.0.1:3001. Overrides BIND_ADDR and PORT.
    #[arg(long)]
    bind: Option<String>,
    /// SQLite URL. Overrides DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply pending migrations and print how many ran.
    Migrate {
        #[arg(long)]
        database_url: Option<String>,
    },
    /// List embedded migrations and whether each has been applied.
    Status {
        /// Emit JSON instead of the table view.
        #[arg(long)]
        json: bool,
        #[arg(long)]
        database_url: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve(ServeArgs::default()));
    let console = match command {
        Commands::Serve(_) => Console::Stdout,
        Commands::Db(_) => Console::Stderr,
    };

    let _log_guard = match logging::init(console) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    };

    match run(command) {
        Ok(code) => process::exit(code),
        Err(err) => {
            tracing::error!(target: "linkup", event = "fatal", error = %format!("{err:#}"));
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

fn run(command: Commands) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    runtime.block_on(async move {
        match command {
            Commands::Serve(args) => serve(args).await,
            Commands::Db(db) => handle_db_command(db).await,
        }
    })
}

fn load_config(database_url: Option<String>) -> Result<Config> {
    let mut config = Config::from_env().context("load configuration")?;
    if let Some(url) = database_url {
        config.database_url = url;
    }
    Ok(config)
}

async fn serve(args: ServeArgs) -> Result<i32> {
    let config = load_config(args.database_url)?;
    let addr = args.bind.unwrap_or_else(|| config.listen_addr());

    let pool = db::open_pool(&config.database_url).await?;
    let applied = migrate::apply_migrations(&pool)
        .await
        .context("apply migrations")?;
    tracing::info!(target: "linkup", event = "boot_migrations", applied);

    let state = AppState::new(pool.clone(), config);
    http::serve(state, &addr).await?;
    pool.close().await;
    Ok(0)
}

async fn handle_db_command(command: DbCommand) -> Result<i32> {
    match command {
        DbCommand::Migrate { database_url } => {
            let config = load_config(database_url)?;
            let pool = db::open_pool(&config.database_url).await?;
            let applied = migrate::apply_migrations(&pool).await;
            pool.close().await;
            let applied = applied.context("apply migrations")?;
            println!("Applied {applied} migration(s).");
            Ok(0)
        }
        DbCommand::Status { json, database_url } => {
            let config = load_config(database_url)?;
            let pool = db::open_pool(&config.database_url).await?;
            let applied = migrate::applied_versions(&pool).await;
            pool.close().await;
            let applied = applied.context("read migration ledger")?;

            let done: HashSet<&str> = applied.iter().map(|m| m.version.as_str()).collect();
            let pending: Vec<&str> = migrate::embedded_versions()
                .filter(|v| !done.contains(v))
                .collect();

            if json {
                let report = json!({ "applied": applied, "pending": pending });
                let text = serde_json::to_string_pretty(&report).context("serialize status")?;
                println!("{text}");
            } else {
                println!("{:<32} {:<9} Applied at (ms)", "Migration", "State");
                for m in &applied {
                    println!("{:<32} {:<9} {}", m.version, "applied", m.applied_at);
                }
                for v in &pending {
                    println!("{:<32} {:<9} -", v, "pending");
                }
            }
            Ok(0)
        }
    }
}
