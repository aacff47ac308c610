use catalog::config::{Settings, redact_db_url};
use catalog::inspector::LiveCatalogSource;
use catalog::model::Dialect;
use catalog::registry::{NewConnection, SeaOrmConnectionRegistry};
use catalog::store::SeaOrmMetadataStore;
use catalog::Introspector;
use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "catalog", about = "Catalog - relational schema introspection")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage source connections
    Connection {
        #[command(subcommand)]
        action: ConnectionAction,
    },
    /// Introspect a connection and replace its stored catalog
    Introspect {
        connection_id: Uuid,
        /// Wait for an in-flight run instead of failing as busy
        #[arg(long, action = clap::ArgAction::SetTrue)]
        join: bool,
    },
    /// List stored tables of a connection
    Tables { connection_id: Uuid },
    /// Show one stored table with its columns
    Table { table_id: Uuid },
    /// List stored relations of a connection with their table and column names
    Relations {
        connection_id: Uuid,
        /// Include inverse and junction-derived many-to-many edges
        #[arg(long, action = clap::ArgAction::SetTrue)]
        view: bool,
    },
    /// Delete the stored catalog of a connection
    DeleteMetadata { connection_id: Uuid },
}

#[derive(Subcommand)]
enum ConnectionAction {
    /// Register a source connection
    Add {
        #[arg(long)]
        name: String,
        /// postgresql, mysql or sqlite
        #[arg(long)]
        dialect: Dialect,
        #[arg(long, default_value = "")]
        host: String,
        #[arg(long)]
        port: Option<u16>,
        /// Database name, or the file path for SQLite
        #[arg(long)]
        database: String,
        /// Schema to read; defaults to public / the database / main
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long, default_value = "")]
        username: String,
        #[arg(long, default_value = "")]
        password: String,
    },
    /// List registered connections
    List,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Init structured logging (respects RUST_LOG; defaults to info)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    tracing::info!(database = %redact_db_url(&settings.database_url), "connecting to database");

    let db = Database::connect(&settings.database_url).await?;
    Migrator::up(&db, None).await?;

    tracing::info!("database initialized");

    let registry = Arc::new(SeaOrmConnectionRegistry::new(db.clone()));
    let introspector = Introspector::new(
        registry.clone(),
        Arc::new(SeaOrmMetadataStore::new(db)),
        Arc::new(LiveCatalogSource::new(settings.inspector.clone())),
    );

    match cli.command {
        Commands::Connection { action } => handle_connection_action(&registry, action).await?,
        Commands::Introspect {
            connection_id,
            join,
        } => {
            let summary = if join {
                introspector.introspect_or_join(connection_id).await?
            } else {
                introspector.introspect(connection_id).await?
            };
            print_json(&summary)?;
        }
        Commands::Tables { connection_id } => {
            print_json(&introspector.get_tables(connection_id).await?)?;
        }
        Commands::Table { table_id } => {
            print_json(&introspector.get_table(table_id).await?)?;
        }
        Commands::Relations {
            connection_id,
            view,
        } => {
            if view {
                print_json(&introspector.get_relation_view(connection_id).await?)?;
            } else {
                print_json(&introspector.get_named_relations(connection_id).await?)?;
            }
        }
        Commands::DeleteMetadata { connection_id } => {
            let removed = introspector.delete_metadata(connection_id).await?;
            print_json(&serde_json::json!({
                "connection_id": connection_id,
                "removed_tables": removed,
            }))?;
        }
    }

    Ok(())
}

async fn handle_connection_action(
    registry: &SeaOrmConnectionRegistry,
    action: ConnectionAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConnectionAction::Add {
            name,
            dialect,
            host,
            port,
            database,
            namespace,
            username,
            password,
        } => {
            let record = registry
                .register(NewConnection {
                    name,
                    dialect,
                    host,
                    port,
                    database,
                    namespace,
                    username,
                    password,
                })
                .await?;
            print_json(&record)?;
        }
        ConnectionAction::List => {
            print_json(&registry.list().await?)?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
