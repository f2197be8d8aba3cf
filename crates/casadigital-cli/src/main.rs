mod links;
mod sync;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "casadigital-cli")]
#[command(about = "Casa Digital command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Search one affiliate store and upsert the results
    Sync {
        /// Affiliate store id
        #[arg(long)]
        store_id: i64,

        /// Search term sent to the marketplace
        #[arg(long)]
        query: String,

        /// Restrict the search to a marketplace category id
        #[arg(long)]
        category: Option<String>,

        #[arg(long, default_value = "50")]
        limit: u32,
    },
    /// Run the configured search catalog against one or every active store
    SyncCatalog {
        /// Only sync this store; defaults to all active stores
        #[arg(long)]
        store_id: Option<i64>,
    },
    /// Rewrite a product URL into its affiliate form
    Convert {
        #[arg(long, default_value = "mercadolivre")]
        platform: String,

        url: String,
    },
    /// Print affiliate link coverage
    Stats {
        /// Restrict the counts to one platform
        #[arg(long)]
        platform: Option<String>,
    },
    /// Clear stored affiliate links that no longer look valid
    ValidateLinks {
        #[arg(long, default_value = "mercadolivre")]
        platform: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("casadigital-cli: no command given, see --help");
        return Ok(());
    };

    let config = casadigital_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match command {
        Commands::Migrate => {
            let pool = connect(&config).await?;
            let applied = casadigital_db::run_migrations(&pool).await?;
            println!("migrations applied: {applied}");
        }
        Commands::Sync {
            store_id,
            query,
            category,
            limit,
        } => {
            let pool = connect(&config).await?;
            sync::run_store_sync(&pool, &config, store_id, query, category, limit).await?;
        }
        Commands::SyncCatalog { store_id } => {
            let pool = connect(&config).await?;
            sync::run_catalog_sync(&pool, &config, store_id).await?;
        }
        Commands::Convert { platform, url } => links::run_convert(&config, &platform, &url)?,
        Commands::Stats { platform } => {
            let pool = connect(&config).await?;
            links::run_stats(&pool, platform.as_deref()).await?;
        }
        Commands::ValidateLinks { platform } => {
            let pool = connect(&config).await?;
            links::run_validate_links(&pool, &platform).await?;
        }
    }

    Ok(())
}

async fn connect(config: &casadigital_core::AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = casadigital_db::PoolConfig::from_app_config(config);
    Ok(casadigital_db::connect_pool(&config.database_url, pool_config).await?)
}
