use anyhow::Result;
use clap::Parser;
use product_catalog::app::App;
use product_catalog::models::Config;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "product-catalog")]
#[command(about = "Serve the product catalog API")]
struct CliArgs {
    /// Address to listen on, overriding BIND_ADDR.
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// SQLite database file, overriding DATABASE_PATH.
    #[arg(long, value_name = "PATH")]
    database: Option<String>,
}

impl CliArgs {
    fn apply(self, mut config: Config) -> Config {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(database) = self.database {
            config.database_path = database;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "product_catalog=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting product-catalog");

    let args = CliArgs::parse();

    let config = match Config::from_env() {
        Ok(config) => args.apply(config),
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    match App::new(&config) {
        Ok(app) => {
            app.run().await?;
            Ok(())
        }
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    }
}
