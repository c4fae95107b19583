use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Webhook provider
    pub webhook_secret: Option<String>,

    // Chain filtering
    pub chain_network: Option<String>,

    // Metadata store
    pub metadata_store_url: Option<String>,
    pub metadata_store_token: Option<String>,

    // CORS
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,

            webhook_secret: env::var("WEBHOOK_SECRET").ok(),

            chain_network: env::var("CHAIN_NETWORK").ok(),

            metadata_store_url: env::var("METADATA_STORE_URL").ok(),
            metadata_store_token: env::var("METADATA_STORE_TOKEN").ok(),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }

        match &self.webhook_secret {
            None => {
                tracing::warn!("WEBHOOK_SECRET not set; all webhook deliveries will be rejected");
            }
            Some(secret) if secret.trim().is_empty() => {
                anyhow::bail!("WEBHOOK_SECRET is empty");
            }
            Some(secret) => {
                if secret.len() < 16 {
                    tracing::warn!("WEBHOOK_SECRET is shorter than 16 bytes; use a stronger secret");
                }
                if secret.contains("secret") || secret.contains("123456") {
                    tracing::warn!("Detected dev credentials in config");
                }
            }
        }

        if self.chain_network.is_none() {
            tracing::warn!("CHAIN_NETWORK not set; events from any network will be applied");
        }

        if self.metadata_store_url.is_none() {
            tracing::warn!("METADATA_STORE_URL not set; metadata uploads disabled");
        }

        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn is_testnet(&self) -> bool {
        if self.environment == "development" || self.environment == "testnet" {
            return true;
        }
        match &self.chain_network {
            Some(network) => {
                let network = network.to_ascii_lowercase();
                network.contains("sepolia") || network.contains("testnet")
            }
            None => false,
        }
    }
}
