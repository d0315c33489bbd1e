use std::net::SocketAddr;

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    /// Number of rows per page when a list request carries `?page=N`.
    pub page_size: u64,
    pub bcrypt_cost: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "8000".to_string()).parse().context("PORT")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://afisha.db?mode=rwc".to_string());

        let page_size: u64 =
            std::env::var("PAGE_SIZE").ok().and_then(|s| s.parse().ok()).unwrap_or(20);

        let bcrypt_cost: u32 = match std::env::var("BCRYPT_COST") {
            Ok(s) => s.parse().context("BCRYPT_COST")?,
            Err(_) => bcrypt::DEFAULT_COST,
        };

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            page_size: page_size.max(1),
            bcrypt_cost,
        })
    }
}
