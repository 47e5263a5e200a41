//! CLI subcommand implementations.

pub mod account;
pub mod migrate;

/// Database URL from `MINIAPP_DATABASE_URL`, falling back to `DATABASE_URL`.
pub fn database_url() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var("MINIAPP_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
        .filter(|url| !url.is_empty())
}
