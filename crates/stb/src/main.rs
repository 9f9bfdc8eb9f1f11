use std::sync::Arc;

use tracing::info;

use stb_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), stb_core::Error> {
    let cfg = Arc::new(Config::load()?);
    stb_core::logging::init("stb", &cfg.log_level)?;

    let conn = stb_core::db::open(&cfg.database_path)?;
    info!(database = %cfg.database_path.display(), "Database ready");

    stb_telegram::router::run_polling(cfg, conn)
        .await
        .map_err(|e| stb_core::Error::Transient(format!("telegram bot failed: {e}")))?;

    Ok(())
}
