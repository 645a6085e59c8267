use std::sync::Arc;

use rpicam_capture::{RaspiStill, RaspiStillConfig};

use rpicam_core::{config::Config, status::ProcessStatus};

#[tokio::main]
async fn main() -> Result<(), rpicam_core::Error> {
    // Taken before anything else so /status uptime covers the whole process.
    let status = Arc::new(ProcessStatus::new());

    let cfg = Arc::new(Config::load()?);
    rpicam_core::logging::init("rpicam", cfg.verbose)?;

    let camera = Arc::new(RaspiStill::new(RaspiStillConfig::new(
        cfg.raspistill_path.clone(),
    )));
    tracing::debug!(program = %cfg.raspistill_path.display(), "camera configured");

    rpicam_telegram::router::run_polling(cfg, camera, status)
        .await
        .map_err(|e| rpicam_core::Error::External(format!("telegram bot failed: {e:#}")))?;

    Ok(())
}
