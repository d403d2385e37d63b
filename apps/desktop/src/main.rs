slint::include_modules!(); // from build.rs compiled ui/main.slint

mod config;
mod controller;

use anyhow::Context;
use app_settings::AppSettings;
use config::ConfigStore;
use controller::Controller;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let settings = AppSettings::load().unwrap_or_else(|err| {
        warn!("Failed to load settings, using defaults: {err}");
        AppSettings::default()
    });
    let config = ConfigStore::load().unwrap_or_else(|err| {
        warn!("Failed to load app config: {err}");
        ConfigStore::new_default()
    });
    debug!(
        recent = config.snapshot().recent_images.len(),
        "loaded app config"
    );

    let ui = MainWindow::new().context("creating main window")?;
    let controller = Controller::new(&ui, settings, config);
    controller.install(&ui);

    ui.run().context("running event loop")?;
    Ok(())
}
