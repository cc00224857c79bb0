//! bookbot
//!
//! Logs into a web booking system at a configured pre-login time, solving
//! the image captcha with an object-detection model, then reserves the
//! configured ticket at the configured start time.

mod bot;
mod captcha;
mod config;
mod driver;
mod schedule;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use env_logger::Env;

use crate::bot::{Bot, HttpCaptchaFetcher};
use crate::captcha::CaptchaModel;
use crate::driver::WebDriverClient;
use crate::schedule::{Scheduler, SystemClock};

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let config_path = config::config_file_path();
    let config = config::read_from_toml_file(&config_path)?;
    let pre_login_at = config.pre_login_at()?;
    let start_at = config.start_at()?;

    let model = CaptchaModel::load(Path::new(&config.model_path))
        .context("failed to initialize captcha model")?;
    let driver = WebDriverClient::connect(
        &config.webdriver_url,
        config.headless,
        &config.proxy_server,
    )
    .context("failed to create browser session")?;
    let fetcher = HttpCaptchaFetcher::new()?;

    let mut bot = Bot::new(Box::new(driver), model, Box::new(fetcher), config.clone());
    let mut scheduler = Scheduler::new(SystemClock, pre_login_at, start_at);

    log::info!("Start working...");
    let all_ok = scheduler.run(&mut bot)?;

    config::write_to_toml_file(&config_path, &config)?;

    if all_ok {
        log::info!("Run complete: all scheduled tasks succeeded");
    } else {
        log::warn!("Run complete: some scheduled tasks failed");
    }
    Ok(())
}
