use std::time::Duration;

use anyhow::Context;
use backon::BlockingRetryable;
use backon::ConstantBuilder;
use client::HttpTransport;
use config::Config;
use log::LevelFilter;
use network::SysfsLink;
use reporter::Reporter;
use sensor::Sensor;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

mod client;
mod config;
mod hx711;
mod network;
mod reading;
mod reporter;
mod scale;
mod sensor;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    TermLogger::init(
        LevelFilter::Info,
        ConfigBuilder::new()
            .set_time_format_rfc3339()
            .set_time_offset_to_local()
            .map_err(|_| anyhow::anyhow!("Failed to set time offset to local"))?
            .build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;

    if let Err(e) = run().await {
        log::error!("{e:#}");
    }

    Ok(())
}

pub async fn run() -> Result<(), anyhow::Error> {
    let config = Config::load(&Config::path())?;
    for warning in config.warnings() {
        log::warn!("{warning}");
    }

    let transport = HttpTransport::new(
        &config.server,
        &config.tls,
        config.request_timeout(),
        config.device_id.clone(),
    )?;
    log::info!("Reporting to {} (TLS: {})", transport.url(), config.tls);

    let link = SysfsLink::new(&config.wifi.interface);
    network::join(&link, &config.wifi).await?;

    let retry_builder = ConstantBuilder::default()
        .with_delay(Duration::from_millis(100))
        .with_max_times(20);

    let mut sensor = Sensor::new(&config.scale).context("Failed to initialize HX711")?;
    (|| sensor.init())
        .retry(retry_builder)
        .notify(|e, dur| {
            log::error!("{e:#}");
            log::info!("Retrying in {:?}", dur);
        })
        .call()?;

    let reporter = Reporter::new(sensor, link, transport, config.interval());

    tokio::spawn(reporter.run());
    log::info!("Reporting every {:?}", config.interval());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl+C signal")?;

    Ok(())
}
