use anyhow::{Context, ensure};

use crate::hx711::StrainGauge;

/// Anything the reporter can take a weight from.
pub trait WeightSensor {
    fn is_ready(&mut self) -> Result<bool, anyhow::Error>;

    /// Weight in kilograms.
    fn read_weight(&mut self) -> Result<f32, anyhow::Error>;
}

/// Calibrated scale on top of a raw strain gauge.
///
/// `units = (average(raw) - offset) / scale_factor`
#[derive(Debug)]
pub struct Scale<G> {
    gauge: G,
    samples: usize,
    scale_factor: f32,
    offset: f32,
}

impl<G: StrainGauge> Scale<G> {
    pub fn new(gauge: G, samples: usize, scale_factor: f32, offset: f32) -> Self {
        Scale {
            gauge,
            samples,
            scale_factor,
            offset,
        }
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    /// Resets the gauge and discards the first conversion so the configured
    /// gain applies, then optionally tares.
    pub fn start(&mut self, tare: bool) -> Result<(), anyhow::Error> {
        self.gauge
            .power_down()
            .context("Failed to power down strain gauge")?;
        self.gauge
            .power_up()
            .context("Failed to power up strain gauge")?;
        self.gauge
            .read_raw()
            .context("Failed to read strain gauge after reset")?;

        if tare {
            self.tare(self.samples).context("Failed to tare scale")?;
            log::info!("Scale tared at offset {}", self.offset);
        }

        Ok(())
    }

    pub fn read_average(&mut self, times: usize) -> Result<f32, anyhow::Error> {
        ensure!(times > 0, "At least one sample is required");

        let mut sum: i64 = 0;
        for _ in 0..times {
            sum += i64::from(
                self.gauge
                    .read_raw()
                    .context("Failed to read strain gauge")?,
            );
        }

        Ok((sum as f64 / times as f64) as f32)
    }

    /// Takes the current load as zero.
    pub fn tare(&mut self, times: usize) -> Result<(), anyhow::Error> {
        self.offset = self.read_average(times)?;
        log::debug!("Tare offset = {}", self.offset);
        Ok(())
    }

    pub fn get_value(&mut self, times: usize) -> Result<f32, anyhow::Error> {
        Ok(self.read_average(times)? - self.offset)
    }

    pub fn get_units(&mut self, times: usize) -> Result<f32, anyhow::Error> {
        Ok(self.get_value(times)? / self.scale_factor)
    }
}

impl<G: StrainGauge> WeightSensor for Scale<G> {
    fn is_ready(&mut self) -> Result<bool, anyhow::Error> {
        self.gauge
            .is_ready()
            .context("Failed to poll strain gauge")
    }

    fn read_weight(&mut self) -> Result<f32, anyhow::Error> {
        self.get_units(self.samples)
    }
}
