use anyhow::Context as _;
use rppal::{
    gpio::{Gpio, InputPin, OutputPin},
    hal::Delay,
};

use crate::{
    config::ScaleConfig,
    hx711::{Gain, Hx711},
    scale::{Scale, WeightSensor},
};

/// HX711 wired to the GPIO header.
#[derive(Debug)]
pub struct Sensor {
    scale: Scale<Hx711<OutputPin, InputPin, Delay>>,
    tare_on_start: bool,
}

impl Sensor {
    pub fn new(config: &ScaleConfig) -> Result<Sensor, anyhow::Error> {
        let gpio = Gpio::new().context("Failed to initialize GPIO")?;
        let clock_pin = gpio
            .get(config.clock_pin)
            .with_context(|| format!("Failed to open clock pin {}", config.clock_pin))?
            .into_output_low();
        let data_pin = gpio
            .get(config.data_pin)
            .with_context(|| format!("Failed to open data pin {}", config.data_pin))?
            .into_input();
        let gain = Gain::from_factor(config.gain)
            .with_context(|| format!("Unsupported HX711 gain {}", config.gain))?;

        let hx711 = Hx711::new(clock_pin, data_pin, Delay, gain);

        Ok(Sensor {
            scale: Scale::new(hx711, config.samples, config.scale_factor, config.offset),
            tare_on_start: config.tare_on_start,
        })
    }

    pub fn init(&mut self) -> Result<(), anyhow::Error> {
        self.scale.start(self.tare_on_start)
    }
}

impl WeightSensor for Sensor {
    fn is_ready(&mut self) -> Result<bool, anyhow::Error> {
        self.scale.is_ready()
    }

    fn read_weight(&mut self) -> Result<f32, anyhow::Error> {
        self.scale.read_weight()
    }
}
