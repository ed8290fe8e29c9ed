use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
};

pub const DATA_BITS: u8 = 24;
pub const CLOCK_HALF_PERIOD_US: u32 = 1;
pub const POWER_DOWN_US: u32 = 100;
pub const READY_TIMEOUT_MS: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gain {
    ChannelA128,
    ChannelB32,
    ChannelA64,
}

impl Gain {
    pub fn from_factor(factor: u8) -> Option<Gain> {
        match factor {
            128 => Some(Gain::ChannelA128),
            64 => Some(Gain::ChannelA64),
            32 => Some(Gain::ChannelB32),
            _ => None,
        }
    }

    /// Clock pulses per conversion. The pulses after the 24 data bits select
    /// the channel and gain of the next conversion.
    pub fn pulses(&self) -> u8 {
        match self {
            Gain::ChannelA128 => 25,
            Gain::ChannelB32 => 26,
            Gain::ChannelA64 => 27,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error<ClkE, DataE> {
    #[error("HX711 clock pin error: {0:?}")]
    ClockPin(ClkE),
    #[error("HX711 data pin error: {0:?}")]
    DataPin(DataE),
    #[error("HX711 not ready after {} ms", READY_TIMEOUT_MS)]
    Timeout,
}

/// Raw access to a 24 bit load-cell ADC.
pub trait StrainGauge {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Conversion finished and data can be clocked out.
    fn is_ready(&mut self) -> Result<bool, Self::Error>;

    /// Waits for the next conversion and returns it sign extended.
    fn read_raw(&mut self) -> Result<i32, Self::Error>;

    fn power_down(&mut self) -> Result<(), Self::Error>;

    /// Leaves power down. The chip restarts at channel A, gain 128.
    fn power_up(&mut self) -> Result<(), Self::Error>;
}

#[derive(Debug)]
pub struct Hx711<CLK, DATA, D> {
    clock_pin: CLK,
    data_pin: DATA,
    delay: D,
    gain: Gain,
}

impl<CLK, DATA, D> Hx711<CLK, DATA, D>
where
    CLK: OutputPin,
    DATA: InputPin,
    D: DelayNs,
{
    pub fn new(clock_pin: CLK, data_pin: DATA, delay: D, gain: Gain) -> Self {
        Hx711 {
            clock_pin,
            data_pin,
            delay,
            gain,
        }
    }

    fn wait_ready(&mut self) -> Result<(), Error<CLK::Error, DATA::Error>> {
        for _ in 0..READY_TIMEOUT_MS {
            if self.data_pin.is_low().map_err(Error::DataPin)? {
                return Ok(());
            }
            self.delay.delay_ms(1);
        }
        Err(Error::Timeout)
    }

    fn pulse(&mut self) -> Result<bool, Error<CLK::Error, DATA::Error>> {
        self.clock_pin.set_high().map_err(Error::ClockPin)?;
        self.delay.delay_us(CLOCK_HALF_PERIOD_US);
        let bit = self.data_pin.is_high().map_err(Error::DataPin)?;
        self.clock_pin.set_low().map_err(Error::ClockPin)?;
        self.delay.delay_us(CLOCK_HALF_PERIOD_US);
        Ok(bit)
    }
}

impl<CLK, DATA, D> StrainGauge for Hx711<CLK, DATA, D>
where
    CLK: OutputPin,
    DATA: InputPin,
    D: DelayNs,
    CLK::Error: Send + Sync + 'static,
    DATA::Error: Send + Sync + 'static,
{
    type Error = Error<CLK::Error, DATA::Error>;

    fn is_ready(&mut self) -> Result<bool, Self::Error> {
        self.data_pin.is_low().map_err(Error::DataPin)
    }

    fn read_raw(&mut self) -> Result<i32, Self::Error> {
        self.wait_ready()?;

        let mut value: u32 = 0;
        for _ in 0..DATA_BITS {
            value = (value << 1) | u32::from(self.pulse()?);
        }
        for _ in DATA_BITS..self.gain.pulses() {
            self.pulse()?;
        }

        Ok(sign_extend(value))
    }

    fn power_down(&mut self) -> Result<(), Self::Error> {
        self.clock_pin.set_low().map_err(Error::ClockPin)?;
        self.clock_pin.set_high().map_err(Error::ClockPin)?;
        self.delay.delay_us(POWER_DOWN_US);
        Ok(())
    }

    fn power_up(&mut self) -> Result<(), Self::Error> {
        self.clock_pin.set_low().map_err(Error::ClockPin)
    }
}

/// Interprets the low 24 bits as two's complement.
pub fn sign_extend(value: u32) -> i32 {
    ((value << 8) as i32) >> 8
}
