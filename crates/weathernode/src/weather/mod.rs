//! Synthetic weather-station readings.
//!
//! Each metric starts from a uniform draw over its range and then follows a
//! bounded random walk: every step moves the previous value by a small signed
//! amount proportional to the range width and clamps the result back into the
//! range.

use std::fmt;
use std::ops::RangeInclusive;

use rand::Rng;
use serde::Serialize;

use crate::error::Result;

/// Largest step multiplier drawn for one random-walk update.
const MAX_STEP: i32 = 5;

/// Fraction of the range width moved per unit of step.
const STEP_SCALE: f64 = 0.003;

/// Produce the value following `prev` in a bounded random walk.
///
/// A multiplier `k` is drawn uniformly from `-5..=5` and the value moves by
/// `width * k * 0.003`. The sum is truncated toward zero and clamped into
/// `range`, so the result is always inside the range, even when `prev` is not.
pub fn next_value<R: Rng + ?Sized>(rng: &mut R, prev: i32, range: &RangeInclusive<i32>) -> i32 {
    let (min, max) = (*range.start(), *range.end());
    let k = rng.random_range(-MAX_STEP..=MAX_STEP);
    let step = (f64::from(max) - f64::from(min)) * f64::from(k) * STEP_SCALE;

    // Float to int casts saturate, and truncation toward zero is intended.
    #[allow(clippy::cast_possible_truncation)]
    let value = (f64::from(prev) + step) as i32;

    if value > max {
        max
    } else if value < min {
        min
    } else {
        value
    }
}

/// Draw an initial value uniformly over `range`.
///
/// # Panics
///
/// Panics if the range is empty.
pub fn seed_value<R: Rng + ?Sized>(rng: &mut R, range: &RangeInclusive<i32>) -> i32 {
    rng.random_range(range.clone())
}

/// One of the five simulated weather metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Air temperature in °C.
    Temperature,
    /// Relative humidity in %.
    Humidity,
    /// Wind direction in degrees.
    WindDirection,
    /// Wind intensity in m/s.
    WindIntensity,
    /// Rain height in mm/h.
    RainHeight,
}

impl Metric {
    /// Every metric, in payload order.
    pub const ALL: [Metric; 5] = [
        Self::Temperature,
        Self::Humidity,
        Self::WindDirection,
        Self::WindIntensity,
        Self::RainHeight,
    ];

    /// The closed range of valid values.
    #[must_use]
    pub fn range(self) -> RangeInclusive<i32> {
        match self {
            Self::Temperature => -50..=50,
            Self::Humidity | Self::WindIntensity => 0..=100,
            Self::WindDirection => 0..=360,
            Self::RainHeight => 0..=50,
        }
    }

    /// Unit label used in log output.
    #[must_use]
    pub fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Humidity => "%",
            Self::WindDirection => "°",
            Self::WindIntensity => "m/s",
            Self::RainHeight => "mm/h",
        }
    }
}

/// A snapshot of all five metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherReading {
    /// Temperature in °C, −50..=50.
    pub temperature: i32,
    /// Humidity in %, 0..=100.
    pub humidity: i32,
    /// Wind direction in degrees, 0..=360.
    pub wind_direction: i32,
    /// Wind intensity in m/s, 0..=100.
    pub wind_intensity: i32,
    /// Rain height in mm/h, 0..=50.
    pub rain_height: i32,
}

/// Wire form of a reading. Every value travels as a JSON string.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UplinkPayload {
    device: String,
    temperature: String,
    humidity: String,
    wind_direction: String,
    wind_intensity: String,
    rain_height: String,
}

impl WeatherReading {
    /// Seed every metric with a uniform draw over its range.
    pub fn seed<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_fn(|metric| seed_value(rng, &metric.range()))
    }

    /// Advance every metric by one random-walk step.
    #[must_use]
    pub fn walk<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        Self::from_fn(|metric| next_value(rng, self.get(metric), &metric.range()))
    }

    /// Value of one metric.
    #[must_use]
    pub fn get(&self, metric: Metric) -> i32 {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::WindDirection => self.wind_direction,
            Metric::WindIntensity => self.wind_intensity,
            Metric::RainHeight => self.rain_height,
        }
    }

    fn from_fn(mut f: impl FnMut(Metric) -> i32) -> Self {
        Self {
            temperature: f(Metric::Temperature),
            humidity: f(Metric::Humidity),
            wind_direction: f(Metric::WindDirection),
            wind_intensity: f(Metric::WindIntensity),
            rain_height: f(Metric::RainHeight),
        }
    }

    /// Render the uplink JSON for this reading.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_payload(&self, device_id: u32) -> Result<String> {
        let payload = UplinkPayload {
            device: device_id.to_string(),
            temperature: self.temperature.to_string(),
            humidity: self.humidity.to_string(),
            wind_direction: self.wind_direction.to_string(),
            wind_intensity: self.wind_intensity.to_string(),
            rain_height: self.rain_height.to_string(),
        };
        Ok(serde_json::to_string(&payload)?)
    }
}

impl fmt::Display for WeatherReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, metric) in Metric::ALL.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}{}", self.get(*metric), metric.unit())?;
        }
        Ok(())
    }
}

/// A simulated weather station: a device id, its latest reading and the
/// random source driving the walk.
#[derive(Debug)]
pub struct WeatherStation<R> {
    device_id: u32,
    reading: WeatherReading,
    rng: R,
}

impl<R: Rng> WeatherStation<R> {
    /// Create a station and seed its first reading.
    pub fn new(device_id: u32, mut rng: R) -> Self {
        let reading = WeatherReading::seed(&mut rng);
        Self {
            device_id,
            reading,
            rng,
        }
    }

    /// Device id reported in the payload.
    #[must_use]
    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// The most recent reading.
    #[must_use]
    pub fn reading(&self) -> WeatherReading {
        self.reading
    }

    /// Step the walk once and return the new reading.
    pub fn advance(&mut self) -> WeatherReading {
        self.reading = self.reading.walk(&mut self.rng);
        self.reading
    }

    /// Uplink JSON for the current reading.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn payload(&self) -> Result<String> {
        self.reading.to_payload(self.device_id)
    }
}
