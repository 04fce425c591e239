use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pixel_format::ChannelOrder;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub strip: StripConfig,
    pub timing: TimingConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub animation: AnimationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripConfig {
    pub led_count: usize,
    pub channels_per_pixel: usize,
    /// Order the LEDs expect the channels on the wire, e.g. "GRB"
    pub channel_order: String,
}

/// Protocol timing, all durations in nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimingConfig {
    /// Serial clock (SPI SCLK, or UART baud rate) in Hz
    pub clock_hz: u32,
    pub t0h_ns: u32,
    pub t0l_ns: u32,
    pub t1h_ns: u32,
    pub t1l_ns: u32,
    /// Minimum low time that latches a frame
    pub reset_ns: u32,
    /// Allowed deviation of every high and low phase
    pub tolerance_ns: u32,
    /// Largest oversampling ratio to try
    pub max_ratio: usize,
}

impl TimingConfig {
    /// Datasheet timings of the original WS2812
    pub fn ws2812(clock_hz: u32) -> Self {
        TimingConfig {
            clock_hz,
            t0h_ns: 350,
            t0l_ns: 800,
            t1h_ns: 700,
            t1l_ns: 600,
            reset_ns: 50_000,
            tolerance_ns: 150,
            max_ratio: 8,
        }
    }

    /// Datasheet timings of the WS2812B revision
    pub fn ws2812b(clock_hz: u32) -> Self {
        TimingConfig {
            clock_hz,
            t0h_ns: 400,
            t0l_ns: 850,
            t1h_ns: 800,
            t1l_ns: 450,
            reset_ns: 50_000,
            tolerance_ns: 150,
            max_ratio: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutputConfig {
    /// SPI device node, clocked at `timing.clock_hz` once opened
    Spidev { device: String },
    /// UART with the data line driving the strip
    Serial { device: String, baud_rate: u32 },
}

impl OutputConfig {
    pub fn device(&self) -> &str {
        match self {
            OutputConfig::Spidev { device } | OutputConfig::Serial { device, .. } => device,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnimationConfig {
    pub fps: u32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        AnimationConfig { fps: 30 }
    }
}

impl Config {
    /// Read and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(data)
            .map_err(|e| Error::invalid_config(format!("bad config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn channel_order(&self) -> Result<ChannelOrder> {
        self.strip.channel_order.parse()
    }

    fn validate(&self) -> Result<()> {
        if self.strip.channels_per_pixel == 0 {
            return Err(Error::invalid_config("channels_per_pixel must be at least 1"));
        }

        let order = self.channel_order()?;
        if order.len() != self.strip.channels_per_pixel {
            return Err(Error::invalid_config(format!(
                "channel order {} has {} channels, strip has {}",
                self.strip.channel_order,
                order.len(),
                self.strip.channels_per_pixel
            )));
        }

        if self.animation.fps == 0 {
            return Err(Error::invalid_config("animation fps must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "strip": { "led_count": 4, "channels_per_pixel": 3, "channel_order": "GRB" },
        "timing": { "clock_hz": 2400000, "t0h_ns": 400, "t0l_ns": 850,
                    "t1h_ns": 800, "t1l_ns": 450, "reset_ns": 50000,
                    "tolerance_ns": 150, "max_ratio": 8 },
        "output": { "kind": "spidev", "device": "/dev/spidev1.0" }
    }"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_json(SAMPLE).unwrap();
        assert_eq!(config.strip.led_count, 4);
        assert_eq!(config.timing, TimingConfig::ws2812b(2_400_000));
        assert_eq!(config.output.device(), "/dev/spidev1.0");
        assert_eq!(config.animation.fps, 30);
        assert_eq!(config.channel_order().unwrap().indices(), &[1, 0, 2]);
    }

    #[test]
    fn test_serial_output() {
        let data = SAMPLE.replace(
            r#""kind": "spidev", "device": "/dev/spidev1.0""#,
            r#""kind": "serial", "device": "/dev/ttyUSB0", "baud_rate": 2400000"#,
        );
        let config = Config::from_json(&data).unwrap();
        match config.output {
            OutputConfig::Serial { ref device, baud_rate } => {
                assert_eq!(device, "/dev/ttyUSB0");
                assert_eq!(baud_rate, 2_400_000);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_order_must_match_channels() {
        let data = SAMPLE.replace("\"GRB\"", "\"GRBW\"");
        assert!(matches!(Config::from_json(&data), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_timing_is_rejected() {
        let data = r#"{
            "strip": { "led_count": 4, "channels_per_pixel": 3, "channel_order": "GRB" },
            "output": { "kind": "spidev", "device": "/dev/spidev1.0" }
        }"#;
        assert!(matches!(Config::from_json(data), Err(Error::InvalidConfig(_))));
    }
}
