// Configuration Management
// Player options loaded from a property file, overridden by the command line

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::logging::LogLevel;
use crate::propfile::{parse_propfile, read_propfile};
use crate::sound::StreamSettings;

/// Output device selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDriver {
    /// Real output through rodio
    Rodio,
    /// Headless software mixer
    None,
}

impl Default for AudioDriver {
    fn default() -> Self {
        if cfg!(feature = "rodio-backend") {
            AudioDriver::Rodio
        } else {
            AudioDriver::None
        }
    }
}

/// Player options
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub log_file: Option<String>,
    pub log_level: LogLevel,
    /// Volume as a percentage (0.0 - 1.0)
    pub volume: f32,
    /// Stereo pan, 0 = hard left, 63 = centre, 127 = hard right
    pub pan: u8,
    pub sample_rate: Option<u32>,
    pub vb_channels: u8,
    /// Start offset in milliseconds
    pub seek_ms: u32,
    pub driver: AudioDriver,
    pub desync_retries: u32,
}

impl Default for Options {
    fn default() -> Self {
        let settings = StreamSettings::default();
        Options {
            log_file: None,
            log_level: LogLevel::default(),
            volume: 1.0,
            pan: 63,
            sample_rate: settings.sample_rate_override,
            vb_channels: settings.vb_channels,
            seek_ms: 0,
            driver: AudioDriver::default(),
            desync_retries: settings.desync_retries,
        }
    }
}

impl Options {
    /// Settings handed to the stream decoder factory
    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            sample_rate_override: self.sample_rate,
            vb_channels: self.vb_channels,
            desync_retries: self.desync_retries,
        }
    }

    /// Volume scaled to the stream's 0..=127 range
    pub fn stream_volume(&self) -> u8 {
        (self.volume.clamp(0.0, 1.0) * crate::sound::MAX_VOLUME as f32).round() as u8
    }

    /// Apply one property; unknown keys are reported and ignored
    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key.to_lowercase().as_str() {
            "logfile" => {
                self.log_file = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            "loglevel" => self.log_level = parse_log_level(value)?,
            "volume" => self.volume = parse_volume(parse_int(key, value)?),
            "pan" => self.pan = parse_pan(parse_int(key, value)?)?,
            "samplerate" => self.sample_rate = Some(parse_sample_rate(parse_int(key, value)?)?),
            "vbchannels" => self.vb_channels = parse_channels(parse_int(key, value)?)?,
            "seek" => self.seek_ms = parse_seek(parse_int(key, value)?)?,
            "driver" => self.driver = parse_driver(value)?,
            "retries" => {
                self.desync_retries = value
                    .parse()
                    .with_context(|| format!("Invalid value for {}: {}", key, value))?
            }
            _ => log::warn!("unknown config key '{}'", key),
        }
        Ok(())
    }
}

/// Load options from a property file, or defaults when no file is given
pub fn load_config(path: Option<&Path>) -> Result<Options> {
    let mut opts = Options::default();
    let Some(path) = path else {
        return Ok(opts);
    };

    let text = read_propfile(path)?;
    for prop in parse_propfile(&text) {
        opts.apply(prop.key, prop.value).with_context(|| {
            format!("{}:{}: bad setting '{}'", path.display(), prop.line, prop.key)
        })?;
    }
    Ok(opts)
}

fn parse_int(key: &str, value: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .with_context(|| format!("Invalid value for {}: {}", key, value))
}

/// Parse a volume percentage, clamped to 0-100
pub fn parse_volume(vol: i64) -> f32 {
    vol.clamp(0, 100) as f32 / 100.0
}

pub fn parse_pan(pan: i64) -> Result<u8> {
    if !(0..=crate::sound::MAX_PAN as i64).contains(&pan) {
        bail!("Pan out of range (0-127): {}", pan);
    }
    Ok(pan as u8)
}

pub fn parse_sample_rate(rate: i64) -> Result<u32> {
    if !(1..=i64::from(crate::sound::MAX_SAMPLE_RATE)).contains(&rate) {
        bail!("Sample rate out of range: {}", rate);
    }
    Ok(rate as u32)
}

pub fn parse_channels(channels: i64) -> Result<u8> {
    match channels {
        1 | 2 => Ok(channels as u8),
        _ => bail!("Channel count must be 1 or 2, got {}", channels),
    }
}

pub fn parse_seek(ms: i64) -> Result<u32> {
    u32::try_from(ms).with_context(|| format!("Seek offset out of range: {}", ms))
}

pub fn parse_log_level(s: &str) -> Result<LogLevel> {
    LogLevel::parse(s)
}

pub fn parse_driver(s: &str) -> Result<AudioDriver> {
    match s.to_lowercase().as_str() {
        "rodio" | "openal" => Ok(AudioDriver::Rodio),
        "none" | "null" => Ok(AudioDriver::None),
        _ => bail!("Invalid driver: {}. Valid options: rodio, none", s),
    }
}
