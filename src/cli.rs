use crate::config::{
    parse_channels, parse_driver, parse_log_level, parse_pan, parse_sample_rate, parse_volume,
};
use crate::config::Options;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// Streaming audio player
#[derive(Parser, Debug, Default)]
#[command(name = "sndstream")]
#[command(version = "0.1.0")]
#[command(about = "Double-buffered streaming player for WAV, MP3, Opus and VB files", long_about = None)]
pub struct Cli {
    /// Audio file to play
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Property file with player settings
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log file path
    #[arg(short, long, value_name = "FILE")]
    pub logfile: Option<String>,

    /// Log level (nothing, user, error, warning, info, debug, all or 0-6)
    #[arg(long, value_name = "LEVEL")]
    pub loglevel: Option<String>,

    /// Volume (0-100)
    #[arg(short, long, value_name = "VOLUME")]
    pub volume: Option<String>,

    /// Stereo pan (0 left, 63 centre, 127 right)
    #[arg(short, long, value_name = "PAN")]
    pub pan: Option<String>,

    /// Sample rate override for raw VB files
    #[arg(long, value_name = "HZ")]
    pub samplerate: Option<String>,

    /// Channel count for raw VB files (1 or 2)
    #[arg(long, value_name = "N")]
    pub vbchannels: Option<String>,

    /// Start position in milliseconds
    #[arg(short, long, value_name = "MS")]
    pub seek: Option<u32>,

    /// Output driver (rodio, none)
    #[arg(short, long, value_name = "DRIVER")]
    pub driver: Option<String>,

    /// Resync attempts when the two sources drift apart
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,
}

impl Cli {
    /// Merge CLI arguments into the options struct
    pub fn merge_into_options(&self, mut opts: Options) -> Result<Options> {
        if let Some(ref log_file) = self.logfile {
            opts.log_file = Some(log_file.clone());
        }

        if let Some(ref level) = self.loglevel {
            opts.log_level = parse_log_level(level)?;
        }

        if let Some(ref vol) = self.volume {
            let int_vol: i64 = vol.parse().context("Invalid volume")?;
            opts.volume = parse_volume(int_vol);
        }

        if let Some(ref pan) = self.pan {
            let int_pan: i64 = pan.parse().context("Invalid pan")?;
            opts.pan = parse_pan(int_pan)?;
        }

        if let Some(ref rate) = self.samplerate {
            let int_rate: i64 = rate.parse().context("Invalid sample rate")?;
            opts.sample_rate = Some(parse_sample_rate(int_rate)?);
        }

        if let Some(ref channels) = self.vbchannels {
            let int_channels: i64 = channels.parse().context("Invalid channel count")?;
            opts.vb_channels = parse_channels(int_channels)?;
        }

        if let Some(seek) = self.seek {
            opts.seek_ms = seek;
        }

        if let Some(ref driver) = self.driver {
            opts.driver = parse_driver(driver)?;
        }

        if let Some(retries) = self.retries {
            opts.desync_retries = retries;
        }

        Ok(opts)
    }
}
