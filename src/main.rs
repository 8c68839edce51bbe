use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use log::{info, warn};
use parking_lot::Mutex;

use sndstream::config::{self, AudioDriver, Options};
use sndstream::logging;
use sndstream::sound::{
    Mixer, PlaybackBackend, SharedBackend, SourceId, Stream, DEFAULT_STREAM_BUFFERS,
};
use sndstream::Cli;

/// Driver tick
const UPDATE_INTERVAL: Duration = Duration::from_millis(10);

/// Where playback time comes from
enum Clock {
    /// A real device plays the queued buffers
    Device,
    /// The headless mixer, advanced one tick at a time
    Headless(Arc<Mutex<Mixer>>),
}

fn open_backend(driver: AudioDriver) -> (SharedBackend, Clock) {
    #[cfg(feature = "rodio-backend")]
    {
        if driver == AudioDriver::Rodio {
            match sndstream::sound::RodioBackend::new() {
                Ok(backend) => return (Arc::new(Mutex::new(backend)), Clock::Device),
                Err(e) => warn!("rodio unavailable ({}), using headless mixer", e),
            }
        }
    }
    #[cfg(not(feature = "rodio-backend"))]
    {
        if driver == AudioDriver::Rodio {
            warn!("built without rodio support, using headless mixer");
        }
    }

    let mixer = Arc::new(Mutex::new(Mixer::new()));
    let backend: SharedBackend = mixer.clone();
    (backend, Clock::Headless(mixer))
}

fn play(path: &Path, options: &Options) -> Result<()> {
    let (backend, clock) = open_backend(options.driver);

    let (sources, buffers) = {
        let mut b = backend.lock();
        let sources = b.gen_sources(2)?;
        let buffers = b.gen_buffers(DEFAULT_STREAM_BUFFERS)?;
        let [s0, s1]: [SourceId; 2] = sources
            .try_into()
            .map_err(|_| anyhow::anyhow!("Backend returned the wrong number of sources"))?;
        ([s0, s1], buffers)
    };

    let mut stream = Stream::new(
        path,
        backend.clone(),
        Some(sources),
        buffers,
        options.stream_settings(),
    );
    if !stream.is_opened() {
        bail!("Cannot play {}", path.display());
    }

    info!(
        "Playing {} ({} ms, {} Hz)",
        path.display(),
        stream.get_length_ms(),
        stream.sample_rate()
    );

    stream.set_volume(options.stream_volume());
    stream.set_pan(options.pan);
    if options.seek_ms > 0 {
        stream.set_pos_ms(options.seek_ms);
    }
    stream.start();

    let tick_frames = (stream.sample_rate() as u64 * UPDATE_INTERVAL.as_millis() as u64 / 1000)
        .max(1) as usize;
    let mut last_report = 0;
    while stream.is_playing() {
        match &clock {
            Clock::Device => thread::sleep(UPDATE_INTERVAL),
            Clock::Headless(mixer) => mixer.lock().advance(tick_frames),
        }
        stream.update();

        let pos = stream.get_pos_ms();
        if pos / 1000 != last_report {
            last_report = pos / 1000;
            log::debug!("position {} ms", pos);
        }
    }

    info!("Finished at {} ms", stream.get_pos_ms());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let options = config::load_config(cli.config.as_deref())?;
    let options = cli.merge_into_options(options)?;

    logging::init(
        options.log_level,
        options.log_file.as_deref().map(Path::new),
    )?;
    info!("sndstream {}", env!("CARGO_PKG_VERSION"));

    play(&cli.file, &options)
}
