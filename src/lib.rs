// sndstream library
// Streaming decode and double-buffered playback

pub mod cli;
pub mod config;
pub mod logging;
pub mod propfile;
pub mod sound;

pub use cli::Cli;
pub use config::Options;
pub use logging::LogLevel;
