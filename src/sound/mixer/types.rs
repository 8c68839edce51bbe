// types.rs - Core types for the in-memory mixer

//! Buffer states and sample limits used by the mixer.

/// Maximum value for 16-bit signed integer
pub const SINT16_MAX: f32 = 32767.0;

/// Minimum value for 16-bit signed integer
pub const SINT16_MIN: f32 = -32768.0;

/// Buffer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferState {
    /// Generated, never filled
    #[default]
    Initial,
    /// Holds data, not attached to a source
    Filled,
    /// Attached to a source queue
    Queued,
}
