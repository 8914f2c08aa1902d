//! Configuration for the ringlet networking layer.

/// Configuration for a ring node.
///
/// Controls channel sizing and outbound message limits.  The wire format
/// itself is fixed; these knobs only affect local behavior.
#[derive(Debug, Clone)]
pub struct RingNetConfig {
    /// Capacity of the fan-in channel carrying `(origin, frame)` pairs
    /// from reader tasks to the dispatcher.
    pub channel_buffer_size: usize,

    /// Maximum byte length of outbound chat content, enforced at the
    /// handle API.  Inbound frames are not bounded by this value; the
    /// wire format already caps content at `u32::MAX` bytes.
    pub max_content_len: usize,
}

impl Default for RingNetConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1_024,
            max_content_len: 1_048_576, // 1 MB
        }
    }
}

impl RingNetConfig {
    /// Create a config suitable for local testing with small buffers.
    pub fn dev_default() -> Self {
        Self {
            channel_buffer_size: 64,
            max_content_len: 65_536,
        }
    }
}
