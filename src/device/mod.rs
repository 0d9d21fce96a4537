/*!
    The byte-oriented audio output device seam.
*/

use media_types::Result;

#[cfg(feature = "cpal-device")]
mod cpal_device;
#[cfg(feature = "cpal-device")]
pub use cpal_device::CpalDevice;

/**
    PCM format a device runs at.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Bits per sample (16 for the S16LE pipeline contract).
    pub sample_bits: u16,
}

impl DeviceFormat {
    /**
        Bytes for one sample across all channels.
    */
    pub fn sample_group_bytes(&self) -> usize {
        (self.sample_bits as usize / 8) * self.channels as usize
    }

    /**
        Bytes consumed per millisecond of playback.
    */
    pub fn bytes_per_ms(&self) -> f64 {
        self.sample_rate as f64 * self.sample_group_bytes() as f64 / 1000.0
    }
}

/**
    A byte-oriented audio output device with query-able free space.

    Implementations: the cpal-backed device, scripted test doubles. The
    sink serializes all calls behind its buffer lock, so implementations
    need no internal synchronization beyond being `Send`.
*/
pub trait AudioDevice: Send {
    /**
        Initialize with the requested format.

        When the device refuses the request it adopts the nearest
        supported format instead; the returned format is authoritative
        for all subsequent byte arithmetic.
    */
    fn init(&mut self, requested: DeviceFormat) -> Result<DeviceFormat>;

    /**
        Size the device-side buffer in bytes.
    */
    fn set_buffer_size(&mut self, bytes: usize);

    /**
        The device-side buffer size in bytes.
    */
    fn buffer_size(&self) -> usize;

    /**
        Bytes of free space in the device buffer.
    */
    fn bytes_free(&self) -> usize;

    /**
        Write PCM bytes; returns how many were accepted.
    */
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /**
        Suspend playback, retaining the buffered audio.
    */
    fn suspend(&mut self);

    /**
        Start or resume playback.
    */
    fn resume(&mut self);

    /**
        Stop playback and discard buffered audio.
    */
    fn stop(&mut self);

    /**
        Playback volume, 0.0 to 1.0.
    */
    fn set_volume(&mut self, volume: f32);

    /**
        Most recent asynchronous device failure, if any. Polled by the
        sink's write scheduler.
    */
    fn take_error(&mut self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_format_arithmetic() {
        let format = DeviceFormat {
            sample_rate: 44_100,
            channels: 2,
            sample_bits: 16,
        };
        assert_eq!(format.sample_group_bytes(), 4);
        assert_eq!(format.bytes_per_ms(), 176.4);
    }
}
