/*!
    Decoded frame types.

    Frame timestamps are already converted to milliseconds; raw stream
    time bases never leave the decoders.
*/

use crate::{SampleFormat, TargetAudioFormat};

/**
    A decoded, resampled audio frame.

    Samples are interleaved: for stereo S16, `[L0, R0, L1, R1, ...]` as
    little-endian bytes. The format always equals the decoder's configured
    target format at the time of production.
*/
#[derive(Clone, Debug)]
pub struct AudioFrame {
    /// Raw interleaved sample data as bytes.
    pub data: Vec<u8>,
    /// Number of samples per channel.
    pub samples: usize,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels.
    pub channels: u16,
    /// Sample format.
    pub format: SampleFormat,
    /// Presentation timestamp in milliseconds.
    pub pts_ms: i64,
}

impl AudioFrame {
    /**
        Create a new audio frame.
    */
    pub fn new(
        data: Vec<u8>,
        samples: usize,
        sample_rate: u32,
        channels: u16,
        format: SampleFormat,
        pts_ms: i64,
    ) -> Self {
        Self {
            data,
            samples,
            sample_rate,
            channels,
            format,
            pts_ms,
        }
    }

    /**
        Returns the playback duration of this frame in milliseconds.
    */
    pub fn duration_ms(&self) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples as i64 * 1000) / self.sample_rate as i64
    }

    /**
        Returns the expected data length in bytes.
    */
    pub fn expected_data_len(&self) -> usize {
        self.samples * self.channels as usize * self.format.bytes_per_sample()
    }

    /**
        Returns true if this frame matches the given target format.
    */
    pub fn matches(&self, target: &TargetAudioFormat) -> bool {
        self.sample_rate == target.sample_rate
            && self.channels == target.channels
            && self.format == target.format
    }
}

/**
    A decoded RGBA video frame at target size.

    Ownership transfers to the renderer on emission; the pipeline retains
    nothing.
*/
#[derive(Clone, Debug)]
pub struct VideoFrame {
    /// Packed RGBA pixel data, `stride` bytes per row.
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per row (`width * 4` for the packed output this pipeline emits).
    pub stride: usize,
    /// Presentation timestamp in milliseconds.
    pub pts_ms: i64,
}

impl VideoFrame {
    /**
        Create a new video frame.
    */
    pub fn new(data: Vec<u8>, width: u32, height: u32, stride: usize, pts_ms: i64) -> Self {
        Self {
            data,
            width,
            height,
            stride,
            pts_ms,
        }
    }
}

// Ensure frames are Send + Sync
static_assertions::assert_impl_all!(AudioFrame: Send, Sync);
static_assertions::assert_impl_all!(VideoFrame: Send, Sync);
