/*!
    Pipeline configuration.
*/

use std::time::Duration;

#[cfg(feature = "ffmpeg")]
use media_decode::{HwDevice, VideoDecoderConfig};

/**
    Configuration for the whole pipeline, set before `start`.
*/
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Connection timeout for the RTSP session.
    pub connect_timeout: Duration,
    /// Audio packet queue capacity.
    pub audio_queue_capacity: usize,
    /// Video packet queue capacity.
    pub video_queue_capacity: usize,
    /// Audio sink pending-chunk queue capacity.
    pub sink_queue_capacity: usize,
    /// Prefer hardware video decoding.
    pub hardware_decoding: bool,
    /// Hardware devices to try, in order of preference.
    #[cfg(feature = "ffmpeg")]
    pub hw_devices: Vec<HwDevice>,
    /// Video output size; `None` uses the renderer's surface size, or the
    /// source size when no renderer is attached.
    pub target_size: Option<(u32, u32)>,
    /// Initial playback volume, 0.0 to 1.0.
    pub volume: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            audio_queue_capacity: 100,
            video_queue_capacity: 100,
            sink_queue_capacity: 6144,
            hardware_decoding: true,
            #[cfg(feature = "ffmpeg")]
            hw_devices: VideoDecoderConfig::DEFAULT_HW_DEVICES.to_vec(),
            target_size: None,
            volume: 0.5,
        }
    }
}
