/*!
    Stream information from source probing.
*/

use crate::Rational;

/**
    Probed video stream metadata.
*/
#[derive(Clone, Debug)]
pub struct VideoStreamInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /**
        Frames per second. The source prefers the average frame rate,
        falls back to the raw frame rate, and reports 0.0 when neither is
        usable; a zero rate disables video pacing downstream.
    */
    pub frame_rate: f64,
    /// Codec name as reported by the demuxer.
    pub codec: String,
    /// Stream time base.
    pub time_base: Rational,
}

/**
    Probed audio stream metadata.
*/
#[derive(Clone, Debug)]
pub struct AudioStreamInfo {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels.
    pub channels: u16,
    /// Codec name as reported by the demuxer.
    pub codec: String,
    /// Stream time base.
    pub time_base: Rational,
}

/**
    Combined stream information, produced once after a successful probe
    and immutable for the session.

    Either stream may be absent; a source with neither fails to open.
*/
#[derive(Clone, Debug, Default)]
pub struct StreamInfo {
    /// First video stream, if present.
    pub video: Option<VideoStreamInfo>,
    /// First audio stream, if present.
    pub audio: Option<AudioStreamInfo>,
}

impl StreamInfo {
    /**
        Returns true if a video stream was found.
    */
    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    /**
        Returns true if an audio stream was found.
    */
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

impl Default for VideoStreamInfo {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            frame_rate: 0.0,
            codec: String::new(),
            time_base: Rational::MILLIS,
        }
    }
}

impl Default for AudioStreamInfo {
    fn default() -> Self {
        Self {
            sample_rate: 0,
            channels: 0,
            codec: String::new(),
            time_base: Rational::MILLIS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_presence() {
        let info = StreamInfo::default();
        assert!(!info.has_video());
        assert!(!info.has_audio());

        let info = StreamInfo {
            video: Some(VideoStreamInfo {
                width: 1280,
                height: 720,
                frame_rate: 25.0,
                codec: "h264".into(),
                time_base: Rational::new(1, 90000),
            }),
            audio: None,
        };
        assert!(info.has_video());
        assert!(!info.has_audio());
    }
}
