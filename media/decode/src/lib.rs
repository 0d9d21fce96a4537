/*!
    Media decoding for the rtspull media pipeline.

    This crate transforms compressed packets into raw frames ready for the
    sink and the renderer: audio decodes and resamples to the configured
    PCM target format, video decodes (optionally hardware-accelerated) and
    scales to RGBA at the configured target size.

    # Example

    ```ignore
    use media_decode::{VideoDecoder, VideoDecoderConfig};
    use media_types::VideoDecode;

    let config = VideoDecoderConfig::with_hw_accel().with_target_size(1280, 720);
    let mut decoder = VideoDecoder::new(codec_config, config)?;

    for packet in packets {
        for frame in decoder.decode(&packet)? {
            // frame is RGBA at 1280x720 with millisecond PTS
        }
    }
    let remaining = decoder.flush()?;
    ```

    # Hardware Acceleration

    Hardware decoding is opt-in and negotiated against a preferred device
    list; when the codec offers no matching configuration the decoder
    silently falls back to software:

    ```ignore
    // Prefer hardware with the default device list
    let config = VideoDecoderConfig::with_hw_accel();

    // Software only
    let config = VideoDecoderConfig::new();
    ```

    Hardware frames are downloaded to a staging frame before scaling.
*/

pub use media_source::CodecConfig;
pub use media_types::{AudioDecode, AudioFrame, Error, Packet, Result, VideoDecode, VideoFrame};

mod audio;
mod config;
mod hw;
mod video;

pub use audio::AudioDecoder;
pub use config::{AudioDecoderConfig, HwDevice, VideoDecoderConfig};
pub use video::VideoDecoder;
