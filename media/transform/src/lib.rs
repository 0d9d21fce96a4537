/*!
    Frame transformation for the rtspull media pipeline.

    This crate converts decoded frames to the formats the pipeline's
    consumers need:

    - **Audio**: resampling, channel layout conversion, sample format
      conversion to the sink's target PCM format
    - **Video**: scaling and pixel format conversion to RGBA at the
      renderer's target size

    # Lazy Initialization

    The video scaler initializes its FFmpeg context on the first frame and
    rebuilds it whenever the source description or the target size changes.
    The audio resampler is built against known source parameters up front;
    when the source already matches the target the decoder skips building
    one entirely (see [`SourceFormat::matches`]).

    # Stateless vs Stateful

    **Video scaling is stateless**: each frame converts independently.

    **Audio resampling is stateful**: the resampler keeps filter history,
    so frames must be processed in order and [`AudioResampler::flush`]
    called at end of stream to retrieve buffered samples.
*/

pub use media_types::{Error, Result, SampleFormat, TargetAudioFormat};

mod audio;
mod video;

pub use audio::{to_ffmpeg_sample, AudioResampler, SourceFormat};
pub use video::{pack_rgba, VideoScaler};
