/*!
    Shared types for the rtspull media pipeline.

    This crate defines the vocabulary of the pipeline — the types that cross
    crate boundaries. It has no dependency on FFmpeg, making it lightweight
    and enabling consumers (including test doubles) to depend on it without
    pulling in codec bindings.

    # Core Types

    - [`Rational`] - Rational numbers for time bases and frame rates
    - [`Pts`] - Stream-time-base timestamps with millisecond conversion
    - [`Packet`] - Compressed packet data, including the end-of-stream sentinel
    - [`AudioFrame`] and [`VideoFrame`] - Decoded frame data with ms PTS

    # Stream Information

    - [`StreamInfo`], [`VideoStreamInfo`], [`AudioStreamInfo`] - Probe results

    # Clock and Synchronization

    - [`MasterClock`] - The audio sink's byte-accurate playback clock

    # Seams

    - [`Demuxer`], [`AudioDecode`], [`VideoDecode`] - Traits the pipeline
      stages are written against; implemented by the FFmpeg-backed crates
      and by scripted doubles in tests

    # Error Handling

    - [`Error`] and [`Result`] - Common error types
*/

mod clock;
mod codec;
mod error;
mod format;
mod frame;
mod packet;
mod rational;
mod stream;
mod timestamp;

pub use clock::MasterClock;
pub use codec::{AudioDecode, Demuxer, VideoDecode};
pub use error::{Error, Result};
pub use format::{SampleFormat, TargetAudioFormat};
pub use frame::{AudioFrame, VideoFrame};
pub use packet::{Packet, StreamType};
pub use rational::Rational;
pub use stream::{AudioStreamInfo, StreamInfo, VideoStreamInfo};
pub use timestamp::Pts;
