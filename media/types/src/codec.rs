/*!
    Seam traits between the pipeline and the codec-library crates.

    These traits give the stage loops a neutral home to be written
    against: the FFmpeg-backed crates implement them for production, and
    integration tests implement them with scripted doubles.
*/

use crate::{AudioFrame, Packet, Result, StreamInfo, TargetAudioFormat, VideoFrame};

/**
    Demuxed compressed packets from an open media session.

    Implementations: the RTSP source, scripted test doubles.
*/
pub trait Demuxer: Send {
    /**
        Stream metadata probed when the session was opened.
    */
    fn stream_info(&self) -> &StreamInfo;

    /**
        Read the next classified packet.

        Returns `Ok(None)` at end of stream. `Err` is a single failed read
        attempt; the read loop counts consecutive failures and gives up
        past its threshold, so implementations should not retry internally.
    */
    fn read_packet(&mut self) -> Result<Option<Packet>>;
}

/**
    Audio decoding plus resampling to a configured target format.

    Emitted frames always carry the target format and millisecond PTS.

    Decoders are constructed on their stage thread (see the factory types
    in the pipeline crate) and never cross threads afterwards.
*/
pub trait AudioDecode {
    /**
        Reconfigure the target output format, rebuilding the resampler
        against the current source parameters.

        Must not be called while the decoder is draining (call before
        start, or while paused).
    */
    fn set_target_format(&mut self, target: TargetAudioFormat) -> Result<()>;

    /**
        The currently configured target format.
    */
    fn target_format(&self) -> TargetAudioFormat;

    /**
        Decode one packet, returning zero or more ready frames.

        Transient conditions (would-block, EOF at the decoder) yield
        `Ok(vec![])`; `Err` is persistent and terminates the stage.
    */
    fn decode(&mut self, packet: &Packet) -> Result<Vec<AudioFrame>>;

    /**
        Flush the decoder at end of stream, returning buffered frames.
    */
    fn flush(&mut self) -> Result<Vec<AudioFrame>>;
}

/**
    Video decoding plus scaling to RGBA at a configured target size.

    Constructed on the video stage thread, like [`AudioDecode`].
*/
pub trait VideoDecode {
    /**
        Set the output size. The scaler is rebuilt on the next frame.
    */
    fn set_target_size(&mut self, width: u32, height: u32);

    /**
        Decode one packet, returning zero or more RGBA frames in PTS order.

        Transient conditions yield `Ok(vec![])`; `Err` is persistent and
        terminates the stage.
    */
    fn decode(&mut self, packet: &Packet) -> Result<Vec<VideoFrame>>;

    /**
        Flush the decoder at end of stream, returning buffered frames.
    */
    fn flush(&mut self) -> Result<Vec<VideoFrame>>;

    /**
        Whether frames are produced by a hardware decoder.
    */
    fn is_hardware(&self) -> bool {
        false
    }
}
