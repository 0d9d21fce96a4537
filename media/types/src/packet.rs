/*!
    Compressed packet type.
*/

use crate::{Pts, Rational};

/**
    Type of media stream.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamType {
    /// Video stream
    Video,
    /// Audio stream
    Audio,
}

/**
    A compressed media packet.

    Produced by the packet source, owned by exactly one packet queue, and
    consumed-and-destroyed by the corresponding decoder. A packet with an
    empty payload is the end-of-stream sentinel: decoders interpret it as
    "flush and stop".
*/
#[derive(Clone, Debug)]
pub struct Packet {
    /// Compressed data. Empty for the end-of-stream sentinel.
    pub data: Vec<u8>,
    /// Presentation timestamp in stream time_base units.
    pub pts: Option<Pts>,
    /// Time base for interpreting the timestamp.
    pub time_base: Rational,
    /// Whether this packet can be decoded independently.
    pub is_keyframe: bool,
    /// Type of stream this packet belongs to.
    pub stream_type: StreamType,
}

impl Packet {
    /**
        Create a new packet.
    */
    pub fn new(
        data: Vec<u8>,
        pts: Option<Pts>,
        time_base: Rational,
        is_keyframe: bool,
        stream_type: StreamType,
    ) -> Self {
        Self {
            data,
            pts,
            time_base,
            is_keyframe,
            stream_type,
        }
    }

    /**
        Create the end-of-stream sentinel for the given stream.
    */
    pub fn end_of_stream(stream_type: StreamType) -> Self {
        Self {
            data: Vec::new(),
            pts: None,
            time_base: Rational::MILLIS,
            is_keyframe: false,
            stream_type,
        }
    }

    /**
        Returns true if this is the end-of-stream sentinel.
    */
    pub fn is_eos(&self) -> bool {
        self.data.is_empty()
    }

    /**
        Returns the presentation timestamp in milliseconds, if set.
    */
    pub fn pts_millis(&self) -> Option<i64> {
        self.pts.map(|pts| pts.to_millis(self.time_base))
    }

    /**
        Returns true if this packet contains video data.
    */
    pub fn is_video(&self) -> bool {
        self.stream_type == StreamType::Video
    }

    /**
        Returns true if this packet contains audio data.
    */
    pub fn is_audio(&self) -> bool {
        self.stream_type == StreamType::Audio
    }
}

// Ensure Packet is Send + Sync
static_assertions::assert_impl_all!(Packet: Send, Sync);
