/*!
    RTSP session and packet demuxing for the rtspull media pipeline.

    This crate owns the network side of the pipeline: it opens an RTSP
    session over TCP, probes the stream layout, and reads classified
    compressed packets until end of stream.

    # Example

    ```ignore
    use media_source::{RtspSource, SourceConfig};
    use media_types::Demuxer;

    let mut source = RtspSource::open("rtsp://camera.local/stream", &SourceConfig::default())?;
    println!("probed: {:?}", source.stream_info());

    while let Some(packet) = source.read_packet()? {
        // route packet by packet.stream_type
    }
    ```

    # Transport

    TCP interleaving is mandatory; UDP reordering and loss are not
    handled. Session options (socket timeout, probe size, analyze
    duration) are set through [`SourceConfig`].
*/

mod codec_config;
mod config;
mod rtsp;

pub use codec_config::CodecConfig;
pub use config::SourceConfig;
pub use rtsp::RtspSource;

pub use media_types::{Demuxer, Error, Packet, Result, StreamInfo, StreamType};
