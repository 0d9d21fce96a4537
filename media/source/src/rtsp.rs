/*!
    RTSP session: open, probe, read.
*/

use std::marker::PhantomData;

use ffmpeg_next::{
    self as ffmpeg, codec,
    format::{self, context::Input},
    media, Dictionary,
};
use tracing::{info, warn};

use media_types::{
    AudioStreamInfo, Demuxer, Error, Packet, Pts, Rational, Result, StreamInfo, StreamType,
    VideoStreamInfo,
};

use crate::{CodecConfig, SourceConfig};

/**
    Holds the demuxer context across the move onto the read-loop thread.
*/
struct SendInput {
    inner: Input,
    _marker: PhantomData<*mut ()>,
}

// SAFETY: the format context is owned by this source and only ever used by
// one thread at a time; it is moved to the read loop, never shared.
unsafe impl Send for SendInput {}

/**
    An open RTSP session.

    Opening probes the stream layout once; the result is immutable for the
    session. Packets are read one at a time, classified against the first
    video and first audio stream, and anything else is discarded.
*/
pub struct RtspSource {
    input: SendInput,
    info: StreamInfo,
    video_index: Option<usize>,
    audio_index: Option<usize>,
    video_time_base: Rational,
    audio_time_base: Rational,
    video_codec_config: Option<CodecConfig>,
    audio_codec_config: Option<CodecConfig>,
}

impl RtspSource {
    /**
        Open an RTSP session and probe its streams.

        TCP transport is forced; see [`SourceConfig`] for the remaining
        session options. Fails if the input cannot be opened or if neither
        a video nor an audio stream is found.
    */
    pub fn open(url: &str, config: &SourceConfig) -> Result<Self> {
        ffmpeg::init().map_err(|e| Error::codec(e.to_string()))?;
        format::network::init();

        let mut options = Dictionary::new();
        options.set("rtsp_transport", "tcp");
        options.set("max_delay", &config.max_delay_us.to_string());
        options.set("stimeout", &config.socket_timeout_us().to_string());
        options.set("probesize", &config.probe_size_bytes.to_string());
        options.set("analyzeduration", &config.analyze_duration_us.to_string());

        let input = format::input_with_dictionary(&url, options)
            .map_err(|e| Error::network(format!("failed to open input: {e}")))?;

        let mut source = Self {
            input: SendInput {
                inner: input,
                _marker: PhantomData,
            },
            info: StreamInfo::default(),
            video_index: None,
            audio_index: None,
            video_time_base: Rational::MILLIS,
            audio_time_base: Rational::MILLIS,
            video_codec_config: None,
            audio_codec_config: None,
        };
        source.probe()?;
        Ok(source)
    }

    /**
        Locate the first video and first audio stream and capture their
        parameters. Either may be absent; both absent is a failure.
    */
    fn probe(&mut self) -> Result<()> {
        for stream in self.input.inner.streams() {
            let parameters = stream.parameters();
            match parameters.medium() {
                media::Type::Video if self.video_index.is_none() => {
                    let time_base = to_rational(stream.time_base());
                    let mut frame_rate = rate_to_f64(stream.avg_frame_rate());
                    if frame_rate <= 0.0 {
                        frame_rate = rate_to_f64(stream.rate());
                    }
                    if frame_rate <= 0.0 {
                        warn!("video stream reports no usable frame rate; pacing disabled");
                        frame_rate = 0.0;
                    }

                    let (width, height) = probe_video_dimensions(parameters.clone())
                        .unwrap_or_else(|| {
                            warn!("could not probe video dimensions");
                            (0, 0)
                        });

                    self.video_index = Some(stream.index());
                    self.video_time_base = time_base;
                    self.video_codec_config =
                        Some(CodecConfig::new(parameters.clone(), time_base));
                    self.info.video = Some(VideoStreamInfo {
                        width,
                        height,
                        frame_rate,
                        codec: codec_name(parameters.id()),
                        time_base,
                    });
                }
                media::Type::Audio if self.audio_index.is_none() => {
                    let time_base = to_rational(stream.time_base());
                    let (sample_rate, channels) = probe_audio_parameters(parameters.clone())
                        .unwrap_or_else(|| {
                            warn!("could not probe audio parameters");
                            (0, 0)
                        });

                    self.audio_index = Some(stream.index());
                    self.audio_time_base = time_base;
                    self.audio_codec_config =
                        Some(CodecConfig::new(parameters.clone(), time_base));
                    self.info.audio = Some(AudioStreamInfo {
                        sample_rate,
                        channels,
                        codec: codec_name(parameters.id()),
                        time_base,
                    });
                }
                _ => {}
            }
        }

        if !self.info.has_video() && !self.info.has_audio() {
            return Err(Error::network("no video or audio streams found"));
        }

        match (&self.info.video, &self.info.audio) {
            (Some(v), Some(a)) => info!(
                video_codec = %v.codec,
                width = v.width,
                height = v.height,
                frame_rate = v.frame_rate,
                audio_codec = %a.codec,
                sample_rate = a.sample_rate,
                channels = a.channels,
                "stream layout probed"
            ),
            (Some(v), None) => info!(
                video_codec = %v.codec,
                width = v.width,
                height = v.height,
                frame_rate = v.frame_rate,
                "stream layout probed (video only)"
            ),
            (None, Some(a)) => info!(
                audio_codec = %a.codec,
                sample_rate = a.sample_rate,
                channels = a.channels,
                "stream layout probed (audio only)"
            ),
            (None, None) => unreachable!(),
        }

        Ok(())
    }

    /**
        Take the video stream's codec configuration, if a video stream
        was found. The decoder is constructed from it on its own thread.
    */
    pub fn take_video_codec_config(&mut self) -> Option<CodecConfig> {
        self.video_codec_config.take()
    }

    /**
        Take the audio stream's codec configuration, if an audio stream
        was found.
    */
    pub fn take_audio_codec_config(&mut self) -> Option<CodecConfig> {
        self.audio_codec_config.take()
    }
}

impl Demuxer for RtspSource {
    fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input.inner) {
                Ok(()) => {
                    let index = packet.stream();
                    let (stream_type, time_base) = if self.video_index == Some(index) {
                        (StreamType::Video, self.video_time_base)
                    } else if self.audio_index == Some(index) {
                        (StreamType::Audio, self.audio_time_base)
                    } else {
                        // packets from unclassified streams are discarded
                        continue;
                    };

                    let data = packet.data().map(<[u8]>::to_vec).unwrap_or_default();
                    if data.is_empty() {
                        // an empty payload would read as the EOS sentinel downstream
                        continue;
                    }

                    return Ok(Some(Packet::new(
                        data,
                        packet.pts().map(Pts),
                        time_base,
                        packet.is_key(),
                        stream_type,
                    )));
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(e) => return Err(Error::network(format!("packet read failed: {e}"))),
            }
        }
    }
}

/**
    Convert an FFmpeg rational, guarding against a zero denominator.
*/
fn to_rational(r: ffmpeg::Rational) -> Rational {
    if r.denominator() == 0 {
        Rational::MILLIS
    } else {
        Rational::new(r.numerator(), r.denominator())
    }
}

/**
    Frame rate as f64; 0/0 and negative rationals collapse to 0.0.
*/
fn rate_to_f64(r: ffmpeg::Rational) -> f64 {
    if r.denominator() == 0 || r.numerator() <= 0 {
        0.0
    } else {
        f64::from(r.numerator()) / f64::from(r.denominator())
    }
}

fn codec_name(id: codec::Id) -> String {
    codec::decoder::find(id)
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| format!("{id:?}").to_lowercase())
}

/**
    Best-effort width/height probe through a short-lived decoder context.
*/
fn probe_video_dimensions(parameters: codec::Parameters) -> Option<(u32, u32)> {
    let ctx = codec::context::Context::from_parameters(parameters).ok()?;
    let decoder = ctx.decoder().video().ok()?;
    Some((decoder.width(), decoder.height()))
}

/**
    Best-effort sample rate/channel probe through a short-lived decoder
    context.
*/
fn probe_audio_parameters(parameters: codec::Parameters) -> Option<(u32, u16)> {
    let ctx = codec::context::Context::from_parameters(parameters).ok()?;
    let decoder = ctx.decoder().audio().ok()?;
    Some((decoder.rate(), decoder.channels()))
}
