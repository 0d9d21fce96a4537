/*!
    Audio decoder implementation.
*/

use ffmpeg_next::{
    codec::{self, decoder::Audio as AudioDecoderFFmpeg},
    ffi,
    util::frame::audio::Audio as AudioFrameFFmpeg,
};
use tracing::{info, warn};

use media_source::CodecConfig;
use media_transform::{AudioResampler, SourceFormat};
use media_types::{
    AudioDecode, AudioFrame, Error, Packet, Pts, Rational, Result, SampleFormat,
    TargetAudioFormat,
};

use crate::config::AudioDecoderConfig;

/**
    Audio decoder.

    Decodes compressed audio packets and resamples them to the configured
    target PCM format. When the source already matches the target no
    resampler is instantiated and decoded frames forward directly.
*/
pub struct AudioDecoder {
    decoder: AudioDecoderFFmpeg,
    time_base: Rational,
    source: SourceFormat,
    target: TargetAudioFormat,
    resampler: Option<AudioResampler>,
    /// PTS fallback for frames without a timestamp.
    next_pts_ms: i64,
}

impl AudioDecoder {
    /**
        Create a new audio decoder from codec configuration.
    */
    pub fn new(codec_config: CodecConfig, config: AudioDecoderConfig) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let time_base = codec_config.time_base();
        let parameters = codec_config.into_parameters();

        let decoder_ctx = codec::context::Context::from_parameters(parameters)
            .map_err(|e| Error::codec(e.to_string()))?;

        let decoder = decoder_ctx
            .decoder()
            .audio()
            .map_err(|e| Error::codec(e.to_string()))?;

        let source = SourceFormat {
            rate: decoder.rate(),
            channels: decoder.channels(),
            format: decoder.format(),
        };

        let mut this = Self {
            decoder,
            time_base,
            source,
            target: config.target,
            resampler: None,
            next_pts_ms: 0,
        };
        this.rebuild_resampler()?;

        info!(
            sample_rate = source.rate,
            channels = source.channels,
            resampling = this.resampler.is_some(),
            "audio decoder initialized"
        );

        Ok(this)
    }

    /**
        The source stream's sample rate.
    */
    pub fn sample_rate(&self) -> u32 {
        self.source.rate
    }

    /**
        The source stream's channel count.
    */
    pub fn channels(&self) -> u16 {
        self.source.channels
    }

    fn rebuild_resampler(&mut self) -> Result<()> {
        if self.source.matches(&self.target) {
            info!("source format matches target; resampler disabled");
            self.resampler = None;
        } else {
            self.resampler = Some(AudioResampler::new(self.source, self.target)?);
        }
        Ok(())
    }

    /**
        Receive all ready frames from the decoder and convert them.
    */
    fn receive_frames(&mut self) -> Result<Vec<AudioFrame>> {
        let mut frames = Vec::new();
        let mut decoded = AudioFrameFFmpeg::empty();

        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let pts_ms = match decoded.pts() {
                        Some(pts) => Pts(pts).to_millis(self.time_base),
                        None => self.next_pts_ms,
                    };

                    let converted = if let Some(resampler) = &mut self.resampler {
                        match resampler.resample(&decoded) {
                            Ok(resampled) => convert_frame(&resampled, pts_ms),
                            Err(e) => {
                                warn!("failed to resample audio frame: {e}");
                                continue;
                            }
                        }
                    } else {
                        convert_frame(&decoded, pts_ms)
                    };

                    match converted {
                        Ok(frame) => {
                            self.next_pts_ms = pts_ms + frame.duration_ms();
                            frames.push(frame);
                        }
                        Err(e) => warn!("audio frame conversion error: {e}"),
                    }
                }
                Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::AVERROR(ffi::EAGAIN) => {
                    break;
                }
                Err(ffmpeg_next::Error::Eof) => {
                    break;
                }
                Err(e) => {
                    return Err(Error::codec(e.to_string()));
                }
            }
        }

        Ok(frames)
    }
}

impl AudioDecode for AudioDecoder {
    fn set_target_format(&mut self, target: TargetAudioFormat) -> Result<()> {
        self.target = target;
        self.rebuild_resampler()
    }

    fn target_format(&self) -> TargetAudioFormat {
        self.target
    }

    fn decode(&mut self, packet: &Packet) -> Result<Vec<AudioFrame>> {
        let mut ffmpeg_pkt = if packet.data.is_empty() {
            ffmpeg_next::Packet::empty()
        } else {
            ffmpeg_next::Packet::copy(&packet.data)
        };

        unsafe {
            let pkt_ptr = ffmpeg_pkt.as_mut_ptr();
            if let Some(pts) = packet.pts {
                (*pkt_ptr).pts = pts.0;
            }
        }

        match self.decoder.send_packet(&ffmpeg_pkt) {
            Ok(()) => {}
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::AVERROR(ffi::EAGAIN) => {
                return Ok(Vec::new());
            }
            Err(ffmpeg_next::Error::Eof) => {
                return Ok(Vec::new());
            }
            Err(e) => {
                // transient per the recovery policy; keep draining the queue
                warn!("error sending packet to audio decoder: {e}");
                return Ok(Vec::new());
            }
        }

        self.receive_frames()
    }

    fn flush(&mut self) -> Result<Vec<AudioFrame>> {
        match self.decoder.send_eof() {
            Ok(()) | Err(ffmpeg_next::Error::Eof) => {}
            Err(e) => warn!("error flushing audio decoder: {e}"),
        }

        let mut frames = self.receive_frames()?;

        // The resampler's filter history can hold a few more samples.
        if let Some(resampler) = &mut self.resampler {
            match resampler.flush() {
                Ok(Some(tail)) => match convert_frame(&tail, self.next_pts_ms) {
                    Ok(frame) => {
                        self.next_pts_ms += frame.duration_ms();
                        frames.push(frame);
                    }
                    Err(e) => warn!("audio frame conversion error: {e}"),
                },
                Ok(None) => {}
                Err(e) => warn!("failed to flush resampler: {e}"),
            }
        }

        Ok(frames)
    }
}

/**
    Convert an FFmpeg audio frame to the pipeline's AudioFrame type.
*/
fn convert_frame(frame: &AudioFrameFFmpeg, pts_ms: i64) -> Result<AudioFrame> {
    let samples = frame.samples();
    let sample_rate = frame.rate();
    let channels = frame.channels();

    if samples == 0 {
        return Err(Error::invalid_data("audio frame has zero samples"));
    }

    let format = sample_format_from_ffmpeg(frame.format()).ok_or_else(|| {
        Error::unsupported_format(format!("unsupported sample format: {:?}", frame.format()))
    })?;

    let data = copy_audio_data(frame, format, samples, channels)?;

    Ok(AudioFrame::new(
        data,
        samples,
        sample_rate,
        channels,
        format,
        pts_ms,
    ))
}

/**
    Copy audio data from an FFmpeg frame, interleaving planar layouts.
*/
fn copy_audio_data(
    frame: &AudioFrameFFmpeg,
    format: SampleFormat,
    samples: usize,
    channels: u16,
) -> Result<Vec<u8>> {
    let bytes_per_sample = format.bytes_per_sample();
    let total_bytes = samples * channels as usize * bytes_per_sample;

    if frame.is_planar() && channels > 1 {
        let mut output = vec![0u8; total_bytes];

        for ch in 0..channels as usize {
            let plane_data = frame.data(ch);
            for s in 0..samples {
                let src_offset = s * bytes_per_sample;
                let dst_offset = (s * channels as usize + ch) * bytes_per_sample;
                output[dst_offset..dst_offset + bytes_per_sample]
                    .copy_from_slice(&plane_data[src_offset..src_offset + bytes_per_sample]);
            }
        }

        Ok(output)
    } else {
        let plane_data = frame.data(0);
        if plane_data.len() < total_bytes {
            return Err(Error::invalid_data("audio frame shorter than declared"));
        }
        Ok(plane_data[..total_bytes].to_vec())
    }
}

/**
    Convert an FFmpeg sample format to the pipeline's SampleFormat.
*/
fn sample_format_from_ffmpeg(format: ffmpeg_next::format::Sample) -> Option<SampleFormat> {
    use ffmpeg_next::format::Sample;

    match format {
        Sample::U8(_) => Some(SampleFormat::U8),
        Sample::I16(_) => Some(SampleFormat::S16),
        Sample::I32(_) => Some(SampleFormat::S32),
        Sample::F32(_) => Some(SampleFormat::F32),
        Sample::F64(_) => Some(SampleFormat::F64),
        _ => None,
    }
}

impl std::fmt::Debug for AudioDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDecoder")
            .field("time_base", &self.time_base)
            .field("sample_rate", &self.source.rate)
            .field("channels", &self.source.channels)
            .field("resampling", &self.resampler.is_some())
            .finish_non_exhaustive()
    }
}
