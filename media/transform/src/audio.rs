/*!
    Audio resampling to the sink's target format.
*/

use ffmpeg_next::{
    format::{sample::Type as SampleType, Sample},
    frame::Audio as AudioFrameFFmpeg,
    software::resampling::context::Context as ResampleContext,
    ChannelLayout,
};
use tracing::debug;

use media_types::{Error, Result, SampleFormat, TargetAudioFormat};

/**
    Source-side PCM description, captured from an opened audio decoder.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceFormat {
    /// Sample rate in Hz.
    pub rate: u32,
    /// Number of channels.
    pub channels: u16,
    /// FFmpeg sample format.
    pub format: Sample,
}

impl SourceFormat {
    /**
        Returns true if this source already matches the target format, in
        which case no resampler is needed and decoded frames forward as-is.
    */
    pub fn matches(&self, target: &TargetAudioFormat) -> bool {
        self.rate == target.sample_rate
            && self.channels == target.channels
            && self.format == to_ffmpeg_sample(target.format)
    }
}

/**
    Map a pipeline sample format to the packed FFmpeg sample format.
*/
pub fn to_ffmpeg_sample(format: SampleFormat) -> Sample {
    match format {
        SampleFormat::U8 => Sample::U8(SampleType::Packed),
        SampleFormat::S16 => Sample::I16(SampleType::Packed),
        SampleFormat::S32 => Sample::I32(SampleType::Packed),
        SampleFormat::F32 => Sample::F32(SampleType::Packed),
        SampleFormat::F64 => Sample::F64(SampleType::Packed),
    }
}

/**
    Stateful resampler from a fixed source format to a fixed target format.

    Rebuilt (not mutated) when either side changes.
*/
pub struct AudioResampler {
    ctx: ResampleContext,
    source: SourceFormat,
    target: TargetAudioFormat,
}

impl AudioResampler {
    /**
        Allocate a resampler for the given conversion.
    */
    pub fn new(source: SourceFormat, target: TargetAudioFormat) -> Result<Self> {
        let ctx = ResampleContext::get(
            source.format,
            ChannelLayout::default(i32::from(source.channels)),
            source.rate,
            to_ffmpeg_sample(target.format),
            ChannelLayout::default(i32::from(target.channels)),
            target.sample_rate,
        )
        .map_err(|e| Error::codec(format!("failed to allocate resampler: {e}")))?;

        debug!(
            src_rate = source.rate,
            src_channels = source.channels,
            dst_rate = target.sample_rate,
            dst_channels = target.channels,
            "audio resampler initialized"
        );

        Ok(Self {
            ctx,
            source,
            target,
        })
    }

    /**
        The source format this resampler was built for.
    */
    pub fn source(&self) -> SourceFormat {
        self.source
    }

    /**
        The target format this resampler produces.
    */
    pub fn target(&self) -> TargetAudioFormat {
        self.target
    }

    /**
        Convert one decoded frame, returning the resampled frame.
    */
    pub fn resample(&mut self, frame: &AudioFrameFFmpeg) -> Result<AudioFrameFFmpeg> {
        let mut output = AudioFrameFFmpeg::empty();
        self.ctx
            .run(frame, &mut output)
            .map_err(|e| Error::codec(format!("failed to resample audio: {e}")))?;
        Ok(output)
    }

    /**
        Drain buffered samples at end of stream.

        Returns `None` when the filter history held nothing.
    */
    pub fn flush(&mut self) -> Result<Option<AudioFrameFFmpeg>> {
        let mut output = AudioFrameFFmpeg::empty();
        self.ctx
            .flush(&mut output)
            .map_err(|e| Error::codec(format!("failed to flush resampler: {e}")))?;

        if output.samples() == 0 {
            Ok(None)
        } else {
            Ok(Some(output))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_format_mapping() {
        assert_eq!(
            to_ffmpeg_sample(SampleFormat::S16),
            Sample::I16(SampleType::Packed)
        );
        assert_eq!(
            to_ffmpeg_sample(SampleFormat::F32),
            Sample::F32(SampleType::Packed)
        );
    }

    #[test]
    fn matching_source_skips_conversion() {
        let target = TargetAudioFormat::default();
        let source = SourceFormat {
            rate: 44_100,
            channels: 2,
            format: Sample::I16(SampleType::Packed),
        };
        assert!(source.matches(&target));
    }

    #[test]
    fn mismatched_source_needs_conversion() {
        let target = TargetAudioFormat::default();

        let wrong_rate = SourceFormat {
            rate: 48_000,
            channels: 2,
            format: Sample::I16(SampleType::Packed),
        };
        assert!(!wrong_rate.matches(&target));

        let planar = SourceFormat {
            rate: 44_100,
            channels: 2,
            format: Sample::F32(SampleType::Planar),
        };
        assert!(!planar.matches(&target));
    }
}
