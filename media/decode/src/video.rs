/*!
    Video decoder implementation.
*/

use ffmpeg_next::{
    codec::{self, decoder::Video as VideoDecoderFFmpeg},
    ffi,
    util::frame::video::Video as VideoFrameFFmpeg,
};
use tracing::{info, warn};

use media_source::CodecConfig;
use media_transform::{pack_rgba, VideoScaler};
use media_types::{Error, Packet, Pts, Rational, Result, VideoDecode, VideoFrame};

use crate::config::VideoDecoderConfig;
use crate::hw::{is_hw_frame, transfer_hw_frame, HwContext};

/**
    Video decoder.

    Decodes compressed video packets, downloads hardware frames to a
    staging frame when hardware acceleration is active, and scales the
    result to RGBA at the configured target size.
*/
pub struct VideoDecoder {
    decoder: VideoDecoderFFmpeg,
    time_base: Rational,
    scaler: VideoScaler,
    hw: Option<HwContext>,
}

impl VideoDecoder {
    /**
        Create a new video decoder from codec configuration.

        When hardware decoding is requested but no preferred device
        matches the codec, the decoder opens in software mode.
    */
    pub fn new(codec_config: CodecConfig, config: VideoDecoderConfig) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let time_base = codec_config.time_base();
        let parameters = codec_config.into_parameters();
        let codec_id = parameters.id();

        let mut ctx = codec::context::Context::from_parameters(parameters)
            .map_err(|e| Error::codec(e.to_string()))?;

        unsafe {
            (*ctx.as_mut_ptr()).flags2 |= ffi::AV_CODEC_FLAG2_FAST as i32;
        }

        let hw = if config.prefer_hw {
            let hw = codec::decoder::find(codec_id)
                .and_then(|codec| HwContext::try_create(&codec, &config.hw_devices));
            match &hw {
                Some(ctx_ref) => unsafe {
                    (*ctx.as_mut_ptr()).hw_device_ctx = ctx_ref.create_ref();
                },
                None => {
                    warn!("no suitable hardware decoder found, falling back to software");
                }
            }
            hw
        } else {
            None
        };

        let decoder = ctx
            .decoder()
            .video()
            .map_err(|e| Error::codec(e.to_string()))?;

        let (target_width, target_height) =
            if config.target_width > 0 && config.target_height > 0 {
                (config.target_width, config.target_height)
            } else {
                (decoder.width(), decoder.height())
            };

        info!(
            width = decoder.width(),
            height = decoder.height(),
            target_width,
            target_height,
            hardware = hw.is_some(),
            "video decoder initialized"
        );

        Ok(Self {
            decoder,
            time_base,
            scaler: VideoScaler::new(target_width, target_height),
            hw,
        })
    }

    /**
        Receive all ready frames, download hardware frames, and scale.
    */
    fn receive_frames(&mut self) -> Result<Vec<VideoFrame>> {
        let mut frames = Vec::new();
        let mut decoded = VideoFrameFFmpeg::empty();

        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => match self.convert_frame(&decoded) {
                    Ok(frame) => frames.push(frame),
                    Err(e) => warn!("video frame conversion error: {e}"),
                },
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

    fn convert_frame(&mut self, decoded: &VideoFrameFFmpeg) -> Result<VideoFrame> {
        let pts_ms = decoded
            .pts()
            .map(|pts| Pts(pts).to_millis(self.time_base))
            .unwrap_or(0);

        // Hardware frames live in GPU memory; download to a staging frame
        // before the scaler touches them.
        let staging;
        let source = match &self.hw {
            Some(hw) if is_hw_frame(decoded, hw.pixel_format()) => {
                staging = transfer_hw_frame(decoded)
                    .map_err(|e| Error::codec(format!("failed to transfer hardware frame: {e}")))?;
                &staging
            }
            _ => decoded,
        };

        let scaled = self.scaler.scale(source)?;
        let (width, height) = self.scaler.target_size();
        let data = pack_rgba(&scaled);

        Ok(VideoFrame::new(data, width, height, width as usize * 4, pts_ms))
    }
}

impl VideoDecode for VideoDecoder {
    fn set_target_size(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.scaler.set_target_size(width, height);
        }
    }

    fn decode(&mut self, packet: &Packet) -> Result<Vec<VideoFrame>> {
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
            if packet.is_keyframe {
                (*pkt_ptr).flags |= ffi::AV_PKT_FLAG_KEY as i32;
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
                warn!("error sending packet to video decoder: {e}");
                return Ok(Vec::new());
            }
        }

        self.receive_frames()
    }

    fn flush(&mut self) -> Result<Vec<VideoFrame>> {
        match self.decoder.send_eof() {
            Ok(()) | Err(ffmpeg_next::Error::Eof) => {}
            Err(e) => warn!("error flushing video decoder: {e}"),
        }

        self.receive_frames()
    }

    fn is_hardware(&self) -> bool {
        self.hw.is_some()
    }
}

impl std::fmt::Debug for VideoDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoDecoder")
            .field("time_base", &self.time_base)
            .field("target_size", &self.scaler.target_size())
            .field("hardware", &self.hw.is_some())
            .finish_non_exhaustive()
    }
}
