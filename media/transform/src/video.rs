/*!
    Video scaling and RGBA conversion.
*/

use ffmpeg_next::{
    format::Pixel,
    frame::Video as VideoFrameFFmpeg,
    software::scaling::{context::Context as ScaleContext, flag::Flags},
};
use tracing::debug;

use media_types::{Error, Result};

/**
    Lazily constructed bilinear scaler to RGBA at a target size.

    The FFmpeg context is created on the first frame and rebuilt whenever
    the source description (format or size) or the target size changes.
*/
pub struct VideoScaler {
    ctx: Option<ScaleContext>,
    source: Option<(Pixel, u32, u32)>,
    target_width: u32,
    target_height: u32,
}

impl VideoScaler {
    /**
        Create a scaler targeting the given output size.
    */
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            ctx: None,
            source: None,
            target_width,
            target_height,
        }
    }

    /**
        The current target size.
    */
    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /**
        Change the target size. The context is rebuilt on the next frame.
    */
    pub fn set_target_size(&mut self, width: u32, height: u32) {
        if (width, height) != (self.target_width, self.target_height) {
            self.target_width = width;
            self.target_height = height;
            self.ctx = None;
        }
    }

    /**
        Convert one decoded frame to RGBA at target size.
    */
    pub fn scale(&mut self, frame: &VideoFrameFFmpeg) -> Result<VideoFrameFFmpeg> {
        let desc = (frame.format(), frame.width(), frame.height());

        if self.ctx.is_none() || self.source != Some(desc) {
            let ctx = ScaleContext::get(
                desc.0,
                desc.1,
                desc.2,
                Pixel::RGBA,
                self.target_width,
                self.target_height,
                Flags::BILINEAR,
            )
            .map_err(|e| Error::codec(format!("failed to create scaling context: {e}")))?;

            debug!(
                src_format = ?desc.0,
                src_width = desc.1,
                src_height = desc.2,
                dst_width = self.target_width,
                dst_height = self.target_height,
                "video scaler initialized"
            );

            self.ctx = Some(ctx);
            self.source = Some(desc);
        }

        let mut output = VideoFrameFFmpeg::empty();
        self.ctx
            .as_mut()
            .expect("scaler context present after init")
            .run(frame, &mut output)
            .map_err(|e| Error::codec(format!("failed to scale frame: {e}")))?;

        Ok(output)
    }
}

/**
    Copy a scaled RGBA frame into a tightly packed buffer with a stride of
    `width * 4`, dropping any row padding FFmpeg allocated.
*/
pub fn pack_rgba(frame: &VideoFrameFFmpeg) -> Vec<u8> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let src_stride = frame.stride(0);
    let dst_stride = width * 4;

    let data = frame.data(0);
    if src_stride == dst_stride {
        return data[..dst_stride * height].to_vec();
    }

    let mut packed = vec![0u8; dst_stride * height];
    for row in 0..height {
        let src = &data[row * src_stride..row * src_stride + dst_stride];
        packed[row * dst_stride..(row + 1) * dst_stride].copy_from_slice(src);
    }
    packed
}
