/*!
    Hardware acceleration support.
*/

use std::ptr;

use ffmpeg_next::{ffi, util::frame::video::Video as VideoFrameFFmpeg, Codec};
use tracing::{info, warn};

use crate::config::HwDevice;

impl HwDevice {
    fn to_ffi(self) -> ffi::AVHWDeviceType {
        match self {
            Self::D3d11va => ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA,
            Self::Dxva2 => ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_DXVA2,
            Self::VideoToolbox => ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX,
            Self::Vaapi => ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI,
            Self::Cuda => ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::D3d11va => "d3d11va",
            Self::Dxva2 => "dxva2",
            Self::VideoToolbox => "videotoolbox",
            Self::Vaapi => "vaapi",
            Self::Cuda => "cuda",
        }
    }
}

/**
    Hardware device context wrapper.

    Remembers the hardware pixel format so decoded frames can be
    recognized and downloaded before scaling.
*/
pub(crate) struct HwContext {
    ctx: *mut ffi::AVBufferRef,
    pix_fmt: ffi::AVPixelFormat,
}

impl HwContext {
    /**
        Enumerate the codec's hardware configurations and create a device
        context for the first match in the preferred list.

        Returns None when no preferred device is supported; the caller
        falls back to software decoding.
    */
    pub fn try_create(codec: &Codec, preferred: &[HwDevice]) -> Option<Self> {
        for &device in preferred {
            let device_type = device.to_ffi();
            let Some(pix_fmt) = find_hw_config(codec, device_type) else {
                continue;
            };

            let mut hw_device_ctx: *mut ffi::AVBufferRef = ptr::null_mut();
            let ret = unsafe {
                ffi::av_hwdevice_ctx_create(
                    &mut hw_device_ctx,
                    device_type,
                    ptr::null(),
                    ptr::null_mut(),
                    0,
                )
            };

            if ret < 0 || hw_device_ctx.is_null() {
                warn!(
                    device = device.name(),
                    "failed to create hardware device context"
                );
                continue;
            }

            info!(device = device.name(), "hardware decoder initialized");
            return Some(Self {
                ctx: hw_device_ctx,
                pix_fmt,
            });
        }

        None
    }

    /**
        The pixel format hardware frames arrive in.
    */
    pub fn pixel_format(&self) -> ffi::AVPixelFormat {
        self.pix_fmt
    }

    /**
        Create a reference to the context for attachment to a decoder.
    */
    pub fn create_ref(&self) -> *mut ffi::AVBufferRef {
        unsafe { ffi::av_buffer_ref(self.ctx) }
    }
}

impl Drop for HwContext {
    fn drop(&mut self) {
        if !self.ctx.is_null() {
            unsafe {
                ffi::av_buffer_unref(&mut self.ctx);
            }
        }
    }
}

// SAFETY: The FFmpeg buffer reference is internally reference-counted
// and thread-safe for the operations we perform.
unsafe impl Send for HwContext {}

/**
    Scan the codec's hardware configurations for one that supports a
    device context of the given type; returns its pixel format.
*/
fn find_hw_config(codec: &Codec, device_type: ffi::AVHWDeviceType) -> Option<ffi::AVPixelFormat> {
    let mut index = 0;
    loop {
        let config = unsafe { ffi::avcodec_get_hw_config(codec.as_ptr(), index) };
        if config.is_null() {
            return None;
        }

        let config = unsafe { &*config };
        let supports_device_ctx = (config.methods as u32)
            & (ffi::AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX as u32)
            != 0;
        if supports_device_ctx && config.device_type == device_type {
            return Some(config.pix_fmt);
        }

        index += 1;
    }
}

/**
    Check if a frame came out of the hardware decoder and needs transfer.
*/
pub(crate) fn is_hw_frame(frame: &VideoFrameFFmpeg, hw_pix_fmt: ffi::AVPixelFormat) -> bool {
    let format = unsafe { (*frame.as_ptr()).format };
    format == hw_pix_fmt as i32
}

/**
    Transfer a hardware frame to a software staging frame.

    Returns an error if the transfer fails.
*/
pub(crate) fn transfer_hw_frame(
    hw_frame: &VideoFrameFFmpeg,
) -> Result<VideoFrameFFmpeg, ffmpeg_next::Error> {
    unsafe {
        let mut sw_frame = VideoFrameFFmpeg::empty();
        let ret = ffi::av_hwframe_transfer_data(sw_frame.as_mut_ptr(), hw_frame.as_ptr(), 0);

        if ret < 0 {
            return Err(ffmpeg_next::Error::from(ret));
        }

        // Carry PTS over from the hardware frame
        (*sw_frame.as_mut_ptr()).pts = (*hw_frame.as_ptr()).pts;

        Ok(sw_frame)
    }
}
