/*!
    Decoder configuration types.
*/

use media_types::TargetAudioFormat;

/**
    Hardware device type for hardware-accelerated decoding.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum HwDevice {
    /// Direct3D 11 Video Acceleration (Windows)
    D3d11va,
    /// DirectX Video Acceleration 2 (Windows)
    Dxva2,
    /// VideoToolbox (macOS)
    VideoToolbox,
    /// VAAPI (Linux - AMD, Intel)
    Vaapi,
    /// CUDA/NVDEC (NVIDIA)
    Cuda,
}

/**
    Configuration for the video decoder.
*/
#[derive(Clone, Debug)]
pub struct VideoDecoderConfig {
    /// Prefer hardware decoding if available.
    pub prefer_hw: bool,
    /// Hardware devices to try, in order of preference.
    pub hw_devices: Vec<HwDevice>,
    /// Output width; 0 keeps the source width.
    pub target_width: u32,
    /// Output height; 0 keeps the source height.
    pub target_height: u32,
}

impl VideoDecoderConfig {
    /// Default preference order for hardware devices.
    pub const DEFAULT_HW_DEVICES: [HwDevice; 2] = [HwDevice::D3d11va, HwDevice::Dxva2];

    /**
        Create a new config with default settings (software decoding,
        output at source size).
    */
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Create a config that prefers hardware acceleration with the
        default device list.
    */
    pub fn with_hw_accel() -> Self {
        Self {
            prefer_hw: true,
            ..Self::default()
        }
    }

    /**
        Set the output size.
    */
    pub fn with_target_size(mut self, width: u32, height: u32) -> Self {
        self.target_width = width;
        self.target_height = height;
        self
    }
}

impl Default for VideoDecoderConfig {
    fn default() -> Self {
        Self {
            prefer_hw: false,
            hw_devices: Self::DEFAULT_HW_DEVICES.to_vec(),
            target_width: 0,
            target_height: 0,
        }
    }
}

/**
    Configuration for the audio decoder.
*/
#[derive(Clone, Debug, Default)]
pub struct AudioDecoderConfig {
    /// PCM format to resample decoded audio into.
    pub target: TargetAudioFormat,
}

impl AudioDecoderConfig {
    /**
        Create a config producing the given target format.
    */
    pub fn with_target(target: TargetAudioFormat) -> Self {
        Self { target }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_software_at_source_size() {
        let config = VideoDecoderConfig::new();
        assert!(!config.prefer_hw);
        assert_eq!(config.target_width, 0);
        assert_eq!(config.target_height, 0);
    }

    #[test]
    fn hw_accel_uses_preferred_list() {
        let config = VideoDecoderConfig::with_hw_accel();
        assert!(config.prefer_hw);
        assert_eq!(config.hw_devices, vec![HwDevice::D3d11va, HwDevice::Dxva2]);
    }

    #[test]
    fn target_size_builder() {
        let config = VideoDecoderConfig::new().with_target_size(1280, 720);
        assert_eq!((config.target_width, config.target_height), (1280, 720));
    }
}
