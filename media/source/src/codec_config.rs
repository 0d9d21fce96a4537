/*!
    Codec parameters handed from the source to a decoder.
*/

use std::marker::PhantomData;

use ffmpeg_next::codec::Parameters;

use media_types::Rational;

/**
    Codec configuration for one elementary stream.

    Captured at probe time; a decoder is constructed from it on the
    decoding thread.
*/
pub struct CodecConfig {
    parameters: Parameters,
    time_base: Rational,
    // Suppress the auto Send impl so ours below is authoritative.
    _marker: PhantomData<*mut ()>,
}

impl CodecConfig {
    pub(crate) fn new(parameters: Parameters, time_base: Rational) -> Self {
        Self {
            parameters,
            time_base,
            _marker: PhantomData,
        }
    }

    /**
        Consume the config, returning the FFmpeg codec parameters.
    */
    pub fn into_parameters(self) -> Parameters {
        self.parameters
    }

    /**
        The stream time base for interpreting packet and frame timestamps.
    */
    pub fn time_base(&self) -> Rational {
        self.time_base
    }
}

// SAFETY: the wrapped AVCodecParameters is an owned copy with no thread
// affinity; the config is moved to the decoding thread and used there
// exclusively, never shared.
unsafe impl Send for CodecConfig {}

impl std::fmt::Debug for CodecConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecConfig")
            .field("time_base", &self.time_base)
            .finish_non_exhaustive()
    }
}
