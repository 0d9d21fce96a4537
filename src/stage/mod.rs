/*!
    The pipeline's stage threads.

    Each stage observes a shared `running` flag, waits on its packet queue
    with a 100 ms timeout, and exits after draining the end-of-stream
    sentinel. Decoders are constructed on the stage thread itself.
*/

mod audio;
mod source;
mod video;

pub use audio::{spawn_audio_stage, AudioDecodeFactory, AudioStageHooks};
pub use source::spawn_source_stage;
pub use video::{spawn_video_stage, VideoDecodeFactory, VideoStageHooks};

use std::time::Duration;

/// Queue wait per loop iteration; bounds reaction time to `running`.
pub(crate) const QUEUE_WAIT: Duration = Duration::from_millis(100);

/// Poll interval while a stage is paused.
pub(crate) const PAUSE_POLL: Duration = Duration::from_millis(10);
