/*!
    rtspull — a live RTSP pull-and-play engine.

    Ingests an RTSP/RTP audio-video stream, demultiplexes and decodes the
    elementary streams in parallel, synchronizes video frames to an audio
    master clock, and emits PCM to a local sound device and RGBA frames to
    an external renderer.

    # Architecture

    Four stages on dedicated threads, wired by the [`Pipeline`] controller:

    1. **Packet source** — owns the network session, classifies packets,
       fans out to two bounded queues
    2. **Audio decode** — drains the audio queue, decodes and resamples to
       the sink's target format
    3. **Video decode** — drains the video queue, decodes (optionally with
       hardware acceleration), scales to RGBA, and paces emission against
       the master clock
    4. **Audio sink** — feeds the sound device and publishes a
       byte-accurate playback clock, the master clock for A/V sync

    # Example

    ```ignore
    use rtspull::{Pipeline, PipelineConfig, PipelineEvent};

    let pipeline = Pipeline::new(PipelineConfig::default());
    let events = pipeline.events();

    pipeline.start("rtsp://camera.local/stream")?;
    while let Ok(event) = events.recv() {
        match event {
            PipelineEvent::ErrorOccurred(e) => eprintln!("{e}"),
            PipelineEvent::StateChanged { state, .. } => println!("{state:?}"),
            _ => {}
        }
    }
    pipeline.stop();
    ```

    # Features

    - `ffmpeg` (default): FFmpeg-backed demuxer and decoders, enabling
      `Pipeline::start` over a real RTSP URL
    - `cpal-device` (default): a real sound device behind the
      [`device::AudioDevice`] trait

    Without either feature the pipeline still runs over injected
    implementations of the seam traits ([`Pipeline::start_with_parts`]),
    which is how the integration tests drive it.
*/

pub mod config;
pub mod device;
pub mod event;
pub mod queue;
pub mod renderer;
pub mod sink;
pub mod stage;

mod pipeline;

pub use config::PipelineConfig;
pub use event::{PipelineEvent, PipelineState};
pub use pipeline::{Pipeline, PipelineError, PipelineParts};
pub use renderer::{RenderState, VideoOutput};

pub use media_types as types;
