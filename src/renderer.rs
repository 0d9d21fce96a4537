/*!
    The external renderer seam.
*/

use media_types::VideoFrame;

/**
    Render-facing playback state.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Loading,
    Playing,
    Ended,
    Error,
}

/**
    The external video output surface.

    The controller holds only a weak reference so the embedder can drop
    its renderer without a reference cycle keeping the pipeline alive;
    deregister (drop the `Arc`) on shutdown.

    Frame ownership transfers on `frame_ready`; the pipeline retains
    nothing after emission.
*/
pub trait VideoOutput: Send + Sync {
    /**
        Current surface size. Decoded frames are scaled to this; `None`
        keeps the source size.
    */
    fn surface_size(&self) -> Option<(u32, u32)> {
        None
    }

    /**
        A decoded RGBA frame, paced against the master clock.
    */
    fn frame_ready(&self, frame: VideoFrame);

    /**
        High-level playback state for the surface.
    */
    fn state_changed(&self, state: RenderState);
}
