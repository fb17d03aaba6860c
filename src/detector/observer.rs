/// Receives committed motion transitions.
///
/// Called on the detector's own thread, once per transition, never for a
/// repeat of the current state. Implementations that need to reach another
/// thread or runtime do the hop themselves.
pub trait MotionObserver: Send + Sync {
    fn on_motion_changed(&self, detected: bool);
}

impl<F> MotionObserver for F
where
    F: Fn(bool) + Send + Sync,
{
    fn on_motion_changed(&self, detected: bool) {
        self(detected)
    }
}

/// Observer that drops every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl MotionObserver for NoopObserver {
    fn on_motion_changed(&self, _detected: bool) {}
}
