mod background;
mod classifier;
mod sampler;

pub use background::{clean_mask, BackgroundModel, ForegroundModel, BACKGROUND, FOREGROUND};
pub use classifier::{polygon_area, ContourSet, MotionClassifier, Region};
pub use sampler::{frame_to_gray, FrameSampler, Sample, BLUR_SIGMA};
