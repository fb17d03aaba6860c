use crate::config::AnalyzerConfig;

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, open};
use tracing::{debug, info, warn};

/// Most Gaussians tracked per pixel
const MAX_MODES: usize = 5;
/// Share of total weight that counts as background
const BACKGROUND_RATIO: f32 = 0.9;
/// Squared distance within which a sample updates an existing mode
const VAR_THRESHOLD_GEN: f32 = 9.0;
const VAR_INIT: f32 = 15.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 75.0;
/// Weight decay applied to modes that stop receiving support
const COMPLEXITY_REDUCTION: f32 = 0.05;
/// Radius 1 under L1 is the 3x3 cross, i.e. the 3x3 elliptical element
const KERNEL_RADIUS: u8 = 1;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

#[derive(Debug, Clone, Copy, Default)]
struct Gaussian {
    weight: f32,
    mean: f32,
    variance: f32,
}

/// Per-pixel adaptive mixture of Gaussians over intensity.
///
/// Every pixel keeps up to [`MAX_MODES`] modes sorted by weight. A sample
/// is background when it sits within `var_threshold` squared standard
/// deviations of one of the heaviest modes that together hold
/// [`BACKGROUND_RATIO`] of the weight. Shadows are not modelled, so a
/// darker copy of the background is plain foreground.
pub struct BackgroundModel {
    width: u32,
    height: u32,
    history: u32,
    var_threshold: f32,
    modes: Vec<Gaussian>,
    mode_counts: Vec<u8>,
    frames_seen: u64,
}

impl BackgroundModel {
    pub fn new(width: u32, height: u32, history: u32, var_threshold: f32) -> Self {
        let pixels = width as usize * height as usize;
        Self {
            width,
            height,
            history: history.max(1),
            var_threshold,
            modes: vec![Gaussian::default(); pixels * MAX_MODES],
            mode_counts: vec![0; pixels],
            frames_seen: 0,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Learning rate ramps down from 1/2 to 1/history as frames accumulate
    fn learning_rate(&self) -> f32 {
        let window = (2 * self.frames_seen).min(u64::from(self.history)).max(1);
        1.0 / window as f32
    }

    /// Fold `frame` into the model and return the raw foreground mask
    pub fn update(&mut self, frame: &GrayImage) -> GrayImage {
        self.frames_seen += 1;
        let alpha = self.learning_rate();
        let var_threshold = self.var_threshold;

        let mask: Vec<u8> = frame
            .as_raw()
            .iter()
            .zip(self.modes.chunks_exact_mut(MAX_MODES))
            .zip(self.mode_counts.iter_mut())
            .map(|((&value, modes), count)| {
                if update_pixel(modes, count, f32::from(value), alpha, var_threshold) {
                    FOREGROUND
                } else {
                    BACKGROUND
                }
            })
            .collect();

        GrayImage::from_raw(self.width, self.height, mask)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }
}

/// Update one pixel's modes with `value`; returns true for foreground
fn update_pixel(
    modes: &mut [Gaussian],
    count: &mut u8,
    value: f32,
    alpha: f32,
    var_threshold: f32,
) -> bool {
    let used = *count as usize;
    let decay = 1.0 - alpha;
    let prune = -alpha * COMPLEXITY_REDUCTION;

    let mut matched = false;
    let mut background = false;
    let mut cumulative = 0.0;

    for mode in modes[..used].iter_mut() {
        mode.weight = decay * mode.weight + prune;

        if !matched {
            let diff = value - mode.mean;
            let dist2 = diff * diff;

            if cumulative < BACKGROUND_RATIO && dist2 < var_threshold * mode.variance {
                background = true;
            }

            if dist2 < VAR_THRESHOLD_GEN * mode.variance {
                matched = true;
                mode.weight += alpha;
                let k = alpha / mode.weight;
                mode.mean += k * diff;
                mode.variance = (mode.variance + k * (dist2 - mode.variance)).clamp(VAR_MIN, VAR_MAX);
            }
        }

        cumulative += mode.weight;
    }

    // drop modes whose weight decayed away
    let mut kept = 0;
    for i in 0..used {
        if modes[i].weight > 0.0 {
            modes[kept] = modes[i];
            kept += 1;
        }
    }

    if !matched {
        let slot = if kept < MAX_MODES {
            kept += 1;
            kept - 1
        } else {
            MAX_MODES - 1
        };
        modes[slot] = Gaussian {
            weight: if kept == 1 { 1.0 } else { alpha },
            mean: value,
            variance: VAR_INIT,
        };
    }

    let total: f32 = modes[..kept].iter().map(|m| m.weight).sum();
    if total > 0.0 {
        for mode in modes[..kept].iter_mut() {
            mode.weight /= total;
        }
    }
    modes[..kept].sort_unstable_by(|a, b| b.weight.total_cmp(&a.weight));

    *count = kept as u8;
    !background
}

/// Background subtraction plus morphological cleanup
pub struct ForegroundModel {
    history: u32,
    var_threshold: f32,
    background: Option<BackgroundModel>,
}

impl ForegroundModel {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            history: config.history,
            var_threshold: config.var_threshold as f32,
            background: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.background.is_some()
    }

    pub fn frames_seen(&self) -> u64 {
        self.background.as_ref().map_or(0, BackgroundModel::frames_seen)
    }

    /// Produce the cleaned foreground mask for `frame`.
    ///
    /// The first frame (and the first after a size change) only seeds the
    /// model and yields an empty mask.
    pub fn apply(&mut self, frame: &GrayImage) -> GrayImage {
        let dims = frame.dimensions();

        if let Some(model) = self
            .background
            .as_mut()
            .filter(|model| model.dimensions() == dims)
        {
            let raw = model.update(frame);
            return clean_mask(&raw);
        }

        match &self.background {
            Some(model) => warn!(
                "Frame size changed from {:?} to {:?}, resetting background model",
                model.dimensions(),
                dims
            ),
            None => info!("Initializing background model with first frame"),
        }

        let mut model = BackgroundModel::new(dims.0, dims.1, self.history, self.var_threshold);
        model.update(frame);
        self.background = Some(model);
        GrayImage::from_pixel(dims.0, dims.1, Luma([BACKGROUND]))
    }

    /// Forget everything learned so far
    pub fn reset(&mut self) {
        debug!("Background model reset");
        self.background = None;
    }
}

/// Open to remove speckles, then dilate to reconnect what survived.
/// Speckle removal must run before the dilate pass.
pub fn clean_mask(mask: &GrayImage) -> GrayImage {
    let opened = open(mask, Norm::L1, KERNEL_RADIUS);
    dilate(&opened, Norm::L1, KERNEL_RADIUS)
}
