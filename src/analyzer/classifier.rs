use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::point::Point;
use tracing::debug;

/// One outer foreground region of a mask
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Enclosed polygon area in pixels²
    pub area: f64,
    /// Number of boundary points
    pub perimeter_points: usize,
}

/// Outer regions found in a single mask
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContourSet {
    regions: Vec<Region>,
}

impl ContourSet {
    /// Extract outer contours only; holes and anything nested inside them
    /// are ignored.
    pub fn from_mask(mask: &GrayImage) -> Self {
        let contours: Vec<Contour<i32>> = find_contours(mask);
        let regions = contours
            .iter()
            .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
            .map(|c| Region {
                area: polygon_area(&c.points),
                perimeter_points: c.points.len(),
            })
            .collect();
        Self { regions }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn largest_area(&self) -> f64 {
        self.regions.iter().map(|r| r.area).fold(0.0, f64::max)
    }
}

/// Decides whether a mask contains a region big enough to count as motion
#[derive(Debug, Clone)]
pub struct MotionClassifier {
    min_area: f64,
}

impl MotionClassifier {
    pub fn new(min_area: u32) -> Self {
        Self {
            min_area: f64::from(min_area),
        }
    }

    pub fn min_area(&self) -> f64 {
        self.min_area
    }

    /// True iff some outer contour encloses at least `min_area`
    pub fn classify(&self, mask: &GrayImage) -> bool {
        let contours = ContourSet::from_mask(mask);
        let has_motion = contours.regions().iter().any(|r| r.area >= self.min_area);

        debug!(
            "Found {} contours; largest={:.1} has_motion={} (min_area={})",
            contours.len(),
            contours.largest_area(),
            has_motion,
            self.min_area
        );

        has_motion
    }
}

/// Shoelace area of a closed polygon
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();

    twice_area.abs() as f64 / 2.0
}
