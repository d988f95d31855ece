// SPDX-License-Identifier: MIT
//
// Document boundary detection — finds the most likely document quadrilateral
// in a photographed page.
//
// Pipeline: grayscale → Gaussian blur → Canny edges → Hough line transform →
// classify lines as roughly horizontal/vertical → enumerate candidate
// quadrilaterals from pairs of lines → score by area plausibility and corner
// regularity. The best candidate's score becomes its confidence; candidates
// below the configured floor are withheld so callers can choose a fallback.

use image::GrayImage;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::hough::{LineDetectionOptions, PolarLine, detect_lines};
use snapfolio_core::EngineConfig;
use tracing::{debug, instrument, warn};

use crate::page::RasterPage;

/// A point in page pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A detected document quadrilateral.
///
/// Corners are always reported in role order — top-left, top-right,
/// bottom-left, bottom-right — regardless of how the document was rotated in
/// the photo. The polygon is guaranteed simple and convex; degenerate
/// candidates are discarded during scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedQuad {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_left: Point,
    pub bottom_right: Point,
    /// Detection confidence in [0, 1].
    pub confidence: f32,
}

impl DetectedQuad {
    /// Corners in drawing order: tl, tr, br, bl.
    pub fn corners(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    /// Polygon area via the shoelace formula.
    pub fn area(&self) -> f32 {
        shoelace_area(&self.corners())
    }

    /// Side lengths (top, bottom, left, right).
    pub fn side_lengths(&self) -> (f32, f32, f32, f32) {
        (
            self.top_left.distance(&self.top_right),
            self.bottom_left.distance(&self.bottom_right),
            self.top_left.distance(&self.bottom_left),
            self.top_right.distance(&self.bottom_right),
        )
    }

    /// Whether the quadrilateral is convex (all cross products share a sign).
    pub fn is_convex(&self) -> bool {
        is_convex(&self.corners())
    }
}

/// Finds the most likely document quadrilateral in a raster page.
pub struct BoundaryDetector {
    config: EngineConfig,
}

impl BoundaryDetector {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Detect the document boundary in `page`.
    ///
    /// Returns `None` when no candidate reaches the configured confidence
    /// floor — a deliberate refusal rather than a low-confidence guess. The
    /// caller, not the detector, decides whether to fall back to a margin
    /// crop. With overlapping documents only the strongest candidate is
    /// returned; low-contrast backgrounds degrade the confidence smoothly.
    #[instrument(skip_all, fields(width = page.width(), height = page.height()))]
    pub fn detect(&self, page: &RasterPage) -> Option<DetectedQuad> {
        let (width, height) = (page.width(), page.height());
        if width < 8 || height < 8 {
            return None;
        }

        let gray = page.image().to_luma8();
        let blurred = gaussian_blur_f32(&gray, self.config.blur_sigma);
        let edges = canny(&blurred, 50.0, 150.0);

        let lines = self.hough_lines(&edges, width, height);
        debug!(line_count = lines.len(), "Hough lines detected");
        if lines.len() < 4 {
            return None;
        }

        let (horizontal, vertical) = classify_lines(&lines);
        debug!(
            horizontal = horizontal.len(),
            vertical = vertical.len(),
            "Lines classified"
        );
        if horizontal.len() < 2 || vertical.len() < 2 {
            return None;
        }

        let horizontal = thin_lines(horizontal, self.config.max_candidate_lines);
        let vertical = thin_lines(vertical, self.config.max_candidate_lines);

        let best = self.best_candidate(&horizontal, &vertical, width, height)?;
        if best.confidence < self.config.detection_floor {
            debug!(
                confidence = best.confidence,
                floor = self.config.detection_floor,
                "Best candidate below confidence floor"
            );
            return None;
        }

        debug!(confidence = best.confidence, "Document boundary detected");
        Some(best)
    }

    /// Run the Hough transform with a vote threshold proportional to the
    /// image diagonal, so detection scales with resolution.
    fn hough_lines(&self, edges: &GrayImage, width: u32, height: u32) -> Vec<PolarLine> {
        let diagonal = ((width as f64).powi(2) + (height as f64).powi(2)).sqrt();
        let vote_threshold = (diagonal * 0.25).max(80.0) as u32;
        let options = LineDetectionOptions {
            vote_threshold,
            suppression_radius: 8,
        };
        detect_lines(edges, options)
    }

    /// Enumerate all quadrilaterals formed by one pair of horizontal and one
    /// pair of vertical lines, score them, and keep the strongest.
    fn best_candidate(
        &self,
        horizontal: &[PolarLine],
        vertical: &[PolarLine],
        width: u32,
        height: u32,
    ) -> Option<DetectedQuad> {
        let image_area = width as f32 * height as f32;
        let mut best: Option<DetectedQuad> = None;

        for (hi, top) in horizontal.iter().enumerate() {
            for bottom in horizontal.iter().skip(hi + 1) {
                for (vi, left) in vertical.iter().enumerate() {
                    for right in vertical.iter().skip(vi + 1) {
                        let Some(corners) = quad_corners(top, bottom, left, right) else {
                            continue;
                        };
                        let Some(candidate) =
                            score_candidate(&corners, image_area, width, height)
                        else {
                            continue;
                        };
                        if best
                            .as_ref()
                            .is_none_or(|b| candidate.confidence > b.confidence)
                        {
                            best = Some(candidate);
                        }
                    }
                }
            }
        }

        best
    }
}

// -- Line helpers --------------------------------------------------------------

/// Classify Hough lines as roughly horizontal or roughly vertical.
///
/// `angle_in_degrees` is 0..180: [0, 30] or [150, 180] is horizontal, [60,
/// 120] is vertical; the ambiguous zones in between are discarded.
fn classify_lines(lines: &[PolarLine]) -> (Vec<PolarLine>, Vec<PolarLine>) {
    let mut horizontal = Vec::new();
    let mut vertical = Vec::new();

    for line in lines {
        let angle = line.angle_in_degrees;
        if angle <= 30 || angle >= 150 {
            horizontal.push(*line);
        } else if (60..=120).contains(&angle) {
            vertical.push(*line);
        }
    }

    (horizontal, vertical)
}

/// Reduce a bucket of lines to at most `max` entries, keeping the extremes
/// and an evenly spaced selection in between (sorted by signed distance).
fn thin_lines(mut lines: Vec<PolarLine>, max: usize) -> Vec<PolarLine> {
    lines.sort_by(|a, b| a.r.partial_cmp(&b.r).unwrap_or(std::cmp::Ordering::Equal));
    if lines.len() <= max || max < 2 {
        return lines;
    }

    let mut kept = Vec::with_capacity(max);
    for i in 0..max {
        let idx = i * (lines.len() - 1) / (max - 1);
        kept.push(lines[idx]);
    }
    kept
}

/// Intersect the four boundary lines into corner points, in tl/tr/br/bl
/// order. `None` if any pair is (nearly) parallel.
fn quad_corners(
    top: &PolarLine,
    bottom: &PolarLine,
    left: &PolarLine,
    right: &PolarLine,
) -> Option<[Point; 4]> {
    let top_left = intersect_polar_lines(top, left)?;
    let top_right = intersect_polar_lines(top, right)?;
    let bottom_right = intersect_polar_lines(bottom, right)?;
    let bottom_left = intersect_polar_lines(bottom, left)?;
    Some([top_left, top_right, bottom_right, bottom_left])
}

/// Intersection of two lines in polar (Hough) form.
///
/// A `PolarLine` `(r, theta)` represents `x·cos θ + y·sin θ = r`. Returns
/// `None` for (nearly) parallel lines.
fn intersect_polar_lines(a: &PolarLine, b: &PolarLine) -> Option<Point> {
    let theta_a = (a.angle_in_degrees as f64).to_radians();
    let theta_b = (b.angle_in_degrees as f64).to_radians();

    let (sin_a, cos_a) = theta_a.sin_cos();
    let (sin_b, cos_b) = theta_b.sin_cos();

    let denom = cos_a * sin_b - sin_a * cos_b;
    if denom.abs() < 1e-6 {
        return None;
    }

    let r_a = a.r as f64;
    let r_b = b.r as f64;

    let x = (r_a * sin_b - r_b * sin_a) / denom;
    let y = (r_b * cos_a - r_a * cos_b) / denom;

    Some(Point::new(x as f32, y as f32))
}

// -- Candidate scoring ---------------------------------------------------------

/// Score a corner set and build a `DetectedQuad`, or reject it outright.
///
/// Rejection covers: corners far outside the frame, non-convex polygons, and
/// implausible areas. Otherwise confidence is the product of an area
/// plausibility score and a corner-angle regularity score, both in [0, 1].
fn score_candidate(
    corners: &[Point; 4],
    image_area: f32,
    width: u32,
    height: u32,
) -> Option<DetectedQuad> {
    // Corners may sit slightly outside the frame (document edge cut off by
    // the photo), but not by more than 10% of the dimension.
    let slack_x = width as f32 * 0.10;
    let slack_y = height as f32 * 0.10;
    for corner in corners {
        if corner.x < -slack_x
            || corner.y < -slack_y
            || corner.x > width as f32 + slack_x
            || corner.y > height as f32 + slack_y
        {
            return None;
        }
    }

    if !is_convex(corners) {
        return None;
    }

    let area = shoelace_area(corners);
    let area_score = area_plausibility(area / image_area);
    if area_score <= 0.0 {
        return None;
    }

    let angle_score = angle_regularity(corners);
    if angle_score <= 0.0 {
        return None;
    }

    let confidence = (area_score * angle_score).clamp(0.0, 1.0);
    let [a, b, c, d] = normalize_roles(corners);

    Some(DetectedQuad {
        top_left: a,
        top_right: b,
        bottom_left: c,
        bottom_right: d,
        confidence,
    })
}

/// Plausibility of the candidate's area relative to the full frame.
///
/// Tiny candidates are spurious micro-rectangles; a candidate covering the
/// whole frame with no margin is almost certainly the photo border rather
/// than a document. Both taper smoothly instead of hard-failing, so
/// low-contrast captures degrade gracefully.
fn area_plausibility(ratio: f32) -> f32 {
    const MIN: f32 = 0.05;
    const FULL_LOW: f32 = 0.20;
    const FULL_HIGH: f32 = 0.95;
    const MAX: f32 = 0.995;

    if ratio <= MIN || ratio >= MAX {
        0.0
    } else if ratio < FULL_LOW {
        (ratio - MIN) / (FULL_LOW - MIN)
    } else if ratio <= FULL_HIGH {
        1.0
    } else {
        (MAX - ratio) / (MAX - FULL_HIGH)
    }
}

/// Regularity of the four interior angles: 1.0 for a perfect rectangle,
/// falling to 0.0 as the mean deviation from 90° reaches 45°.
fn angle_regularity(corners: &[Point; 4]) -> f32 {
    let mut total_deviation = 0.0f32;

    for i in 0..4 {
        let prev = corners[(i + 3) % 4];
        let here = corners[i];
        let next = corners[(i + 1) % 4];

        let v1 = (prev.x - here.x, prev.y - here.y);
        let v2 = (next.x - here.x, next.y - here.y);

        let len1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
        let len2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
        if len1 < 1e-3 || len2 < 1e-3 {
            return 0.0;
        }

        let cos = ((v1.0 * v2.0 + v1.1 * v2.1) / (len1 * len2)).clamp(-1.0, 1.0);
        let angle_deg = cos.acos().to_degrees();
        total_deviation += (angle_deg - 90.0).abs();
    }

    (1.0 - total_deviation / 4.0 / 45.0).clamp(0.0, 1.0)
}

/// Whether four ordered corners form a convex polygon (all consecutive cross
/// products share a sign). Also rules out self-intersection for our
/// line-derived candidates.
fn is_convex(corners: &[Point; 4]) -> bool {
    let mut sign = 0i8;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        let c = corners[(i + 2) % 4];
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross.abs() < 1e-6 {
            return false;
        }
        let s = if cross > 0.0 { 1 } else { -1 };
        if sign == 0 {
            sign = s;
        } else if s != sign {
            return false;
        }
    }
    true
}

/// Assign corner roles by position so the quad reports the same role order
/// regardless of document rotation: top-left minimises x+y, bottom-right
/// maximises it, top-right maximises x−y, bottom-left minimises it.
///
/// Returns `[top_left, top_right, bottom_left, bottom_right]`.
fn normalize_roles(corners: &[Point; 4]) -> [Point; 4] {
    let mut tl = corners[0];
    let mut tr = corners[0];
    let mut bl = corners[0];
    let mut br = corners[0];

    for p in corners {
        if p.x + p.y < tl.x + tl.y {
            tl = *p;
        }
        if p.x + p.y > br.x + br.y {
            br = *p;
        }
        if p.x - p.y > tr.x - tr.y {
            tr = *p;
        }
        if p.x - p.y < bl.x - bl.y {
            bl = *p;
        }
    }

    [tl, tr, bl, br]
}

/// Polygon area from ordered vertices (shoelace formula).
fn shoelace_area(corners: &[Point; 4]) -> f32 {
    let mut area = 0.0f32;
    for i in 0..4 {
        let j = (i + 1) % 4;
        area += corners[i].x * corners[j].y;
        area -= corners[j].x * corners[i].y;
    }
    area.abs() / 2.0
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};

    fn page_from_gray(img: GrayImage) -> RasterPage {
        RasterPage::new(DynamicImage::ImageLuma8(img), 0.24)
    }

    fn rect_corners() -> [Point; 4] {
        [
            Point::new(50.0, 60.0),
            Point::new(350.0, 60.0),
            Point::new(350.0, 440.0),
            Point::new(50.0, 440.0),
        ]
    }

    /// A uniform image has no edges; the detector must decline, not guess.
    #[test]
    fn blank_image_yields_none() {
        let detector = BoundaryDetector::new(EngineConfig::default());
        let page = page_from_gray(GrayImage::from_pixel(200, 300, Luma([200u8])));
        assert!(detector.detect(&page).is_none());
    }

    /// A clear bright rectangle on a dark background should be found, with
    /// corners near the drawn rectangle and a confidence above the floor.
    #[test]
    fn detects_synthetic_rectangle() {
        let (w, h) = (400u32, 500u32);
        let mut img = GrayImage::from_pixel(w, h, Luma([20u8]));
        for y in 60..440 {
            for x in 50..350 {
                img.put_pixel(x, y, Luma([240u8]));
            }
        }

        let config = EngineConfig::default();
        let floor = config.detection_floor;
        let detector = BoundaryDetector::new(config);
        let quad = detector
            .detect(&page_from_gray(img))
            .expect("rectangle should be detected");

        assert!(quad.confidence >= floor && quad.confidence <= 1.0);
        assert!(quad.is_convex());
        // Corners should land within a small tolerance of the drawn edges.
        assert!((quad.top_left.x - 50.0).abs() < 15.0, "{:?}", quad.top_left);
        assert!((quad.top_left.y - 60.0).abs() < 15.0, "{:?}", quad.top_left);
        assert!((quad.bottom_right.x - 350.0).abs() < 15.0, "{:?}", quad.bottom_right);
        assert!((quad.bottom_right.y - 440.0).abs() < 15.0, "{:?}", quad.bottom_right);
    }

    /// The strongest of two overlapping rectangles wins; only one quad is
    /// ever returned.
    #[test]
    fn overlapping_documents_return_single_quad() {
        let (w, h) = (400u32, 400u32);
        let mut img = GrayImage::from_pixel(w, h, Luma([15u8]));
        // Dominant document.
        for y in 40..360 {
            for x in 40..360 {
                img.put_pixel(x, y, Luma([230u8]));
            }
        }
        // Smaller overlapping sheet.
        for y in 300..390 {
            for x in 300..390 {
                img.put_pixel(x, y, Luma([180u8]));
            }
        }

        let detector = BoundaryDetector::new(EngineConfig::default());
        if let Some(quad) = detector.detect(&page_from_gray(img)) {
            // The dominant rectangle covers most of the frame.
            let ratio = quad.area() / (w as f32 * h as f32);
            assert!(ratio > 0.3, "expected the dominant document, got {ratio}");
        }
    }

    #[test]
    fn area_plausibility_rejects_extremes() {
        assert_eq!(area_plausibility(0.01), 0.0);
        assert_eq!(area_plausibility(0.999), 0.0);
        assert_eq!(area_plausibility(0.5), 1.0);
        // Smooth ramps, not cliffs.
        let mid = area_plausibility(0.12);
        assert!(mid > 0.0 && mid < 1.0);
        let high = area_plausibility(0.97);
        assert!(high > 0.0 && high < 1.0);
    }

    #[test]
    fn angle_regularity_is_one_for_rectangles() {
        let score = angle_regularity(&rect_corners());
        assert!((score - 1.0).abs() < 1e-3, "got {score}");
    }

    #[test]
    fn self_intersecting_corners_are_not_convex() {
        // Bowtie ordering.
        let corners = [
            Point::new(0.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(100.0, 0.0),
            Point::new(0.0, 100.0),
        ];
        assert!(!is_convex(&corners));
        assert!(is_convex(&rect_corners()));
    }

    #[test]
    fn roles_are_stable_under_corner_shuffling() {
        let [tl, tr, bl, br] = normalize_roles(&[
            Point::new(350.0, 440.0),
            Point::new(50.0, 60.0),
            Point::new(50.0, 440.0),
            Point::new(350.0, 60.0),
        ]);
        assert_eq!(tl, Point::new(50.0, 60.0));
        assert_eq!(tr, Point::new(350.0, 60.0));
        assert_eq!(bl, Point::new(50.0, 440.0));
        assert_eq!(br, Point::new(350.0, 440.0));
    }

    #[test]
    fn intersect_perpendicular_polar_lines() {
        // Horizontal line at y=100: angle=90, r=100. Vertical at x=50.
        let h = PolarLine {
            r: 100.0,
            angle_in_degrees: 90,
        };
        let v = PolarLine {
            r: 50.0,
            angle_in_degrees: 0,
        };
        let pt = intersect_polar_lines(&h, &v).expect("should intersect");
        assert!((pt.x - 50.0).abs() < 0.5 && (pt.y - 100.0).abs() < 0.5);
    }

    #[test]
    fn parallel_polar_lines_do_not_intersect() {
        let a = PolarLine {
            r: 50.0,
            angle_in_degrees: 0,
        };
        let b = PolarLine {
            r: 100.0,
            angle_in_degrees: 0,
        };
        assert!(intersect_polar_lines(&a, &b).is_none());
    }

    #[test]
    fn thin_lines_keeps_extremes() {
        let lines: Vec<PolarLine> = (0..10)
            .map(|i| PolarLine {
                r: i as f32 * 10.0,
                angle_in_degrees: 0,
            })
            .collect();
        let kept = thin_lines(lines, 4);
        assert_eq!(kept.len(), 4);
        assert_eq!(kept[0].r, 0.0);
        assert_eq!(kept[3].r, 90.0);
    }
}
