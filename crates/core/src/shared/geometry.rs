use serde::Serialize;

/// A 2D point in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned face box given by its top-left and bottom-right corners.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub top_left: Point,
    pub bottom_right: Point,
}

impl BoundingBox {
    pub fn new(top_left: Point, bottom_right: Point) -> Self {
        Self {
            top_left,
            bottom_right,
        }
    }

    pub fn width(&self) -> f32 {
        (self.bottom_right.x - self.top_left.x).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bottom_right.y - self.top_left.y).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Clamps both corners into a `width × height` frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let clamp = |p: Point| Point {
            x: p.x.clamp(0.0, width as f32),
            y: p.y.clamp(0.0, height as f32),
        };
        Self {
            top_left: clamp(self.top_left),
            bottom_right: clamp(self.bottom_right),
        }
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.top_left.x.max(other.top_left.x);
        let iy1 = self.top_left.y.max(other.top_left.y);
        let ix2 = self.bottom_right.x.min(other.bottom_right.x);
        let iy2 = self.bottom_right.y.min(other.bottom_right.y);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn bbox(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox::new(Point::new(x1, y1), Point::new(x2, y2))
    }

    #[test]
    fn test_dimensions() {
        let b = bbox(10.0, 20.0, 110.0, 70.0);
        assert_relative_eq!(b.width(), 100.0);
        assert_relative_eq!(b.height(), 50.0);
        assert_relative_eq!(b.area(), 5000.0);
    }

    #[test]
    fn test_inverted_box_has_zero_size() {
        let b = bbox(50.0, 50.0, 10.0, 10.0);
        assert_relative_eq!(b.area(), 0.0);
    }

    #[test]
    fn test_clamp_to_frame() {
        let b = bbox(-20.0, -5.0, 700.0, 500.0).clamp_to(640, 480);
        assert_eq!(b, bbox(0.0, 0.0, 640.0, 480.0));
    }

    #[test]
    fn test_iou_partial_overlap() {
        // intersection 50*100 = 5000, union 15000
        let a = bbox(0.0, 0.0, 100.0, 100.0);
        let b = bbox(50.0, 0.0, 150.0, 100.0);
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    #[rstest]
    #[case::identical(bbox(10.0, 10.0, 60.0, 60.0), 1.0)]
    #[case::disjoint(bbox(200.0, 200.0, 250.0, 250.0), 0.0)]
    #[case::touching(bbox(60.0, 10.0, 110.0, 60.0), 0.0)]
    fn test_iou_cases(#[case] other: BoundingBox, #[case] expected: f32) {
        let a = bbox(10.0, 10.0, 60.0, 60.0);
        assert_relative_eq!(a.iou(&other), expected);
    }

    #[test]
    fn test_point_from_tuple() {
        assert_eq!(Point::from((3.0, 4.0)), Point::new(3.0, 4.0));
    }
}
