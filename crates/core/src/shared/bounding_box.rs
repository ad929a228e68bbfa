/// Axis-aligned face candidate in pixel coordinates of the frame it was
/// detected in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Tracked point of a face: the middle of its bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Center {
    pub x: f64,
    pub y: f64,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// Center with the half-extent truncated to whole pixels.
    pub fn center(&self) -> Center {
        Center {
            x: (self.x + self.width / 2) as f64,
            y: (self.y + self.height / 2) as f64,
        }
    }

    /// The dominant candidate: maximal area, first one wins on ties.
    pub fn largest(boxes: &[BoundingBox]) -> Option<&BoundingBox> {
        boxes.iter().fold(None, |best, b| match best {
            Some(current) if current.area() >= b.area() => Some(current),
            _ => Some(b),
        })
    }
}

impl Center {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Center) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}
