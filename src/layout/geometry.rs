use serde::{Deserialize, Serialize};

pub type Point = (f32, f32);

/// Absolute axis-aligned box in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Zero-footprint boxes mark text shapes and invisible anchor targets.
    pub fn is_zero(&self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn inflate(&self, pad: f32) -> Self {
        Self::new(
            self.x - pad,
            self.y - pad,
            self.width + pad * 2.0,
            self.height + pad * 2.0,
        )
    }

    /// Content box: the box shrunk by `pad` on every side.
    pub fn inset(&self, pad: f32) -> Self {
        Self::new(
            self.x + pad,
            self.y + pad,
            self.width - pad * 2.0,
            self.height - pad * 2.0,
        )
    }

    /// Inclusive overlap test; boxes that merely touch count as overlapping.
    pub fn touches(&self, other: &Bounds) -> bool {
        !(self.right() < other.x
            || other.right() < self.x
            || self.bottom() < other.y
            || other.bottom() < self.y)
    }

    /// True when the intersection has positive area.
    pub fn overlaps(&self, other: &Bounds) -> bool {
        overlap_area(self, other) > 0.0
    }

    pub fn contains_point(&self, point: Point) -> bool {
        point.0 >= self.x && point.0 <= self.right() && point.1 >= self.y && point.1 <= self.bottom()
    }

    pub fn union(&self, other: &Bounds) -> Self {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = self.right().max(other.right());
        let max_y = self.bottom().max(other.bottom());
        Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    pub fn union_all<'a>(boxes: impl IntoIterator<Item = &'a Bounds>) -> Option<Bounds> {
        boxes
            .into_iter()
            .fold(None, |acc: Option<Bounds>, b| match acc {
                Some(acc) => Some(acc.union(b)),
                None => Some(*b),
            })
    }

    pub fn rounded(&self) -> Self {
        Self::new(
            round2(self.x),
            round2(self.y),
            round2(self.width),
            round2(self.height),
        )
    }
}

pub fn overlap_area(a: &Bounds, b: &Bounds) -> f32 {
    let w = (a.right().min(b.right()) - a.x.max(b.x)).max(0.0);
    let h = (a.bottom().min(b.bottom()) - a.y.max(b.y)).max(0.0);
    w * h
}

/// Running min/max accumulator for extents that are not boxes yet.
#[derive(Debug, Clone, Copy)]
pub struct Extent {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Extent {
    pub fn empty() -> Self {
        Self {
            min_x: f32::INFINITY,
            min_y: f32::INFINITY,
            max_x: f32::NEG_INFINITY,
            max_y: f32::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.min_x.is_finite()
    }

    pub fn include_point(&mut self, point: Point) {
        self.min_x = self.min_x.min(point.0);
        self.min_y = self.min_y.min(point.1);
        self.max_x = self.max_x.max(point.0);
        self.max_y = self.max_y.max(point.1);
    }

    pub fn include_bounds(&mut self, b: &Bounds) {
        self.include_point((b.x, b.y));
        self.include_point((b.right(), b.bottom()));
    }

    pub fn to_bounds(&self) -> Option<Bounds> {
        if self.is_empty() {
            return None;
        }
        Some(Bounds::new(
            self.min_x,
            self.min_y,
            self.max_x - self.min_x,
            self.max_y - self.min_y,
        ))
    }
}

pub fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

pub fn distance(a: Point, b: Point) -> f32 {
    (b.0 - a.0).hypot(b.1 - a.1)
}

pub fn midpoint(a: Point, b: Point) -> Point {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}

pub fn angle_between(from: Point, to: Point) -> f32 {
    (to.1 - from.1).atan2(to.0 - from.0)
}

/// Point `dist` along `angle` from `origin`.
pub fn project(origin: Point, angle: f32, dist: f32) -> Point {
    (origin.0 + angle.cos() * dist, origin.1 + angle.sin() * dist)
}

/// Either an absolute pixel value or a percentage of a reference length.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "NumberOrString")]
pub enum PosValue {
    Px(f32),
    Percent(f32),
}

impl PosValue {
    pub fn resolve(&self, reference: f32) -> f32 {
        match self {
            PosValue::Px(v) => *v,
            PosValue::Percent(p) => p / 100.0 * reference,
        }
    }
}

impl Default for PosValue {
    fn default() -> Self {
        PosValue::Px(0.0)
    }
}

impl From<f32> for PosValue {
    fn from(value: f32) -> Self {
        PosValue::Px(value)
    }
}

impl From<f64> for PosValue {
    fn from(value: f64) -> Self {
        PosValue::Px(value as f32)
    }
}

impl Serialize for PosValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PosValue::Px(v) => serializer.serialize_f32(*v),
            PosValue::Percent(p) => serializer.serialize_str(&format!("{p}%")),
        }
    }
}

/// Reads a fractional offset where bare numbers are percentages: `25` and `"25%"` both give 0.25.
pub fn resolve_percent(value: &PosValue) -> f32 {
    match value {
        PosValue::Px(v) => v / 100.0,
        PosValue::Percent(p) => p / 100.0,
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(f32),
    String(String),
}

impl NumberOrString {
    pub(crate) fn as_f32(&self) -> Option<f32> {
        match self {
            NumberOrString::Number(val) => Some(*val),
            NumberOrString::String(val) => val.trim().parse::<f32>().ok(),
        }
    }

    pub(crate) fn as_string(&self) -> String {
        match self {
            NumberOrString::Number(val) => format!("{}", val),
            NumberOrString::String(val) => val.clone(),
        }
    }
}

impl TryFrom<NumberOrString> for PosValue {
    type Error = String;

    fn try_from(raw: NumberOrString) -> Result<Self, Self::Error> {
        match raw {
            NumberOrString::Number(v) => Ok(PosValue::Px(v)),
            NumberOrString::String(s) => {
                let trimmed = s.trim();
                if let Some(pct) = trimmed.strip_suffix('%') {
                    pct.trim()
                        .parse::<f32>()
                        .map(PosValue::Percent)
                        .map_err(|_| format!("invalid percentage `{s}`"))
                } else {
                    trimmed
                        .parse::<f32>()
                        .map(PosValue::Px)
                        .map_err(|_| format!("invalid position value `{s}`"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_area_rect_intersection() {
        let a = Bounds::new(0.0, 0.0, 10.0, 10.0);
        let b = Bounds::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(overlap_area(&a, &b), 25.0);
        let c = Bounds::new(20.0, 20.0, 5.0, 5.0);
        assert_eq!(overlap_area(&a, &c), 0.0);
    }

    #[test]
    fn touching_boxes_touch_but_do_not_overlap() {
        let a = Bounds::new(0.0, 0.0, 10.0, 10.0);
        let b = Bounds::new(10.0, 0.0, 10.0, 10.0);
        assert!(a.touches(&b));
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn percent_values_resolve_against_reference() {
        assert_eq!(PosValue::Percent(50.0).resolve(800.0), 400.0);
        assert_eq!(PosValue::Px(12.0).resolve(800.0), 12.0);
        assert_eq!(resolve_percent(&PosValue::Px(25.0)), 0.25);
        assert_eq!(resolve_percent(&PosValue::Percent(25.0)), 0.25);
    }

    #[test]
    fn pos_value_parses_numbers_and_strings() {
        let parsed: Vec<PosValue> = serde_json::from_str(r#"[10, "25%", "7.5"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![PosValue::Px(10.0), PosValue::Percent(25.0), PosValue::Px(7.5)]
        );
        assert!(serde_json::from_str::<PosValue>(r#""abc%""#).is_err());
    }

    #[test]
    fn round2_keeps_two_decimals() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(1.236), 1.24);
    }

    #[test]
    fn extent_empty_has_no_bounds() {
        let mut extent = Extent::empty();
        assert!(extent.to_bounds().is_none());
        extent.include_point((1.0, 2.0));
        extent.include_point((5.0, -1.0));
        assert_eq!(extent.to_bounds(), Some(Bounds::new(1.0, -1.0, 4.0, 3.0)));
    }
}
