//! Append-only trail of visited world-frame positions.

use sonarmap_types::WorldPoint;

/// Ordered sequence of positions, one per processed pose.
///
/// Consecutive duplicates are kept: a robot that reports the same position
/// twice was stationary for that step.
#[derive(Debug, Clone, Default)]
pub struct PathRecorder {
    points: Vec<WorldPoint>,
}

impl PathRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, point: WorldPoint) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Most recently appended position.
    pub fn last(&self) -> Option<WorldPoint> {
        self.points.last().copied()
    }

    pub fn points(&self) -> &[WorldPoint] {
        &self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_in_order() {
        let mut path = PathRecorder::new();
        path.append(WorldPoint::origin());
        path.append(WorldPoint::new(10.0, 0.0));
        assert_eq!(path.points(), &[WorldPoint::origin(), WorldPoint::new(10.0, 0.0)]);
        assert_eq!(path.last(), Some(WorldPoint::new(10.0, 0.0)));
    }

    #[test]
    fn keeps_stationary_duplicates() {
        let mut path = PathRecorder::new();
        for _ in 0..3 {
            path.append(WorldPoint::new(1.0, 1.0));
        }
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn empty_path_has_no_last() {
        let path = PathRecorder::new();
        assert!(path.is_empty());
        assert_eq!(path.last(), None);
    }
}
