//! Obstacle aggregation keyed by exact world coordinate.
//!
//! Each distinct [`WorldPoint`] maps to the set of [`Direction`]s that have
//! observed it.  Re-recording the same point from the same direction is a
//! no-op, so the set never holds duplicates.  Entries are kept in the order
//! their coordinate was first observed so exported snapshots are stable
//! across replays.
//!
//! There is no removal and no size bound: a long-running session grows the
//! map without limit.

use std::collections::{BTreeSet, HashMap};

use sonarmap_types::{Direction, ObstaclePoint, WorldPoint};

/// Strictly additive mapping from world coordinate to observing directions.
#[derive(Debug, Clone, Default)]
pub struct ObstacleAggregator {
    /// `index[point]` is the position of `point` in `entries`.
    index: HashMap<WorldPoint, usize>,
    entries: Vec<(WorldPoint, BTreeSet<Direction>)>,
}

impl ObstacleAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `direction` observed an obstacle at `point`.
    ///
    /// Returns `true` when this added new information (a new point, or a new
    /// direction for an existing point).
    pub fn record(&mut self, point: WorldPoint, direction: Direction) -> bool {
        match self.index.get(&point) {
            Some(&slot) => self.entries[slot].1.insert(direction),
            None => {
                self.index.insert(point, self.entries.len());
                self.entries.push((point, BTreeSet::from([direction])));
                true
            }
        }
    }

    /// Number of distinct obstacle coordinates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Directions that observed exactly `point`, if any.
    pub fn directions_at(&self, point: WorldPoint) -> Option<&BTreeSet<Direction>> {
        self.index.get(&point).map(|&slot| &self.entries[slot].1)
    }

    /// Entries in first-observation order.
    pub fn iter(&self) -> impl Iterator<Item = (WorldPoint, &BTreeSet<Direction>)> + '_ {
        self.entries.iter().map(|(p, dirs)| (*p, dirs))
    }

    /// Owned copy of every entry, for snapshots.
    pub fn to_points(&self) -> Vec<ObstaclePoint> {
        self.iter()
            .map(|(p, dirs)| ObstaclePoint {
                x: p.x,
                y: p.y,
                directions: dirs.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_point_creates_entry() {
        let mut agg = ObstacleAggregator::new();
        assert!(agg.is_empty());
        assert!(agg.record(WorldPoint::new(0.0, 50.0), Direction::North));
        assert_eq!(agg.len(), 1);
        assert_eq!(
            agg.directions_at(WorldPoint::new(0.0, 50.0)),
            Some(&BTreeSet::from([Direction::North]))
        );
    }

    #[test]
    fn same_point_same_direction_is_idempotent() {
        let mut agg = ObstacleAggregator::new();
        let p = WorldPoint::new(50.0, 0.0);
        assert!(agg.record(p, Direction::East));
        assert!(!agg.record(p, Direction::East));
        assert_eq!(agg.len(), 1);
        assert_eq!(agg.directions_at(p).map(BTreeSet::len), Some(1));
    }

    #[test]
    fn same_point_other_direction_extends_set() {
        let mut agg = ObstacleAggregator::new();
        let p = WorldPoint::new(3.0, 4.0);
        agg.record(p, Direction::West);
        assert!(agg.record(p, Direction::North));
        let dirs: Vec<_> = agg.directions_at(p).unwrap().iter().copied().collect();
        assert_eq!(dirs, vec![Direction::North, Direction::West]);
    }

    #[test]
    fn nearby_points_are_distinct() {
        let mut agg = ObstacleAggregator::new();
        agg.record(WorldPoint::new(10.0, 50.0), Direction::North);
        agg.record(WorldPoint::new(10.000001, 50.0), Direction::North);
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn export_keeps_first_observation_order() {
        let mut agg = ObstacleAggregator::new();
        agg.record(WorldPoint::new(5.0, 5.0), Direction::South);
        agg.record(WorldPoint::new(-1.0, 0.0), Direction::West);
        agg.record(WorldPoint::new(5.0, 5.0), Direction::East);

        let points = agg.to_points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].position(), WorldPoint::new(5.0, 5.0));
        assert_eq!(
            points[0].directions,
            BTreeSet::from([Direction::East, Direction::South])
        );
        assert_eq!(points[1].position(), WorldPoint::new(-1.0, 0.0));
    }
}
