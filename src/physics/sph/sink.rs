use crate::math::Vector2;
use crate::physics::obstacle::StaticObstacle;

use super::PlaneAttachment;

/// Region a sink currently drains from.
#[derive(Copy, Clone)]
pub enum DrainGeometry {
    Point {
        position: Vector2,
        range: f32,
    },
    /// A rectangle side: particles within `range` of the side line and
    /// within `half_length` of its midpoint along the side are eligible.
    Segment {
        midpoint: Vector2,
        tangent: Vector2,
        half_length: f32,
        range: f32,
    },
}

impl DrainGeometry {
    pub fn contains(&self, point: Vector2) -> bool {
        match *self {
            DrainGeometry::Point { position, range } => (point - position).length() <= range,
            DrainGeometry::Segment {
                midpoint,
                tangent,
                half_length,
                range,
            } => {
                let offset = point - midpoint;
                let parallel = offset.dot(tangent);
                let perpendicular = offset.dot(tangent.perp());

                parallel.abs() <= half_length && perpendicular.abs() <= range
            }
        }
    }
}

/// Removes particles near a point or a rectangle side, at most one per
/// configured interval.
#[derive(Clone)]
pub struct Sink {
    pub position: Vector2,
    /// Drain attempts per second.
    pub rate: f32,
    /// Perpendicular tolerance around the drain point or line.
    pub range: f32,
    /// Set when the sink sits on a rectangle side; a lookup, not ownership.
    pub attached: Option<PlaneAttachment>,
    pub(super) last_drain_ms: f64,
}

impl Sink {
    pub fn point(position: Vector2, rate: f32, range: f32) -> Self {
        Sink {
            position,
            rate,
            range,
            attached: None,
            last_drain_ms: 0.0,
        }
    }

    pub fn from_plane(attachment: PlaneAttachment, rate: f32, range: f32) -> Self {
        Sink {
            position: Vector2::zero(),
            rate,
            range,
            attached: Some(attachment),
            last_drain_ms: 0.0,
        }
    }

    pub(super) fn due(&self, now_ms: f64) -> bool {
        self.rate > 0.0 && now_ms - self.last_drain_ms >= 1000.0 / self.rate as f64
    }

    /// Resolves where this sink currently drains. Attached sinks follow
    /// their rectangle side; a dangling attachment yields `None`.
    pub(crate) fn drain_geometry(&self, obstacles: &[StaticObstacle]) -> Option<DrainGeometry> {
        let Some(attachment) = self.attached else {
            return Some(DrainGeometry::Point {
                position: self.position,
                range: self.range,
            });
        };

        let side = obstacles
            .get(attachment.obstacle)?
            .side_geometry(attachment.side)?;

        Some(DrainGeometry::Segment {
            midpoint: side.midpoint,
            tangent: side.outward.perp(),
            half_length: side.length * 0.5,
            range: self.range,
        })
    }
}
