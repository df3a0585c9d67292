use std::f32::consts::PI;

use serde_derive::{Deserialize, Serialize};

use crate::math::{v2, Vector2};
use crate::physics::obstacle::StaticObstacle;

use super::PlaneAttachment;

/// Speed given to particles leaving a point source.
const POINT_EMIT_SPEED: f32 = 0.5;
/// Jitter along the emission direction, in simulation units.
const LINE_EMIT_JITTER: f32 = 0.05;
/// Relative noise applied per component to the emission velocity.
const VELOCITY_NOISE: f32 = 0.15;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SourceShape {
    /// Emits in a random direction within `spawn_radius` of the position.
    Point { spawn_radius: f32 },
    /// Emits along `direction` from a segment of `length` centered on the
    /// position and perpendicular to `direction`.
    Line {
        direction: Vector2,
        length: f32,
    },
}

/// Where an emission attempt would place a particle. Plane-attached sources
/// re-derive this from their rectangle every attempt, so moving or resizing
/// the obstacle moves the source with it.
#[derive(Copy, Clone)]
pub enum EmissionGeometry {
    Point {
        position: Vector2,
        spawn_radius: f32,
    },
    Line {
        position: Vector2,
        direction: Vector2,
        length: f32,
    },
}

/// Emits particles at a fixed rate from a point, a free-standing line, or
/// one side of a rectangle obstacle.
#[derive(Clone)]
pub struct Source {
    pub position: Vector2,
    pub shape: SourceShape,
    /// Emission attempts per second.
    pub rate: f32,
    /// Initial speed of emitted particles. Point sources ignore it and use a
    /// fixed slow drift instead.
    pub velocity_magnitude: f32,
    /// Set when the source sits on a rectangle side. The relation is a
    /// lookup by obstacle index, never ownership.
    pub attached: Option<PlaneAttachment>,
    pub(super) last_emit_ms: f64,
}

impl Source {
    pub fn point(position: Vector2, spawn_radius: f32, rate: f32) -> Self {
        Source {
            position,
            shape: SourceShape::Point { spawn_radius },
            rate,
            velocity_magnitude: POINT_EMIT_SPEED,
            attached: None,
            last_emit_ms: 0.0,
        }
    }

    pub fn line(
        position: Vector2,
        direction: Vector2,
        length: f32,
        rate: f32,
        velocity_magnitude: f32,
    ) -> Self {
        let direction = if direction.is_zero() {
            v2!(1.0, 0.0)
        } else {
            direction.normalized()
        };

        Source {
            position,
            shape: SourceShape::Line { direction, length },
            rate,
            velocity_magnitude,
            attached: None,
            last_emit_ms: 0.0,
        }
    }

    pub fn from_plane(
        attachment: PlaneAttachment,
        rate: f32,
        velocity_magnitude: f32,
    ) -> Self {
        Source {
            position: Vector2::zero(),
            shape: SourceShape::Line {
                direction: v2!(1.0, 0.0),
                length: 0.0,
            },
            rate,
            velocity_magnitude,
            attached: Some(attachment),
            last_emit_ms: 0.0,
        }
    }

    /// An attempt is due once the configured interval has passed. A rate of
    /// zero never fires.
    pub(super) fn due(&self, now_ms: f64) -> bool {
        self.rate > 0.0 && now_ms - self.last_emit_ms >= 1000.0 / self.rate as f64
    }

    /// Resolves where this source currently emits from. Attached sources
    /// follow their rectangle side; a dangling attachment yields `None`.
    pub(crate) fn emission_geometry(
        &self,
        obstacles: &[StaticObstacle],
    ) -> Option<EmissionGeometry> {
        if let Some(attachment) = self.attached {
            let side = obstacles
                .get(attachment.obstacle)?
                .side_geometry(attachment.side)?;
            return Some(EmissionGeometry::Line {
                position: side.midpoint,
                direction: side.outward,
                length: side.length,
            });
        }

        match self.shape {
            SourceShape::Point { spawn_radius } => Some(EmissionGeometry::Point {
                position: self.position,
                spawn_radius,
            }),
            SourceShape::Line { direction, length } => Some(EmissionGeometry::Line {
                position: self.position,
                direction,
                length,
            }),
        }
    }

    /// Samples a spawn position and initial velocity for one emission.
    pub(crate) fn sample_emission(
        &self,
        geometry: &EmissionGeometry,
        rng: &mut fastrand::Rng,
    ) -> (Vector2, Vector2) {
        match *geometry {
            EmissionGeometry::Point {
                position,
                spawn_radius,
            } => {
                let angle = rng.f32() * 2.0 * PI;
                let radius = rng.f32() * spawn_radius;
                let direction = v2!(angle.cos(), angle.sin());

                (
                    position + direction * radius,
                    direction * POINT_EMIT_SPEED,
                )
            }
            EmissionGeometry::Line {
                position,
                direction,
                length,
            } => {
                let offset = (rng.f32() - 0.5) * length;
                let jitter = (rng.f32() - 0.5) * 2.0 * LINE_EMIT_JITTER;
                let spawn = position + direction.perp() * offset + direction * jitter;

                let noise_x = (rng.f32() - 0.5) * 2.0 * VELOCITY_NOISE;
                let noise_y = (rng.f32() - 0.5) * 2.0 * VELOCITY_NOISE;
                let velocity = v2!(
                    direction.x * self.velocity_magnitude * (1.0 + noise_x),
                    direction.y * self.velocity_magnitude * (1.0 + noise_y)
                );

                (spawn, velocity)
            }
        }
    }
}
