use serde_derive::{Deserialize, Serialize};

use crate::math::{v2, Vector2};
use crate::utility::Color;

/// Sides of a rectangle obstacle, named in simulation coordinates where `y`
/// grows upwards (`Top` is the side with the largest `y`).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PlaneSide {
    Top,
    Bottom,
    Left,
    Right,
}

/// Geometry of one rectangle side, used to place emitters and drains on it.
#[derive(Copy, Clone)]
pub struct SideGeometry {
    pub midpoint: Vector2,
    /// Unit vector pointing away from the rectangle.
    pub outward: Vector2,
    pub length: f32,
}

/// A static collider the fluid flows around. The two shapes differ only in
/// the geometry they carry and their signed distance; everything else
/// dispatches on the variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StaticObstacle {
    Circle {
        center: Vector2,
        radius: f32,
        color: Color,
    },
    /// Axis aligned, `min_corner` is the lower-left corner.
    Rectangle {
        min_corner: Vector2,
        size: Vector2,
        color: Color,
    },
}

impl StaticObstacle {
    pub fn circle(center: Vector2, radius: f32, color: Color) -> Self {
        StaticObstacle::Circle {
            center,
            radius,
            color,
        }
    }

    pub fn rectangle(min_corner: Vector2, size: Vector2, color: Color) -> Self {
        StaticObstacle::Rectangle {
            min_corner,
            size,
            color,
        }
    }

    /// Signed distance from `point` to the obstacle surface.
    /// Negative strictly inside, zero on the boundary, positive outside.
    pub fn distance_to(&self, point: Vector2) -> f32 {
        match self {
            StaticObstacle::Circle { center, radius, .. } => {
                (point - *center).length() - radius
            }
            StaticObstacle::Rectangle {
                min_corner, size, ..
            } => {
                let max_corner = *min_corner + *size;
                let inside = point.x > min_corner.x
                    && point.x < max_corner.x
                    && point.y > min_corner.y
                    && point.y < max_corner.y;

                if inside {
                    -(point.x - min_corner.x)
                        .min(max_corner.x - point.x)
                        .min(point.y - min_corner.y)
                        .min(max_corner.y - point.y)
                } else {
                    let dx = (min_corner.x - point.x).max(point.x - max_corner.x).max(0.0);
                    let dy = (min_corner.y - point.y).max(point.y - max_corner.y).max(0.0);
                    v2!(dx, dy).length()
                }
            }
        }
    }

    pub fn color(&self) -> Color {
        match self {
            StaticObstacle::Circle { color, .. } => *color,
            StaticObstacle::Rectangle { color, .. } => *color,
        }
    }

    /// Midpoint, outward direction and length of one side.
    /// Only rectangles have flat sides; circles return `None`.
    pub fn side_geometry(&self, side: PlaneSide) -> Option<SideGeometry> {
        let StaticObstacle::Rectangle {
            min_corner, size, ..
        } = self
        else {
            return None;
        };

        let center = *min_corner + *size * 0.5;
        let geometry = match side {
            PlaneSide::Top => SideGeometry {
                midpoint: v2!(center.x, min_corner.y + size.y),
                outward: v2!(0.0, 1.0),
                length: size.x,
            },
            PlaneSide::Bottom => SideGeometry {
                midpoint: v2!(center.x, min_corner.y),
                outward: v2!(0.0, -1.0),
                length: size.x,
            },
            PlaneSide::Left => SideGeometry {
                midpoint: v2!(min_corner.x, center.y),
                outward: v2!(-1.0, 0.0),
                length: size.y,
            },
            PlaneSide::Right => SideGeometry {
                midpoint: v2!(min_corner.x + size.x, center.y),
                outward: v2!(1.0, 0.0),
                length: size.y,
            },
        };

        Some(geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::{PlaneSide, StaticObstacle};
    use crate::math::{v2, Vector2};
    use crate::utility::Color;

    fn circle() -> StaticObstacle {
        StaticObstacle::circle(v2!(5.0, 5.0), 2.0, Color::rgb(0, 0, 0))
    }

    fn rectangle() -> StaticObstacle {
        StaticObstacle::rectangle(v2!(1.0, 2.0), v2!(4.0, 2.0), Color::rgb(0, 0, 0))
    }

    #[test]
    fn circle_distance_signs() {
        let circle = circle();

        assert!((circle.distance_to(v2!(5.0, 5.0)) + 2.0).abs() < 1e-6);
        assert!((circle.distance_to(v2!(8.0, 5.0)) - 1.0).abs() < 1e-6);
        assert!(circle.distance_to(v2!(7.0, 5.0)).abs() < 1e-6);
    }

    #[test]
    fn rectangle_distance_inside_is_closest_side() {
        let rectangle = rectangle();

        // 0.5 away from the bottom side, further from all others
        assert!((rectangle.distance_to(v2!(3.0, 2.5)) + 0.5).abs() < 1e-6);
    }

    #[test]
    fn rectangle_distance_outside_corner() {
        let rectangle = rectangle();

        // 3-4-5 triangle from the top-right corner (5, 4)
        assert!((rectangle.distance_to(v2!(8.0, 8.0)) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn rectangle_distance_outside_edge() {
        let rectangle = rectangle();

        assert!((rectangle.distance_to(v2!(3.0, 0.0)) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn side_geometry_points_outward() {
        let rectangle = rectangle();

        let top = rectangle.side_geometry(PlaneSide::Top).unwrap();
        assert_eq!(top.midpoint, v2!(3.0, 4.0));
        assert_eq!(top.outward, v2!(0.0, 1.0));
        assert_eq!(top.length, 4.0);

        let left = rectangle.side_geometry(PlaneSide::Left).unwrap();
        assert_eq!(left.midpoint, v2!(1.0, 3.0));
        assert_eq!(left.outward, v2!(-1.0, 0.0));
        assert_eq!(left.length, 2.0);
    }

    #[test]
    fn circles_have_no_sides() {
        assert!(circle().side_geometry(PlaneSide::Top).is_none());
    }
}
