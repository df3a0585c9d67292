use crate::math::Vector2;

use super::kernels;

/// Hard cap on particle speed, in simulation units per second.
pub const V_MAX: f32 = 10.0;

/// One fluid particle. Identity is its slot in the simulation's particle
/// sequence; the engine creates and destroys them.
#[derive(Clone)]
pub struct Particle {
    pub position: Vector2,
    pub velocity: Vector2,
    /// Force accumulator, cleared at the end of every step.
    pub(super) force: Vector2,
    mass: f32,
    pub density: f32,
    pub pressure: f32,
}

impl Particle {
    pub fn new(position: Vector2, mass: f32) -> Self {
        Self::new_with_velocity(position, Vector2::zero(), mass)
    }

    pub fn new_with_velocity(position: Vector2, velocity: Vector2, mass: f32) -> Self {
        Particle {
            position,
            velocity,
            force: Vector2::zero(),
            mass,
            // Every particle always sees at least itself
            density: mass * kernels::poly6(0.0),
            pressure: 0.0,
        }
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Adds `force` to the accumulated force.
    pub fn add_force(&mut self, force: Vector2) {
        self.force += force;
    }

    /// Turns the accumulated force into a velocity change and clamps the
    /// resulting speed to `V_MAX`.
    pub fn apply_accumulated_force(&mut self, delta_time: f32) {
        let acceleration = self.force / self.density;
        self.velocity += acceleration * delta_time;
        self.velocity = self.velocity.clamp_length(V_MAX);
    }

    pub fn move_by_velocity(&mut self, delta_time: f32) {
        self.position += self.velocity * delta_time;
    }

    /// Clears the force accumulator and restores the density to its
    /// self-contribution, ready for the next density pass.
    pub fn reset_for_next_step(&mut self) {
        self.force = Vector2::zero();
        self.density = self.mass * kernels::poly6(0.0);
    }
}
