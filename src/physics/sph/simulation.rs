use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};

use crate::math::{v2, Vector2};
use crate::physics::obstacle::{PlaneSide, StaticObstacle};
use crate::utility::{index_pair_mut, Clock, SystemClock};

use super::grid::SpatialGrid;
use super::kernels;
use super::particle::Particle;
use super::sink::Sink;
use super::source::Source;
use super::{FluidProperties, PlaneAttachment};

/// Screen units per simulation unit. One simulation unit is the kernel
/// support radius, so one grid cell spans `SCALE` screen units.
pub const SCALE: f32 = 30.0;
/// Fixed time step of one tick, in seconds.
pub const DT: f32 = 0.015;
/// Population cap; sources stop emitting once it is reached.
pub const SIM_MAX_PARTICLES: usize = 6000;

/// Interior margin kept between the requested view edges and the usable
/// domain, in screen units.
pub(crate) const BOUNDS_MARGIN: f32 = 5.0;
/// How far particles are pushed past a surface they penetrated.
const SURFACE_MARGIN: f32 = 0.01;
/// Finite-difference step for surface normals.
const NORMAL_STEP: f32 = 1e-4;
/// Bump added to pair distances before dividing by them.
const DIST_EPS: f32 = 1e-6;

const DEFAULT_FRICTION: f32 = 0.5;

/// Usable simulation domain. Particles are kept inside it.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DomainBounds {
    pub xmin: f32,
    pub xmax: f32,
    pub ymin: f32,
    pub ymax: f32,
}

impl DomainBounds {
    pub fn contains(&self, point: Vector2) -> bool {
        point.x >= self.xmin
            && point.x <= self.xmax
            && point.y >= self.ymin
            && point.y <= self.ymax
    }
}

/// A pending pointer interaction: every particle in `cell` gets `velocity`
/// on the next tick, once.
struct ForcedVelocityRequest {
    cell: usize,
    velocity: Vector2,
}

/// The simulation engine. Owns all mutable state - particles, obstacles,
/// emitters, drains and the lookup grid - and advances it one fixed tick at
/// a time. Independent instances do not share anything.
///
/// Coordinates crossing the API are in screen units where noted; internal
/// state is in simulation units (multiples of the kernel radius) with `y`
/// growing upwards, while screen `y` grows downwards:
///
/// ```text
///    screen (0, 0) ---------- (w, 0)        sim (0, ymax) --- (xmax, ymax)
///          |                     |                 |                 |
///    (0, h) ------------- (w, h)             (0, 0) -------- (xmax, 0)
/// ```
pub struct Simulation {
    bounds: DomainBounds,
    fluid: FluidProperties,
    friction: f32,
    particles: Vec<Particle>,
    obstacles: Vec<StaticObstacle>,
    sources: Vec<Source>,
    sinks: Vec<Sink>,
    grid: Option<SpatialGrid>,
    forced: Option<ForcedVelocityRequest>,
    rng: fastrand::Rng,
    clock: Box<dyn Clock>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    /// Creates the engine with a caller-provided clock, so tests can drive
    /// emission and drain cadence deterministically.
    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Simulation {
            bounds: DomainBounds::default(),
            fluid: FluidProperties::default(),
            friction: DEFAULT_FRICTION,
            particles: Vec::new(),
            obstacles: Vec::new(),
            sources: Vec::new(),
            sinks: Vec::new(),
            grid: None,
            forced: None,
            rng: fastrand::Rng::new(),
            clock,
        }
    }

    /// Establishes the domain and the lookup grid. `width` and `height` are
    /// the view size in screen units; the grid is only rebuilt when the
    /// resulting cell counts change, so repeated calls with the same view
    /// are cheap.
    pub fn init(&mut self, width: f32, height: f32, left: f32, right: f32, bottom: f32, top: f32) {
        let nx = ((width / SCALE).ceil() as usize).max(1);
        let ny = ((height / SCALE).ceil() as usize).max(1);

        let rebuild = match &self.grid {
            Some(grid) => grid.dimensions() != (nx, ny),
            None => true,
        };
        if rebuild {
            self.grid = Some(SpatialGrid::new(nx, ny, width / SCALE, height / SCALE));
        }

        self.resize(left, right, bottom, top);
    }

    /// Updates the domain bounds, keeping a small interior margin.
    pub fn resize(&mut self, left: f32, right: f32, bottom: f32, top: f32) {
        self.bounds = DomainBounds {
            xmin: (left + BOUNDS_MARGIN) / SCALE,
            xmax: (right - BOUNDS_MARGIN) / SCALE,
            ymin: (bottom + BOUNDS_MARGIN) / SCALE,
            ymax: (top - BOUNDS_MARGIN) / SCALE,
        };
    }

    /// Drops particles, sources and sinks and disarms any pending forced
    /// velocity. Obstacles and the grid structure are kept.
    pub fn cleanup(&mut self) {
        self.particles.clear();
        self.sources.clear();
        self.sinks.clear();
        self.forced = None;
        if let Some(grid) = &mut self.grid {
            grid.reset();
        }
    }

    /// Drops particles but keeps sources, sinks and obstacles.
    pub fn clear_particles_only(&mut self) {
        self.particles.clear();
    }

    /// Replaces the population with exactly `count` particles placed
    /// uniformly in the domain. A no-op when the count already matches.
    pub fn set_num_particles(&mut self, count: usize) {
        if self.particles.len() == count {
            return;
        }

        let bounds = self.bounds;
        self.particles.clear();
        for _ in 0..count {
            let x = bounds.xmin + self.rng.f32() * (bounds.xmax - bounds.xmin);
            let y = bounds.ymin + self.rng.f32() * (bounds.ymax - bounds.ymin);
            self.particles
                .push(Particle::new(v2!(x, y), self.fluid.particle_mass));
        }
    }

    pub fn set_fluid_properties(&mut self, fluid: FluidProperties) {
        self.fluid = fluid;
    }

    pub fn fluid_properties(&self) -> FluidProperties {
        self.fluid
    }

    /// Tangential velocity scale applied on obstacle contact, in `[0, 1]`.
    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction.clamp(0.0, 1.0);
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Reseeds the random sequence used for placement and emission.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = fastrand::Rng::with_seed(seed);
    }

    pub fn bounds(&self) -> DomainBounds {
        self.bounds
    }

    pub fn grid_dimensions(&self) -> Option<(usize, usize)> {
        self.grid.as_ref().map(SpatialGrid::dimensions)
    }

    pub fn add_particle(&mut self, particle: Particle) {
        self.particles.push(particle);
    }

    pub fn get_particle_count(&self) -> usize {
        self.particles.len()
    }

    /// Particle position in screen units, `(0, 0)` for stale indexes.
    pub fn get_particle_position(&self, index: usize) -> Vector2 {
        match self.particles.get(index) {
            Some(particle) => v2!(
                particle.position.x * SCALE,
                (self.bounds.ymax - particle.position.y) * SCALE
            ),
            None => Vector2::zero(),
        }
    }

    /// Particle velocity in simulation units, zero for stale indexes.
    pub fn get_particle_velocity(&self, index: usize) -> Vector2 {
        self.particles
            .get(index)
            .map(|particle| particle.velocity)
            .unwrap_or_else(Vector2::zero)
    }

    /// Particle pressure, zero for stale indexes.
    pub fn get_particle_pressure(&self, index: usize) -> f32 {
        self.particles
            .get(index)
            .map(|particle| particle.pressure)
            .unwrap_or(0.0)
    }

    /// Schedules a one-shot velocity override for every particle in the grid
    /// cell under the screen position `(x, y)`.
    pub fn force_velocity(&mut self, x: f32, y: f32, dx: f32, dy: f32) {
        let Some(grid) = &self.grid else { return };

        let sim_x = x / SCALE;
        let sim_y = self.bounds.ymax - y / SCALE;
        if let Some(cell) = grid.cell_at(sim_x, sim_y) {
            self.forced = Some(ForcedVelocityRequest {
                cell,
                velocity: v2!(dx, -dy),
            });
        }
    }

    pub fn add_static_object(&mut self, obstacle: StaticObstacle) {
        self.obstacles.push(obstacle);
    }

    /// Removes the first obstacle equal to `obstacle`. Sources and sinks
    /// attached to it are dropped with it and attachments to later obstacles
    /// are reindexed. Returns whether anything was removed.
    pub fn remove_static_object(&mut self, obstacle: &StaticObstacle) -> bool {
        let Some(index) = self.obstacles.iter().position(|o| o == obstacle) else {
            return false;
        };
        self.obstacles.remove(index);

        let keeps = |attached: &Option<PlaneAttachment>| {
            attached.map_or(true, |attachment| attachment.obstacle != index)
        };
        self.sources.retain(|source| keeps(&source.attached));
        self.sinks.retain(|sink| keeps(&sink.attached));

        let reindex = |attached: &mut Option<PlaneAttachment>| {
            if let Some(attachment) = attached {
                if attachment.obstacle > index {
                    attachment.obstacle -= 1;
                }
            }
        };
        self.sources
            .iter_mut()
            .for_each(|source| reindex(&mut source.attached));
        self.sinks
            .iter_mut()
            .for_each(|sink| reindex(&mut sink.attached));

        true
    }

    /// Removes every obstacle along with all plane-attached sources and sinks.
    pub fn clear_static_objects(&mut self) {
        self.obstacles.clear();
        self.sources.retain(|source| source.attached.is_none());
        self.sinks.retain(|sink| sink.attached.is_none());
    }

    pub fn get_static_colliders(&self) -> &[StaticObstacle] {
        &self.obstacles
    }

    /// Adds a line source emitting along `direction`. Position and direction
    /// are in simulation units.
    pub fn add_particle_source(
        &mut self,
        position: Vector2,
        direction: Vector2,
        length: f32,
        rate: f32,
        velocity_magnitude: f32,
    ) {
        self.push_source(Source::line(
            position,
            direction,
            length,
            rate,
            velocity_magnitude,
        ));
    }

    /// Adds a point source spraying uniformly within `spawn_radius`.
    pub fn add_particle_point_source(
        &mut self,
        position: Vector2,
        spawn_radius: f32,
        rate: f32,
    ) {
        self.push_source(Source::point(position, spawn_radius, rate));
    }

    /// Adds a source sitting on one side of the rectangle obstacle at
    /// `obstacle`, emitting outwards.
    pub fn add_particle_source_from_plane(
        &mut self,
        obstacle: usize,
        side: PlaneSide,
        rate: f32,
        velocity_magnitude: f32,
    ) {
        self.push_source(Source::from_plane(
            PlaneAttachment { obstacle, side },
            rate,
            velocity_magnitude,
        ));
    }

    pub(crate) fn push_source(&mut self, mut source: Source) {
        source.last_emit_ms = self.clock.now_ms();
        self.sources.push(source);
    }

    pub fn get_particle_sources(&self) -> &[Source] {
        &self.sources
    }

    /// Adds a point sink draining particles within `range` of `position`.
    pub fn add_particle_sink(&mut self, position: Vector2, rate: f32, range: f32) {
        self.push_sink(Sink::point(position, rate, range));
    }

    /// Adds a sink draining along one side of the rectangle obstacle at
    /// `obstacle`.
    pub fn add_particle_sink_from_plane(
        &mut self,
        obstacle: usize,
        side: PlaneSide,
        rate: f32,
        range: f32,
    ) {
        self.push_sink(Sink::from_plane(PlaneAttachment { obstacle, side }, rate, range));
    }

    pub(crate) fn push_sink(&mut self, mut sink: Sink) {
        sink.last_drain_ms = self.clock.now_ms();
        self.sinks.push(sink);
    }

    pub fn get_particle_sinks(&self) -> &[Sink] {
        &self.sinks
    }

    /// Advances the simulation by one fixed tick. Does nothing before
    /// `init` has built the grid.
    pub fn do_physics(&mut self) {
        if self.grid.is_none() {
            return;
        }
        let now_ms = self.clock.now_ms();

        self.reset_grid();
        self.emit_from_sources(now_ms);
        self.drain_into_sinks(now_ms);
        self.bind_particles();
        self.calculate_densities();
        self.update_pressures();
        self.calculate_pair_forces();
        self.apply_forced_velocity();
        self.reset_grid();
        self.integrate_and_collide();
        self.bind_particles();
    }

    fn reset_grid(&mut self) {
        if let Some(grid) = &mut self.grid {
            grid.reset();
        }
    }

    fn bind_particles(&mut self) {
        let Some(grid) = &mut self.grid else { return };
        for (index, particle) in self.particles.iter().enumerate() {
            grid.bind(particle.position, index);
        }
    }

    fn emit_from_sources(&mut self, now_ms: f64) {
        let Simulation {
            particles,
            sources,
            obstacles,
            bounds,
            fluid,
            rng,
            ..
        } = self;

        for source in sources.iter_mut() {
            if particles.len() >= SIM_MAX_PARTICLES || !source.due(now_ms) {
                continue;
            }
            let Some(geometry) = source.emission_geometry(obstacles) else {
                continue;
            };

            // Rate counts attempts: the timestamp advances even when the
            // sampled position falls outside the domain.
            source.last_emit_ms = now_ms;
            let (position, velocity) = source.sample_emission(&geometry, rng);
            if bounds.contains(position) {
                particles.push(Particle::new_with_velocity(
                    position,
                    velocity,
                    fluid.particle_mass,
                ));
            }
        }
    }

    fn drain_into_sinks(&mut self, now_ms: f64) {
        let Simulation {
            particles,
            sinks,
            obstacles,
            ..
        } = self;

        for sink in sinks.iter_mut() {
            if !sink.due(now_ms) {
                continue;
            }
            let Some(geometry) = sink.drain_geometry(obstacles) else {
                continue;
            };

            // At most one particle per sink per interval; the timestamp only
            // advances when something was actually removed.
            let eligible = particles
                .iter()
                .position(|particle| geometry.contains(particle.position));
            if let Some(index) = eligible {
                particles.swap_remove(index);
                sink.last_drain_ms = now_ms;
            }
        }
    }

    fn calculate_densities(&mut self) {
        let Some(grid) = &self.grid else { return };
        let particles = &mut self.particles;

        grid.pairwise(|first, second| {
            let (a, b) = index_pair_mut(particles, first, second);
            let dist_squared = (a.position - b.position).length_squared();
            if dist_squared < kernels::H2 {
                let weight = kernels::poly6(dist_squared);
                a.density += b.mass() * weight;
                b.density += a.mass() * weight;
            }
        });
    }

    fn update_pressures(&mut self) {
        let gas_constant = self.fluid.gas_constant;
        let rest_density = self.fluid.rest_density;

        self.particles.par_iter_mut().for_each(|particle| {
            particle.pressure = (gas_constant * (particle.density - rest_density)).max(0.0);
        });
    }

    fn calculate_pair_forces(&mut self) {
        let Some(grid) = &self.grid else { return };
        let viscosity = self.fluid.viscosity;
        let particles = &mut self.particles;

        grid.pairwise(|first, second| {
            let (a, b) = index_pair_mut(particles, first, second);
            let delta = a.position - b.position;
            let dist_squared = delta.length_squared();
            if dist_squared >= kernels::H2 {
                return;
            }

            let dist = dist_squared.sqrt() + DIST_EPS;
            // Only the neighbor's density appears here; kept as-is from the
            // reference model.
            let pressure_term = b.mass() * (a.pressure + b.pressure) / (2.0 * b.density)
                * kernels::spiky_grad2(dist);
            let viscous_term = viscosity * b.mass() * kernels::visc_laplacian(dist) / b.density;

            let force = delta * pressure_term + (b.velocity - a.velocity) * viscous_term;
            a.add_force(force);
            b.add_force(-force);
        });
    }

    fn apply_forced_velocity(&mut self) {
        let Some(request) = self.forced.take() else { return };
        let Some(grid) = &self.grid else { return };

        for &index in grid.cell_indexes(request.cell) {
            if let Some(particle) = self.particles.get_mut(index) {
                particle.velocity = request.velocity;
                particle.force = Vector2::zero();
            }
        }
    }

    fn integrate_and_collide(&mut self) {
        let bounds = self.bounds;
        let friction = self.friction;
        let obstacles = &self.obstacles;

        self.particles.par_iter_mut().for_each(|particle| {
            particle.apply_accumulated_force(DT);
            particle.move_by_velocity(DT);

            resolve_obstacle_collisions(particle, obstacles, friction);

            // Boundary repulsion feeds the next tick's force pass, so it is
            // computed from this tick's pressure and density after the
            // accumulators were cleared.
            let (pressure, density) = (particle.pressure, particle.density);
            particle.reset_for_next_step();
            resolve_boundary(particle, bounds, pressure, density);
        });
    }
}

/// Pushes a penetrating particle back to the obstacle surface and removes
/// the inward part of its velocity. The outward normal comes from a
/// finite-difference gradient of the signed distance.
fn resolve_obstacle_collisions(
    particle: &mut Particle,
    obstacles: &[StaticObstacle],
    friction: f32,
) {
    for obstacle in obstacles {
        let distance = obstacle.distance_to(particle.position);
        if distance >= 0.0 {
            continue;
        }

        let position = particle.position;
        let gradient = v2!(
            (obstacle.distance_to(v2!(position.x + NORMAL_STEP, position.y)) - distance)
                / NORMAL_STEP,
            (obstacle.distance_to(v2!(position.x, position.y + NORMAL_STEP)) - distance)
                / NORMAL_STEP
        );
        let normal = gradient / (gradient.length() + NORMAL_STEP);

        particle.position += normal * (-distance + SURFACE_MARGIN);

        let normal_speed = particle.velocity.dot(normal);
        if normal_speed < 0.0 {
            let tangential = particle.velocity - normal * normal_speed;
            particle.velocity = tangential * friction;
        }
    }
}

/// Keeps a particle inside the domain. Within one kernel radius of a side a
/// repulsive force pushes it inwards; at or past the side the offending
/// velocity component is reflected and the position clamped back in.
fn resolve_boundary(particle: &mut Particle, bounds: DomainBounds, pressure: f32, density: f32) {
    let mass = particle.mass();
    let repulsion = move |distance: f32| {
        (mass * pressure / density * kernels::spiky_grad2(distance) * distance).abs()
    };

    let left = particle.position.x - bounds.xmin;
    if left <= 0.0 {
        particle.velocity.reflect_x();
        particle.position.x = bounds.xmin + SURFACE_MARGIN;
    } else if left < kernels::H {
        let magnitude = repulsion(left);
        particle.add_force(v2!(magnitude, 0.0));
    }

    let right = bounds.xmax - particle.position.x;
    if right <= 0.0 {
        particle.velocity.reflect_x();
        particle.position.x = bounds.xmax - SURFACE_MARGIN;
    } else if right < kernels::H {
        let magnitude = repulsion(right);
        particle.add_force(v2!(-magnitude, 0.0));
    }

    let bottom = particle.position.y - bounds.ymin;
    if bottom <= 0.0 {
        particle.velocity.reflect_y();
        particle.position.y = bounds.ymin + SURFACE_MARGIN;
    } else if bottom < kernels::H {
        let magnitude = repulsion(bottom);
        particle.add_force(v2!(0.0, magnitude));
    }

    let top = bounds.ymax - particle.position.y;
    if top <= 0.0 {
        particle.velocity.reflect_y();
        particle.position.y = bounds.ymax - SURFACE_MARGIN;
    } else if top < kernels::H {
        let magnitude = repulsion(top);
        particle.add_force(v2!(0.0, -magnitude));
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::physics::sph::kernels::poly6;
    use crate::physics::sph::particle::V_MAX;
    use crate::utility::{Color, ManualClock};

    fn test_sim() -> (Rc<ManualClock>, Simulation) {
        let clock = ManualClock::starting_at(0.0);
        let mut sim = Simulation::with_clock(Box::new(clock.clone()));
        sim.set_seed(1);
        (clock, sim)
    }

    /// 10x10 cell grid over a roughly [0, 10]^2 domain.
    fn init_small(sim: &mut Simulation) {
        sim.init(300.0, 300.0, 0.0, 300.0, 0.0, 300.0);
    }

    /// 20x20 cell grid over a roughly [0, 20]^2 domain.
    fn init_large(sim: &mut Simulation) {
        sim.init(600.0, 600.0, 0.0, 600.0, 0.0, 600.0);
    }

    fn tick(clock: &ManualClock, sim: &mut Simulation) {
        clock.advance(15.0);
        sim.do_physics();
    }

    #[test]
    fn single_pair_density() {
        let (_, mut sim) = test_sim();
        init_small(&mut sim);
        sim.add_particle(Particle::new(v2!(0.5, 0.5), 1.0));
        sim.add_particle(Particle::new(v2!(0.7, 0.5), 1.0));

        sim.bind_particles();
        sim.calculate_densities();

        let expected = poly6(0.0) + poly6(0.04);
        assert!((sim.particles[0].density - expected).abs() < 1e-4);
        assert!((sim.particles[1].density - expected).abs() < 1e-4);
    }

    #[test]
    fn pressure_never_drops_below_zero() {
        let (_, mut sim) = test_sim();
        init_small(&mut sim);
        // A lone particle sits below rest density
        sim.add_particle(Particle::new(v2!(5.0, 5.0), 1.0));

        sim.bind_particles();
        sim.calculate_densities();
        sim.update_pressures();

        assert_eq!(sim.particles[0].pressure, 0.0);
    }

    #[test]
    fn pair_forces_conserve_momentum() {
        let (_, mut sim) = test_sim();
        init_small(&mut sim);
        sim.set_fluid_properties(FluidProperties {
            rest_density: 1.0,
            ..FluidProperties::default()
        });
        for position in [
            v2!(5.0, 5.0),
            v2!(5.3, 5.1),
            v2!(4.8, 5.2),
            v2!(5.1, 4.7),
            v2!(4.9, 4.9),
        ] {
            sim.add_particle(Particle::new_with_velocity(position, v2!(0.3, -0.2), 1.0));
        }

        sim.bind_particles();
        sim.calculate_densities();
        sim.update_pressures();
        sim.calculate_pair_forces();

        let total: Vector2 = sim
            .particles
            .iter()
            .fold(Vector2::zero(), |acc, p| acc + p.force);
        assert!(total.length() < 1e-3, "total force = {total:?}");
    }

    #[test]
    fn circle_obstacle_ejects_contained_particle() {
        let (clock, mut sim) = test_sim();
        init_small(&mut sim);
        sim.add_static_object(StaticObstacle::circle(v2!(5.0, 5.0), 1.0, Color::rgb(0, 0, 0)));
        sim.add_particle(Particle::new(v2!(5.0, 5.0), 1.0));

        tick(&clock, &mut sim);

        let particle = &sim.particles[0];
        let offset = (particle.position - v2!(5.0, 5.0)).length();
        assert!((offset - 1.01).abs() < 1e-2, "offset = {offset}");
        assert!(particle.velocity.length() < 1e-6);
    }

    #[test]
    fn collision_is_noop_outside_the_surface() {
        let obstacles = [StaticObstacle::circle(
            v2!(5.0, 5.0),
            1.0,
            Color::rgb(0, 0, 0),
        )];
        let mut particle = Particle::new_with_velocity(v2!(6.02, 5.0), v2!(-1.0, 0.0), 1.0);

        resolve_obstacle_collisions(&mut particle, &obstacles, 0.5);

        assert_eq!(particle.position, v2!(6.02, 5.0));
        assert_eq!(particle.velocity, v2!(-1.0, 0.0));
    }

    #[test]
    fn boundary_band_pushes_inwards() {
        let bounds = DomainBounds {
            xmin: 0.0,
            xmax: 10.0,
            ymin: 0.0,
            ymax: 10.0,
        };
        let mut particle = Particle::new(v2!(0.5, 5.0), 1.0);
        let density = particle.density;

        resolve_boundary(&mut particle, bounds, 10.0, density);

        assert!(particle.force.x > 0.0);
        assert_eq!(particle.force.y, 0.0);
    }

    #[test]
    fn escaped_particle_is_clamped_back() {
        let (clock, mut sim) = test_sim();
        init_small(&mut sim);
        let xmax = sim.bounds().xmax;
        sim.add_particle(Particle::new_with_velocity(v2!(xmax + 1.0, 5.0), v2!(2.0, 0.0), 1.0));

        tick(&clock, &mut sim);

        let particle = &sim.particles[0];
        assert!((particle.position.x - (xmax - 0.01)).abs() < 1e-5);
        assert!(particle.velocity.x < 0.0, "velocity should be reflected");
        assert!(sim.bounds().contains(particle.position));
    }

    #[test]
    fn line_source_emits_at_the_configured_rate() {
        let (clock, mut sim) = test_sim();
        init_large(&mut sim);
        sim.add_particle_source(v2!(1.0, 5.0), v2!(1.0, 0.0), 0.0, 1000.0, 2.0);

        for _ in 0..10 {
            tick(&clock, &mut sim);
        }

        let count = sim.get_particle_count();
        assert!((8..=12).contains(&count), "count = {count}");
    }

    #[test]
    fn rejected_emission_still_counts_as_an_attempt() {
        let (clock, mut sim) = test_sim();
        init_small(&mut sim);
        // Spawns land outside the domain and are rejected
        sim.add_particle_source(v2!(-5.0, 5.0), v2!(1.0, 0.0), 0.0, 1000.0, 1.0);

        for _ in 0..3 {
            tick(&clock, &mut sim);
        }

        assert_eq!(sim.get_particle_count(), 0);
        assert_eq!(sim.sources[0].last_emit_ms, 45.0);
    }

    #[test]
    fn source_with_rate_zero_never_emits() {
        let (clock, mut sim) = test_sim();
        init_small(&mut sim);
        sim.add_particle_source(v2!(5.0, 5.0), v2!(1.0, 0.0), 0.0, 0.0, 1.0);

        for _ in 0..5 {
            tick(&clock, &mut sim);
        }

        assert_eq!(sim.get_particle_count(), 0);
    }

    #[test]
    fn sink_drains_at_most_one_particle_per_interval() {
        let (clock, mut sim) = test_sim();
        init_large(&mut sim);
        sim.add_particle_sink(v2!(10.0, 10.0), 1000.0, 5.0);
        // 500 particles, all within range of the sink
        for _ in 0..500 {
            let x = 7.5 + sim.rng.f32() * 5.0;
            let y = 7.5 + sim.rng.f32() * 5.0;
            sim.add_particle(Particle::new(v2!(x, y), 1.0));
        }

        tick(&clock, &mut sim);
        assert_eq!(sim.get_particle_count(), 499);

        tick(&clock, &mut sim);
        assert_eq!(sim.get_particle_count(), 498);
    }

    #[test]
    fn forced_velocity_applies_once() {
        let (clock, mut sim) = test_sim();
        init_small(&mut sim);
        sim.set_fluid_properties(FluidProperties {
            gas_constant: 30.0,
            rest_density: 1.0,
            ..FluidProperties::default()
        });
        for position in [v2!(5.2, 5.3), v2!(5.5, 5.5), v2!(5.8, 5.6)] {
            sim.add_particle(Particle::new(position, 1.0));
        }

        let ymax = sim.bounds().ymax;
        sim.force_velocity(5.0 * SCALE, (ymax - 5.0) * SCALE, 3.0, 0.0);
        tick(&clock, &mut sim);

        for index in 0..3 {
            let velocity = sim.get_particle_velocity(index);
            assert!(
                (velocity - v2!(3.0, 0.0)).length() < 1e-6,
                "velocity = {velocity:?}"
            );
        }

        // No new request: pressure takes over again
        tick(&clock, &mut sim);
        let free = (0..3).any(|index| {
            (sim.get_particle_velocity(index) - v2!(3.0, 0.0)).length() > 1e-6
        });
        assert!(free, "velocities should evolve freely after the one-shot");
    }

    #[test]
    fn do_physics_before_init_is_a_noop() {
        let (clock, mut sim) = test_sim();

        tick(&clock, &mut sim);

        assert_eq!(sim.get_particle_count(), 0);
        assert_eq!(sim.grid_dimensions(), None);
    }

    #[test]
    fn stale_queries_return_safe_defaults() {
        let (_, mut sim) = test_sim();
        init_small(&mut sim);
        sim.add_particle(Particle::new(v2!(5.0, 5.0), 1.0));

        assert_eq!(sim.get_particle_position(7), Vector2::zero());
        assert_eq!(sim.get_particle_velocity(7), Vector2::zero());
        assert_eq!(sim.get_particle_pressure(7), 0.0);
    }

    #[test]
    fn particle_positions_are_reported_in_screen_units() {
        let (_, mut sim) = test_sim();
        init_small(&mut sim);
        sim.add_particle(Particle::new(v2!(2.0, 3.0), 1.0));

        let position = sim.get_particle_position(0);
        let ymax = sim.bounds().ymax;

        assert!((position.x - 60.0).abs() < 1e-3);
        assert!((position.y - (ymax - 3.0) * SCALE).abs() < 1e-3);
    }

    #[test]
    fn invariants_hold_after_many_ticks() {
        let (clock, mut sim) = test_sim();
        init_small(&mut sim);
        let obstacle = StaticObstacle::circle(v2!(5.0, 5.0), 1.0, Color::rgb(40, 40, 40));
        sim.add_static_object(obstacle.clone());
        sim.set_num_particles(200);
        sim.add_particle_source(v2!(1.0, 8.0), v2!(1.0, 0.0), 1.0, 200.0, 2.0);
        sim.add_particle_sink(v2!(9.0, 2.0), 200.0, 1.0);

        for _ in 0..20 {
            tick(&clock, &mut sim);
        }

        let bounds = sim.bounds();
        let base_density = sim.fluid_properties().particle_mass * poly6(0.0);
        for particle in &sim.particles {
            assert!(bounds.contains(particle.position), "{:?}", particle.position);
            assert!(particle.velocity.length() <= V_MAX + 1e-3);
            assert!(particle.density >= base_density - 1e-4);
            assert!(particle.pressure >= 0.0);
            assert!(obstacle.distance_to(particle.position) >= -0.011);
        }
    }

    #[test]
    fn population_cap_stops_emission() {
        let (clock, mut sim) = test_sim();
        init_small(&mut sim);
        sim.set_num_particles(SIM_MAX_PARTICLES);
        sim.add_particle_source(v2!(5.0, 5.0), v2!(1.0, 0.0), 0.0, 1000.0, 1.0);

        tick(&clock, &mut sim);

        assert_eq!(sim.get_particle_count(), SIM_MAX_PARTICLES);
    }

    #[test]
    fn set_num_particles_is_exact_and_idempotent() {
        let (_, mut sim) = test_sim();
        init_small(&mut sim);

        sim.set_num_particles(50);
        assert_eq!(sim.get_particle_count(), 50);
        let bounds = sim.bounds();
        for particle in &sim.particles {
            assert!(bounds.contains(particle.position));
        }

        let before: Vec<_> = sim.particles.iter().map(|p| p.position).collect();
        sim.set_num_particles(50);
        let after: Vec<_> = sim.particles.iter().map(|p| p.position).collect();
        assert_eq!(before, after, "same count should not reshuffle");

        sim.set_num_particles(20);
        assert_eq!(sim.get_particle_count(), 20);
    }

    #[test]
    fn removing_an_obstacle_drops_and_reindexes_attachments() {
        let (_, mut sim) = test_sim();
        init_small(&mut sim);
        let first = StaticObstacle::rectangle(v2!(1.0, 1.0), v2!(2.0, 2.0), Color::rgb(0, 0, 0));
        let second = StaticObstacle::rectangle(v2!(6.0, 6.0), v2!(2.0, 2.0), Color::rgb(9, 9, 9));
        sim.add_static_object(first.clone());
        sim.add_static_object(second.clone());
        sim.add_particle_source_from_plane(0, PlaneSide::Top, 10.0, 1.0);
        sim.add_particle_source_from_plane(1, PlaneSide::Left, 10.0, 1.0);
        sim.add_particle_source(v2!(5.0, 5.0), v2!(1.0, 0.0), 0.0, 10.0, 1.0);
        sim.add_particle_sink_from_plane(1, PlaneSide::Right, 10.0, 1.0);

        assert!(sim.remove_static_object(&first));
        assert!(!sim.remove_static_object(&first));

        assert_eq!(sim.get_static_colliders().len(), 1);
        assert_eq!(sim.get_static_colliders()[0], second);
        assert_eq!(sim.get_particle_sources().len(), 2);
        assert_eq!(sim.get_particle_sources()[0].attached.unwrap().obstacle, 0);
        assert!(sim.get_particle_sources()[1].attached.is_none());
        assert_eq!(sim.get_particle_sinks()[0].attached.unwrap().obstacle, 0);

        sim.clear_static_objects();
        assert!(sim.get_static_colliders().is_empty());
        assert_eq!(sim.get_particle_sources().len(), 1);
        assert!(sim.get_particle_sinks().is_empty());
    }

    #[test]
    fn cleanup_keeps_grid_and_obstacles() {
        let (_, mut sim) = test_sim();
        init_small(&mut sim);
        sim.add_static_object(StaticObstacle::circle(v2!(5.0, 5.0), 1.0, Color::rgb(0, 0, 0)));
        sim.set_num_particles(10);
        sim.add_particle_source(v2!(1.0, 1.0), v2!(1.0, 0.0), 0.0, 10.0, 1.0);
        sim.add_particle_sink(v2!(9.0, 9.0), 10.0, 1.0);
        sim.force_velocity(150.0, 150.0, 1.0, 0.0);

        sim.cleanup();

        assert_eq!(sim.get_particle_count(), 0);
        assert!(sim.get_particle_sources().is_empty());
        assert!(sim.get_particle_sinks().is_empty());
        assert_eq!(sim.get_static_colliders().len(), 1);
        assert_eq!(sim.grid_dimensions(), Some((10, 10)));
        assert!(sim.forced.is_none());

        sim.set_num_particles(10);
        sim.clear_particles_only();
        assert_eq!(sim.get_particle_count(), 0);
        assert_eq!(sim.get_static_colliders().len(), 1);
    }

    #[test]
    fn init_rebuilds_the_grid_only_on_dimension_change() {
        let (_, mut sim) = test_sim();
        init_small(&mut sim);
        assert_eq!(sim.grid_dimensions(), Some((10, 10)));

        // Same view, tighter bounds: grid untouched, bounds updated
        sim.init(300.0, 300.0, 30.0, 270.0, 30.0, 270.0);
        assert_eq!(sim.grid_dimensions(), Some((10, 10)));
        assert!((sim.bounds().xmin - 35.0 / SCALE).abs() < 1e-6);

        sim.init(600.0, 300.0, 0.0, 600.0, 0.0, 300.0);
        assert_eq!(sim.grid_dimensions(), Some((20, 10)));
    }
}
