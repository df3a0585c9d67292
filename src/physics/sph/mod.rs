mod grid;
mod kernels;
mod particle;
mod simulation;
mod sink;
mod source;

use serde_derive::{Deserialize, Serialize};

use crate::physics::obstacle::PlaneSide;

pub use grid::{SpatialGrid, CELL_MAX_PARTICLES};
pub use kernels::{poly6, spiky_grad2, visc_laplacian, H, H2};
pub use particle::{Particle, V_MAX};
pub use simulation::{DomainBounds, Simulation, DT, SCALE, SIM_MAX_PARTICLES};
pub(crate) use simulation::BOUNDS_MARGIN;
pub use sink::Sink;
pub use source::{Source, SourceShape};

/// Ties a source or a sink to one side of a rectangle obstacle. The relation
/// is an index into the simulation's obstacle sequence, not ownership - when
/// the obstacle goes away, everything attached to it goes away too.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneAttachment {
    pub obstacle: usize,
    pub side: PlaneSide,
}

/// Bulk parameters of the simulated fluid.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FluidProperties {
    /// Mass given to newly created particles.
    pub particle_mass: f32,
    /// Stiffness of the state equation `P = max(0, K * (density - rest))`.
    pub gas_constant: f32,
    /// Density at which pressure vanishes.
    pub rest_density: f32,
    /// Strength of the pairwise velocity damping.
    pub viscosity: f32,
}

impl Default for FluidProperties {
    fn default() -> Self {
        FluidProperties {
            particle_mass: 1.0,
            gas_constant: 20.0,
            rest_density: 2.0,
            viscosity: 2.5,
        }
    }
}
