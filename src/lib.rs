//! A 2D smoothed particle hydrodynamics engine for "crowd hydrodynamics":
//! weakly compressible flow around user-placed obstacles, fed by spawn
//! regions and emptied by drains, built for interactive visualization.
//!
//! The crate only simulates. Rendering, UI and viewport plumbing live on the
//! other side of the [`Simulation`] API, which samples particle state each
//! frame in screen units while the engine works in simulation units
//! (multiples of the kernel support radius, `SCALE` screen units each):
//!
//! ```text
//!    screen (0, 0) --------- (width, 0)
//!      |                        |
//!      |       y flipped        |
//!      |                        |
//!    (0, height) --- (width, height)
//! ```

mod math;
mod physics;
mod serialization;
mod utility;

pub use math::Vector2;
pub use physics::obstacle::{PlaneSide, SideGeometry, StaticObstacle};
pub use physics::sph::{
    poly6, spiky_grad2, visc_laplacian, DomainBounds, FluidProperties, Particle, PlaneAttachment,
    Simulation, Sink, Source, SourceShape, SpatialGrid, CELL_MAX_PARTICLES, DT, H, H2, SCALE,
    SIM_MAX_PARTICLES, V_MAX,
};
pub use serialization::{
    load, save, ScenarioSerializedForm, SerializationForm, SinkSerializedForm,
    SourceSerializedForm,
};
pub use utility::{Clock, Color, ManualClock, SystemClock};
