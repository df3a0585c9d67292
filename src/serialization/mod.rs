mod sph;

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use crate::physics::obstacle::StaticObstacle;
use crate::physics::sph::{FluidProperties, Simulation, Sink, Source, BOUNDS_MARGIN, SCALE};

pub use sph::{SinkSerializedForm, SourceSerializedForm};

pub trait SerializationForm {
    type Original;
    type SerializedForm;

    fn to_serialized_form(&self) -> Self::SerializedForm;

    fn from_serialized_form(serialized_form: Self::SerializedForm) -> Self::Original;
}

/// A saved scene: domain, fluid parameters, obstacles, emitters and drains.
/// Particles are transient and not part of it - sources grow the population
/// back after loading.
#[derive(Serialize, Deserialize)]
pub struct ScenarioSerializedForm {
    pub width: f32,
    pub height: f32,
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub fluid: FluidProperties,
    pub friction: f32,
    pub obstacles: Vec<StaticObstacle>,
    pub sources: Vec<SourceSerializedForm>,
    pub sinks: Vec<SinkSerializedForm>,
}

impl SerializationForm for Simulation {
    type Original = Simulation;

    type SerializedForm = ScenarioSerializedForm;

    fn to_serialized_form(&self) -> Self::SerializedForm {
        let (nx, ny) = self.grid_dimensions().unwrap_or((0, 0));
        let bounds = self.bounds();

        let sources = self
            .get_particle_sources()
            .iter()
            .map(|source| source.to_serialized_form())
            .collect();
        let sinks = self
            .get_particle_sinks()
            .iter()
            .map(|sink| sink.to_serialized_form())
            .collect();

        ScenarioSerializedForm {
            width: nx as f32 * SCALE,
            height: ny as f32 * SCALE,
            left: bounds.xmin * SCALE - BOUNDS_MARGIN,
            right: bounds.xmax * SCALE + BOUNDS_MARGIN,
            bottom: bounds.ymin * SCALE - BOUNDS_MARGIN,
            top: bounds.ymax * SCALE + BOUNDS_MARGIN,
            fluid: self.fluid_properties(),
            friction: self.friction(),
            obstacles: self.get_static_colliders().to_vec(),
            sources,
            sinks,
        }
    }

    fn from_serialized_form(serialized_form: Self::SerializedForm) -> Self::Original {
        let ScenarioSerializedForm {
            width,
            height,
            left,
            right,
            bottom,
            top,
            fluid,
            friction,
            obstacles,
            sources,
            sinks,
        } = serialized_form;

        let mut sim = Simulation::new();
        if width > 0.0 && height > 0.0 {
            sim.init(width, height, left, right, bottom, top);
        }
        sim.set_fluid_properties(fluid);
        sim.set_friction(friction);
        for obstacle in obstacles {
            sim.add_static_object(obstacle);
        }
        for source in sources {
            sim.push_source(Source::from_serialized_form(source));
        }
        for sink in sinks {
            sim.push_sink(Sink::from_serialized_form(sink));
        }

        sim
    }
}

/// Writes a scenario as pretty JSON.
pub fn save(scenario: &ScenarioSerializedForm, path: &Path) -> io::Result<()> {
    let json = serde_json::to_string_pretty(scenario)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())
}

/// Reads a scenario back from a JSON file.
pub fn load(path: &Path) -> io::Result<ScenarioSerializedForm> {
    let mut json = String::new();
    File::open(path)?.read_to_string(&mut json)?;

    serde_json::from_str(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
