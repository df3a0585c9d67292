use serde_derive::{Deserialize, Serialize};

use crate::math::Vector2;
use crate::physics::sph::{PlaneAttachment, Sink, Source, SourceShape};

use super::SerializationForm;

#[derive(Serialize, Deserialize)]
pub struct SourceSerializedForm {
    pub position: Vector2,
    pub shape: SourceShape,
    pub rate: f32,
    pub velocity_magnitude: f32,
    pub attached: Option<PlaneAttachment>,
}

impl SerializationForm for Source {
    type Original = Source;

    type SerializedForm = SourceSerializedForm;

    fn to_serialized_form(&self) -> Self::SerializedForm {
        SourceSerializedForm {
            position: self.position,
            shape: self.shape,
            rate: self.rate,
            velocity_magnitude: self.velocity_magnitude,
            attached: self.attached,
        }
    }

    fn from_serialized_form(serialized_form: Self::SerializedForm) -> Self::Original {
        let SourceSerializedForm {
            position,
            shape,
            rate,
            velocity_magnitude,
            attached,
        } = serialized_form;

        let mut source = match (attached, shape) {
            (Some(attachment), _) => Source::from_plane(attachment, rate, velocity_magnitude),
            (None, SourceShape::Point { spawn_radius }) => {
                Source::point(position, spawn_radius, rate)
            }
            (None, SourceShape::Line { direction, length }) => {
                Source::line(position, direction, length, rate, velocity_magnitude)
            }
        };
        source.velocity_magnitude = velocity_magnitude;

        source
    }
}

#[derive(Serialize, Deserialize)]
pub struct SinkSerializedForm {
    pub position: Vector2,
    pub rate: f32,
    pub range: f32,
    pub attached: Option<PlaneAttachment>,
}

impl SerializationForm for Sink {
    type Original = Sink;

    type SerializedForm = SinkSerializedForm;

    fn to_serialized_form(&self) -> Self::SerializedForm {
        SinkSerializedForm {
            position: self.position,
            rate: self.rate,
            range: self.range,
            attached: self.attached,
        }
    }

    fn from_serialized_form(serialized_form: Self::SerializedForm) -> Self::Original {
        let SinkSerializedForm {
            position,
            rate,
            range,
            attached,
        } = serialized_form;

        match attached {
            Some(attachment) => Sink::from_plane(attachment, rate, range),
            None => Sink::point(position, rate, range),
        }
    }
}
