mod vector2;

pub(crate) use vector2::v2;
pub use vector2::Vector2;
