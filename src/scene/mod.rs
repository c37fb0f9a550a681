//! Scene graph storage, viewpoints, picking helpers and painting

pub mod arena;
pub mod node;
pub mod paint;
pub mod spatial;
pub mod viewpoint;

pub use arena::{Generation, Layer, NodeHandle, ResourceArena};
pub use node::{hex, NodeAction, NodeMeta, SceneNode, Shape};
pub use spatial::{SpatialIndex, SpatialNode};
pub use viewpoint::{PlanarView, Projected, Projection, Ray, Viewpoint};
