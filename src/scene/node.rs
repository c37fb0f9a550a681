//! Scene nodes
//!
//! A node is a shape with a local transform, an optional parent and optional
//! hover metadata. Nodes never own GPU objects; the painter turns them into
//! egui shapes every frame.

use egui::Color32;
use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};

use super::arena::NodeHandle;

/// `0xRRGGBB` to an opaque colour
pub const fn hex(rgb: u32) -> Color32 {
    Color32::from_rgb((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Transform-only parent
    Group,
    Sphere { radius: f32 },
    Cuboid { size: f32 },
    Cone { radius: f32, height: f32 },
    Octahedron { radius: f32 },
    Ring { radius: f32 },
    /// Polyline in local space
    Path { points: Vec<Vec3>, width: f32 },
    /// Filled planar rectangle centred on the node
    Rect { size: Vec2 },
    /// Stroked planar rectangle centred on the node
    Frame { size: Vec2 },
    Label { text: String, size: f32 },
}

impl Shape {
    /// Bounding radius used for picking, in local units
    pub fn pick_radius(&self) -> f32 {
        match self {
            Shape::Group | Shape::Path { .. } | Shape::Label { .. } => 0.0,
            Shape::Sphere { radius } | Shape::Octahedron { radius } | Shape::Ring { radius } => {
                *radius
            }
            Shape::Cuboid { size } => size * 0.5 * 3f32.sqrt(),
            Shape::Cone { radius, height } => radius.max(height * 0.5),
            Shape::Rect { size } | Shape::Frame { size } => size.length() * 0.5,
        }
    }
}

/// What kind of thing a node represents, for tooltips
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMeta {
    pub title: String,
    pub lines: Vec<String>,
    pub action: Option<NodeAction>,
}

impl NodeMeta {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn action(mut self, action: NodeAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Click behaviour attached to a pickable node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAction {
    SelectProcess(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub parent: Option<NodeHandle>,
    pub shape: Shape,
    pub position: Vec3,
    /// Euler angles (XYZ, radians)
    pub rotation: Vec3,
    pub scale: f32,
    pub color: Color32,
    pub opacity: f32,
    pub visible: bool,
    pub pickable: bool,
    pub highlighted: bool,
    pub meta: Option<NodeMeta>,
}

impl SceneNode {
    pub fn new(shape: Shape) -> Self {
        Self {
            parent: None,
            shape,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: 1.0,
            color: Color32::WHITE,
            opacity: 1.0,
            visible: true,
            pickable: false,
            highlighted: false,
            meta: None,
        }
    }

    pub fn group() -> Self {
        Self::new(Shape::Group)
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn at_xy(self, x: f32, y: f32) -> Self {
        self.at(Vec3::new(x, y, 0.0))
    }

    pub fn child_of(mut self, parent: NodeHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn color(mut self, rgb: u32) -> Self {
        self.color = hex(rgb);
        self
    }

    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn rotated(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Pickable and carrying tooltip metadata
    pub fn with_meta(mut self, meta: NodeMeta) -> Self {
        self.meta = Some(meta);
        self.pickable = true;
        self
    }

    pub fn pickable(mut self) -> Self {
        self.pickable = true;
        self
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z),
            self.position,
        )
    }

    /// Colour with opacity applied
    pub fn fill(&self) -> Color32 {
        self.color.gamma_multiply(self.opacity)
    }
}
