//! Painting a generation's nodes with egui
//!
//! Nodes are resolved to world space, projected, sorted back to front and
//! drawn as flat egui shapes.

use egui::{Align2, Color32, FontId, Painter, Pos2, Rect, Stroke};
use glam::{Mat4, Vec2, Vec3};

use super::arena::{Generation, NodeHandle, ResourceArena};
use super::node::{SceneNode, Shape};
use super::viewpoint::Projection;

const HIGHLIGHT: Color32 = Color32::from_rgb(0xdd, 0xe2, 0xea);

struct Placed<'a> {
    node: &'a SceneNode,
    world: Mat4,
    center: Pos2,
    depth: f32,
    /// Pixels per local unit, including the node's world scale
    unit: f32,
}

fn world_scale(world: &Mat4) -> f32 {
    world.x_axis.truncate().length()
}

fn place<'a>(
    arena: &'a ResourceArena,
    handle: NodeHandle,
    node: &'a SceneNode,
    projection: &Projection,
    viewport: Rect,
) -> Option<Placed<'a>> {
    if !arena.is_visible(handle) {
        return None;
    }
    let world = arena.world_matrix(handle)?;
    let origin = world.transform_point3(Vec3::ZERO);
    let scale = world_scale(&world);
    match projection {
        Projection::Perspective(vp) => {
            let p = vp.project(origin, viewport)?;
            Some(Placed {
                node,
                world,
                center: p.pos,
                depth: p.depth,
                unit: p.pixels_per_unit * scale,
            })
        }
        Projection::Planar(view) => Some(Placed {
            node,
            world,
            center: view.world_to_screen(origin.truncate(), viewport),
            depth: -origin.z,
            unit: view.scale(viewport) * scale,
        }),
    }
}

fn path_points(
    placed: &Placed<'_>,
    points: &[Vec3],
    projection: &Projection,
    viewport: Rect,
) -> Vec<Pos2> {
    points
        .iter()
        .filter_map(|p| {
            let world = placed.world.transform_point3(*p);
            match projection {
                Projection::Perspective(vp) => vp.project(world, viewport).map(|pr| pr.pos),
                Projection::Planar(view) => Some(view.world_to_screen(world.truncate(), viewport)),
            }
        })
        .collect()
}

fn draw(painter: &Painter, placed: &Placed<'_>, projection: &Projection, viewport: Rect) {
    let node = placed.node;
    let fill = node.fill();
    let c = placed.center;
    let u = placed.unit;

    match &node.shape {
        Shape::Group => {}
        Shape::Sphere { radius } => {
            painter.circle_filled(c, (radius * u).max(1.0), fill);
        }
        Shape::Cuboid { size } => {
            let rect = Rect::from_center_size(c, egui::vec2(size * u, size * u));
            painter.rect_filled(rect, 0.0, fill);
        }
        Shape::Cone { radius, height } => {
            let h = height * u * 0.5;
            let r = radius * u;
            let points = vec![
                Pos2::new(c.x, c.y - h),
                Pos2::new(c.x + r, c.y + h),
                Pos2::new(c.x - r, c.y + h),
            ];
            painter.add(egui::Shape::convex_polygon(points, fill, Stroke::NONE));
        }
        Shape::Octahedron { radius } => {
            let r = radius * u;
            let points = vec![
                Pos2::new(c.x, c.y - r),
                Pos2::new(c.x + r, c.y),
                Pos2::new(c.x, c.y + r),
                Pos2::new(c.x - r, c.y),
            ];
            painter.add(egui::Shape::convex_polygon(points, fill, Stroke::NONE));
        }
        Shape::Ring { radius } => {
            painter.circle_stroke(c, (radius * u).max(1.0), Stroke::new(1.5, fill));
        }
        Shape::Path { points, width } => {
            let screen = path_points(placed, points, projection, viewport);
            if screen.len() >= 2 {
                painter.add(egui::Shape::line(screen, Stroke::new(*width, fill)));
            }
        }
        Shape::Rect { size } => {
            let rect = Rect::from_center_size(c, egui::vec2(size.x * u, size.y * u));
            painter.rect_filled(rect, 1.0, fill);
        }
        Shape::Frame { size } => {
            let rect = Rect::from_center_size(c, egui::vec2(size.x * u, size.y * u));
            painter.rect_stroke(rect, 2.0, Stroke::new(1.0, fill));
        }
        Shape::Label { text, size } => {
            painter.text(c, Align2::LEFT_CENTER, text, FontId::monospace(*size), fill);
        }
    }

    if node.highlighted {
        let r = (node.shape.pick_radius() * u).max(4.0) + 3.0;
        painter.circle_stroke(c, r, Stroke::new(1.5, HIGHLIGHT));
    }
}

/// Paint every visible node of `generation`, far to near
pub fn paint_generation(
    painter: &Painter,
    arena: &ResourceArena,
    generation: Generation,
    projection: &Projection,
    viewport: Rect,
) -> usize {
    let mut placed: Vec<Placed<'_>> = arena
        .nodes(generation)
        .filter_map(|(handle, node)| place(arena, handle, node, projection, viewport))
        .collect();
    placed.sort_by(|a, b| b.depth.partial_cmp(&a.depth).unwrap_or(std::cmp::Ordering::Equal));
    for p in &placed {
        draw(painter, p, projection, viewport);
    }
    placed.len()
}

/// World-space centre and pick radius of a pickable node
pub fn pick_bounds(arena: &ResourceArena, handle: NodeHandle) -> Option<(Vec3, f32)> {
    let node = arena.get(handle)?;
    if !node.pickable || !arena.is_visible(handle) {
        return None;
    }
    let world = arena.world_matrix(handle)?;
    Some((
        world.transform_point3(Vec3::ZERO),
        node.shape.pick_radius() * world_scale(&world),
    ))
}

/// Planar footprint (centre, size) for rectangle-like nodes
pub fn planar_footprint(arena: &ResourceArena, handle: NodeHandle) -> Option<(Vec2, Vec2)> {
    let node = arena.get(handle)?;
    let size = match node.shape {
        Shape::Rect { size } | Shape::Frame { size } => size,
        _ => return None,
    };
    let world = arena.world_matrix(handle)?;
    Some((
        world.transform_point3(Vec3::ZERO).truncate(),
        size * world_scale(&world),
    ))
}
