//! Pointer picking and tooltips
//!
//! Perspective overlays cast a ray from the viewpoint and test it against the
//! bounding sphere of every pickable node. Planar overlays map the pointer
//! into world space and query an R-tree of node footprints. Either way the
//! hit is walked up its parent chain to the nearest node carrying metadata.

use egui::{Pos2, Rect};
use glam::Vec2;

use crate::chrome::{Chrome, ChromeKey};
use crate::scene::paint::{pick_bounds, planar_footprint};
use crate::scene::{
    Generation, NodeHandle, NodeMeta, Projection, ResourceArena, SpatialIndex, SpatialNode,
};

const TOOLTIP_OFFSET: egui::Vec2 = egui::vec2(14.0, 14.0);

/// Nearest pickable node under `pointer`
pub fn pick(
    arena: &ResourceArena,
    generation: Generation,
    projection: &Projection,
    pointer: Pos2,
    viewport: Rect,
) -> Option<NodeHandle> {
    if !viewport.contains(pointer) {
        return None;
    }
    match projection {
        Projection::Perspective(vp) => {
            let ray = vp.pick_ray(pointer, viewport);
            arena
                .nodes(generation)
                .filter_map(|(handle, _)| {
                    let (center, radius) = pick_bounds(arena, handle)?;
                    ray.intersect_sphere(center, radius).map(|d| (handle, d))
                })
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(handle, _)| handle)
        }
        Projection::Planar(view) => {
            let index = planar_index(arena, generation);
            let world: Vec2 = view.screen_to_world(pointer, viewport);
            index.hit_test([world.x, world.y], 0.0).map(|n| n.handle)
        }
    }
}

fn planar_index(arena: &ResourceArena, generation: Generation) -> SpatialIndex {
    SpatialIndex::from_nodes(arena.nodes(generation).filter_map(|(handle, node)| {
        if !node.pickable || !arena.is_visible(handle) {
            return None;
        }
        if let Some((center, size)) = planar_footprint(arena, handle) {
            return Some(SpatialNode::rect(handle, center.into(), size.into()));
        }
        let (center, radius) = pick_bounds(arena, handle)?;
        Some(SpatialNode::circle(handle, [center.x, center.y], radius))
    }))
}

/// First node in the parent chain that carries metadata
pub fn resolve_meta(arena: &ResourceArena, handle: NodeHandle) -> Option<NodeHandle> {
    arena
        .parent_chain(handle)
        .into_iter()
        .find(|h| arena.get(*h).is_some_and(|n| n.meta.is_some()))
}

fn tooltip_lines(meta: &NodeMeta) -> Vec<String> {
    std::iter::once(meta.title.clone())
        .chain(meta.lines.iter().cloned())
        .collect()
}

/// The one hovered node of an overlay
#[derive(Debug, Default)]
pub struct HoverState {
    hovered: Option<NodeHandle>,
}

impl HoverState {
    pub fn hovered(&self) -> Option<NodeHandle> {
        self.hovered
    }

    /// Move the hover to `hit` (already picked). Returns `true` when the
    /// hovered node changed.
    pub fn update(
        &mut self,
        arena: &mut ResourceArena,
        chrome: &mut Chrome,
        tooltip: ChromeKey,
        hit: Option<NodeHandle>,
        pointer: Pos2,
    ) -> bool {
        let target = hit.and_then(|h| resolve_meta(arena, h));
        let changed = target != self.hovered;

        if changed {
            if let Some(previous) = self.hovered.take() {
                if let Some(node) = arena.get_mut(previous) {
                    node.highlighted = false;
                }
            }
            if let Some(next) = target {
                if let Some(node) = arena.get_mut(next) {
                    node.highlighted = true;
                }
            }
            self.hovered = target;
        }

        match target.and_then(|h| arena.get(h)).and_then(|n| n.meta.as_ref()) {
            Some(meta) => {
                chrome.set_lines(tooltip, tooltip_lines(meta));
                chrome.show_at(tooltip, pointer + TOOLTIP_OFFSET);
            }
            None => chrome.hide(tooltip),
        }
        changed
    }

    pub fn clear(&mut self, arena: &mut ResourceArena, chrome: &mut Chrome, tooltip: ChromeKey) {
        if let Some(previous) = self.hovered.take() {
            if let Some(node) = arena.get_mut(previous) {
                node.highlighted = false;
            }
        }
        chrome.hide(tooltip);
    }

    /// Drop the handle without touching the arena (its generation is gone)
    pub fn forget(&mut self) {
        self.hovered = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::OverlayId;
    use crate::scene::{Layer, PlanarView, SceneNode, Shape, Viewpoint};
    use glam::Vec3;

    const ID: OverlayId = OverlayId::Dna;

    fn viewport() -> Rect {
        Rect::from_min_size(Pos2::ZERO, egui::vec2(800.0, 600.0))
    }

    fn sphere() -> SceneNode {
        SceneNode::new(Shape::Sphere { radius: 0.5 })
    }

    #[test]
    fn test_ray_pick_prefers_nearest() {
        let mut arena = ResourceArena::new();
        let g = arena.begin_generation();
        let far = sphere().at(Vec3::new(0.0, 0.0, -3.0)).pickable();
        let far = arena.alloc(ID, g, Layer::Static, far);
        let near = sphere().at(Vec3::new(0.0, 0.0, 3.0)).pickable();
        let near = arena.alloc(ID, g, Layer::Static, near);
        arena.alloc(ID, g, Layer::Static, sphere().at(Vec3::new(0.0, 0.0, 5.0)));

        let projection =
            Projection::Perspective(Viewpoint::looking_at(Vec3::new(0.0, 0.0, 15.0), Vec3::ZERO));
        let hit = pick(&arena, g, &projection, Pos2::new(400.0, 300.0), viewport());
        assert_eq!(hit, Some(near));
        assert_ne!(hit, Some(far));
        assert_eq!(pick(&arena, g, &projection, Pos2::new(10.0, 10.0), viewport()), None);
    }

    #[test]
    fn test_planar_pick_hits_block() {
        let mut arena = ResourceArena::new();
        let g = arena.begin_generation();
        let block = arena.alloc(
            ID,
            g,
            Layer::Dynamic,
            SceneNode::new(Shape::Rect { size: Vec2::splat(0.9) })
                .at_xy(2.5, 1.5)
                .pickable(),
        );
        let view = PlanarView::new(Rect::from_min_max(Pos2::ZERO, Pos2::new(8.0, 6.0)), 0.0);
        let screen = view.world_to_screen(Vec2::new(2.5, 1.5), viewport());
        let projection = Projection::Planar(view);
        assert_eq!(pick(&arena, g, &projection, screen, viewport()), Some(block));
    }

    #[test]
    fn test_resolve_meta_walks_to_parent() {
        let mut arena = ResourceArena::new();
        let g = arena.begin_generation();
        let gene = SceneNode::group().with_meta(NodeMeta::new("sched"));
        let gene = arena.alloc(ID, g, Layer::Static, gene);
        let marker = arena.alloc(ID, g, Layer::Static, sphere().child_of(gene).pickable());
        assert_eq!(resolve_meta(&arena, marker), Some(gene));
    }

    #[test]
    fn test_single_highlight_and_tooltip() {
        let mut arena = ResourceArena::new();
        let mut chrome = Chrome::new();
        let key = ChromeKey::tooltip(ID);
        chrome.ensure(key, false);
        let g = arena.begin_generation();
        let a = sphere().with_meta(NodeMeta::new("A - SYSCALL").line("read"));
        let a = arena.alloc(ID, g, Layer::Static, a);
        let b = sphere().with_meta(NodeMeta::new("T - INTERRUPT"));
        let b = arena.alloc(ID, g, Layer::Static, b);

        let mut hover = HoverState::default();
        assert!(hover.update(&mut arena, &mut chrome, key, Some(a), Pos2::new(5.0, 5.0)));
        assert_eq!(chrome.get(key).unwrap().lines, vec!["A - SYSCALL", "read"]);

        assert!(hover.update(&mut arena, &mut chrome, key, Some(b), Pos2::new(6.0, 6.0)));
        assert!(!arena.get(a).unwrap().highlighted);
        assert!(arena.get(b).unwrap().highlighted);

        assert!(hover.update(&mut arena, &mut chrome, key, None, Pos2::new(7.0, 7.0)));
        assert!(!arena.get(b).unwrap().highlighted);
        assert!(!chrome.get(key).unwrap().visible);
        assert_eq!(hover.hovered(), None);
    }
}
