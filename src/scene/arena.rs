//! Generation-tagged storage for scene resources
//!
//! Every node is tagged with the overlay that allocated it, the activation
//! generation it belongs to, and a [`Layer`]. Tearing an overlay down is a
//! single [`ResourceArena::release_generation`] call rather than a recursive
//! walk over a scene tree. Handles are versioned, so a handle kept past its
//! release resolves to `None` instead of aliasing a newer node.

use std::collections::HashSet;

use glam::Mat4;

use super::node::SceneNode;
use crate::overlay::OverlayId;

/// One activation of one overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    index: u32,
    version: u32,
}

/// Static nodes are built once per activation; dynamic nodes are rebuilt from
/// telemetry or spawned by animation and may be released independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Static,
    Dynamic,
}

#[derive(Debug)]
struct Entry {
    owner: OverlayId,
    generation: Generation,
    layer: Layer,
    node: SceneNode,
}

#[derive(Debug, Default)]
struct Slot {
    version: u32,
    entry: Option<Entry>,
}

const MAX_DEPTH: usize = 64;

#[derive(Debug, Default)]
pub struct ResourceArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    next_generation: u64,
    live: usize,
}

impl ResourceArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_generation(&mut self) -> Generation {
        self.next_generation += 1;
        Generation(self.next_generation)
    }

    pub fn alloc(
        &mut self,
        owner: OverlayId,
        generation: Generation,
        layer: Layer,
        node: SceneNode,
    ) -> NodeHandle {
        let entry = Entry {
            owner,
            generation,
            layer,
            node,
        };
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            NodeHandle {
                index,
                version: slot.version,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                version: 0,
                entry: Some(entry),
            });
            NodeHandle { index, version: 0 }
        }
    }

    fn entry(&self, handle: NodeHandle) -> Option<&Entry> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.version == handle.version)
            .and_then(|slot| slot.entry.as_ref())
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&SceneNode> {
        self.entry(handle).map(|e| &e.node)
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut SceneNode> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.version == handle.version)
            .and_then(|slot| slot.entry.as_mut())
            .map(|e| &mut e.node)
    }

    pub fn is_live(&self, handle: NodeHandle) -> bool {
        self.entry(handle).is_some()
    }

    pub fn generation_of(&self, handle: NodeHandle) -> Option<Generation> {
        self.entry(handle).map(|e| e.generation)
    }

    fn free_slot(&mut self, index: u32) -> bool {
        let slot = &mut self.slots[index as usize];
        if slot.entry.take().is_none() {
            return false;
        }
        slot.version = slot.version.wrapping_add(1);
        self.free.push(index);
        self.live -= 1;
        true
    }

    /// Release every slot matching `pred` along with all of its descendants
    fn release_where(&mut self, pred: impl Fn(&Entry) -> bool) -> usize {
        let mut doomed: HashSet<u32> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.entry.as_ref().is_some_and(&pred))
            .map(|(i, _)| i as u32)
            .collect();

        if doomed.is_empty() {
            return 0;
        }

        // Children detach with their parents
        loop {
            let before = doomed.len();
            for (i, slot) in self.slots.iter().enumerate() {
                let Some(entry) = &slot.entry else { continue };
                if let Some(parent) = entry.node.parent {
                    let parent_live =
                        self.slots[parent.index as usize].version == parent.version;
                    if parent_live && doomed.contains(&parent.index) {
                        doomed.insert(i as u32);
                    }
                }
            }
            if doomed.len() == before {
                break;
            }
        }

        doomed.into_iter().filter(|&i| self.free_slot(i)).count()
    }

    /// Release one node and its descendants
    pub fn release(&mut self, handle: NodeHandle) -> usize {
        if !self.is_live(handle) {
            return 0;
        }
        let index = handle.index;
        let mut released = 0;
        let children: Vec<NodeHandle> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                let entry = slot.entry.as_ref()?;
                (entry.node.parent == Some(handle)).then_some(NodeHandle {
                    index: i as u32,
                    version: slot.version,
                })
            })
            .collect();
        for child in children {
            released += self.release(child);
        }
        if self.free_slot(index) {
            released += 1;
        }
        released
    }

    /// Release every node allocated under `generation`
    pub fn release_generation(&mut self, generation: Generation) -> usize {
        self.release_where(|e| e.generation == generation)
    }

    /// Release one layer of a generation
    pub fn release_layer(&mut self, generation: Generation, layer: Layer) -> usize {
        self.release_where(|e| e.generation == generation && e.layer == layer)
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn live_in(&self, generation: Generation) -> usize {
        self.slots
            .iter()
            .filter_map(|s| s.entry.as_ref())
            .filter(|e| e.generation == generation)
            .count()
    }

    pub fn live_for(&self, owner: OverlayId) -> usize {
        self.slots
            .iter()
            .filter_map(|s| s.entry.as_ref())
            .filter(|e| e.owner == owner)
            .count()
    }

    /// Nodes of one generation in allocation-slot order
    pub fn nodes(&self, generation: Generation) -> impl Iterator<Item = (NodeHandle, &SceneNode)> {
        self.slots.iter().enumerate().filter_map(move |(i, slot)| {
            let entry = slot.entry.as_ref()?;
            (entry.generation == generation).then_some((
                NodeHandle {
                    index: i as u32,
                    version: slot.version,
                },
                &entry.node,
            ))
        })
    }

    /// `handle` followed by each live ancestor, nearest first
    pub fn parent_chain(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        let mut chain = Vec::new();
        let mut cursor = Some(handle);
        while let Some(current) = cursor {
            if chain.len() >= MAX_DEPTH {
                break;
            }
            let Some(node) = self.get(current) else { break };
            chain.push(current);
            cursor = node.parent;
        }
        chain
    }

    /// Local-to-world transform; a released ancestor ends the chain
    pub fn world_matrix(&self, handle: NodeHandle) -> Option<Mat4> {
        let chain = self.parent_chain(handle);
        if chain.is_empty() {
            return None;
        }
        Some(chain.iter().rev().fold(Mat4::IDENTITY, |acc, h| {
            self.get(*h)
                .map(|node| acc * node.local_matrix())
                .unwrap_or(acc)
        }))
    }

    /// Visible only if the node and every ancestor are visible
    pub fn is_visible(&self, handle: NodeHandle) -> bool {
        let chain = self.parent_chain(handle);
        !chain.is_empty()
            && chain
                .iter()
                .all(|h| self.get(*h).is_some_and(|n| n.visible))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::node::Shape;
    use glam::Vec3;
    use proptest::prelude::*;

    const DNA: OverlayId = OverlayId::Dna;

    fn sphere() -> SceneNode {
        SceneNode::new(Shape::Sphere { radius: 0.2 })
    }

    #[test]
    fn test_release_generation_frees_everything() {
        let mut arena = ResourceArena::new();
        let g1 = arena.begin_generation();
        let g2 = arena.begin_generation();
        let root = arena.alloc(DNA, g1, Layer::Static, SceneNode::group());
        arena.alloc(DNA, g1, Layer::Dynamic, sphere().child_of(root));
        arena.alloc(OverlayId::Network, g2, Layer::Static, sphere());

        assert_eq!(arena.release_generation(g1), 2);
        assert_eq!(arena.live_in(g1), 0);
        assert_eq!(arena.live_count(), 1);
        assert_eq!(arena.release_generation(g1), 0);
    }

    #[test]
    fn test_stale_handle_does_not_alias() {
        let mut arena = ResourceArena::new();
        let g = arena.begin_generation();
        let old = arena.alloc(DNA, g, Layer::Dynamic, sphere());
        arena.release(old);
        let new = arena.alloc(DNA, g, Layer::Dynamic, sphere());
        assert!(arena.get(old).is_none());
        assert!(arena.get(new).is_some());
    }

    #[test]
    fn test_release_layer_keeps_static_parent() {
        let mut arena = ResourceArena::new();
        let g = arena.begin_generation();
        let strand = arena.alloc(DNA, g, Layer::Static, SceneNode::group());
        for _ in 0..5 {
            arena.alloc(DNA, g, Layer::Dynamic, sphere().child_of(strand));
        }
        assert_eq!(arena.release_layer(g, Layer::Dynamic), 5);
        assert!(arena.is_live(strand));
        assert_eq!(arena.live_in(g), 1);
    }

    #[test]
    fn test_release_cascades_to_children() {
        let mut arena = ResourceArena::new();
        let g = arena.begin_generation();
        let gene = arena.alloc(DNA, g, Layer::Dynamic, SceneNode::group());
        let marker = arena.alloc(DNA, g, Layer::Dynamic, sphere().child_of(gene));
        arena.alloc(DNA, g, Layer::Dynamic, sphere().child_of(marker));
        assert_eq!(arena.release(gene), 3);
        assert_eq!(arena.live_count(), 0);
    }

    #[test]
    fn test_world_matrix_composes_parents() {
        let mut arena = ResourceArena::new();
        let g = arena.begin_generation();
        let parent = SceneNode::group().at(Vec3::new(1.0, 0.0, 0.0));
        let parent = arena.alloc(DNA, g, Layer::Static, parent);
        let child = sphere().at(Vec3::new(0.0, 2.0, 0.0)).child_of(parent);
        let child = arena.alloc(DNA, g, Layer::Static, child);
        let world = arena.world_matrix(child).unwrap().transform_point3(Vec3::ZERO);
        assert!((world - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_hidden_parent_hides_child() {
        let mut arena = ResourceArena::new();
        let g = arena.begin_generation();
        let parent = arena.alloc(DNA, g, Layer::Static, SceneNode::group().hidden());
        let child = arena.alloc(DNA, g, Layer::Static, sphere().child_of(parent));
        assert!(!arena.is_visible(child));
        assert_eq!(arena.parent_chain(child), vec![child, parent]);
    }

    proptest! {
        #[test]
        fn prop_live_count_matches_allocations(ops in proptest::collection::vec(0u8..3, 1..60)) {
            let mut arena = ResourceArena::new();
            let g = arena.begin_generation();
            let mut handles = Vec::new();
            for op in ops {
                match op {
                    0 | 1 => handles.push(arena.alloc(DNA, g, Layer::Dynamic, sphere())),
                    _ => {
                        if let Some(h) = handles.pop() {
                            prop_assert_eq!(arena.release(h), 1);
                        }
                    }
                }
                prop_assert_eq!(arena.live_count(), handles.len());
            }
            arena.release_generation(g);
            prop_assert_eq!(arena.live_count(), 0);
        }
    }
}
