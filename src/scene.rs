//! Hierarchical scene graph.
//!
//! A [`Scene`] is an arena-backed tree of [`SceneNode`]s. Every node owns a
//! local transform, a world transform derived from it each frame, and any
//! number of attached [`Entity`] values. Nodes are addressed by [`NodeId`],
//! a copyable index into the scene's node arena; parent links are plain
//! back-references used only for traversal.
//!
//! # Building a scene
//!
//! ```
//! use dusk::{Scene, Entity, Light, PointLight};
//! use glam::Mat4;
//!
//! let mut scene = Scene::new();
//! let pivot = scene.add_node(scene.root());
//! scene.set_local(pivot, Mat4::from_translation(glam::Vec3::new(0.0, 2.0, 0.0)));
//! scene.attach(pivot, Entity::Light(Light::Point(PointLight::default())));
//! scene.update_world_transforms();
//! ```
//!
//! # Traversal and mutation
//!
//! Traversal methods borrow the scene immutably and mutation methods borrow
//! it mutably, so mutating the tree mid-traversal is rejected by the borrow
//! checker rather than left as a runtime hazard.

use glam::Mat4;

use crate::entity::{Entity, Fog, InstancedMesh, Light, LineMesh, Mesh, RayMarcher};

/// Index of a node inside its [`Scene`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// A draw callback invoked after a node's entities have been rendered.
pub type NodeDrawFn = Box<dyn FnMut(&mut wgpu::CommandEncoder)>;

/// A per-frame update callback run before transforms are recomputed.
pub type SceneUpdateFn = Box<dyn FnMut(&mut Scene)>;

/// One node of the scene tree.
pub struct SceneNode {
    /// Parent node, `None` only for the root.
    pub parent: Option<NodeId>,
    /// Child nodes, owned by this node.
    pub children: Vec<NodeId>,
    /// Transform relative to the parent.
    pub local: Mat4,
    /// Transform relative to the world, recomputed every frame by
    /// [`Scene::update_world_transforms`]; never trusted across frames.
    pub world: Mat4,
    /// Entities attached to this node.
    pub entities: Vec<Entity>,
    /// Optional custom draw hook, invoked after the node's geometry.
    pub draw: Option<NodeDrawFn>,
}

impl SceneNode {
    fn new(parent: Option<NodeId>) -> Self {
        Self {
            parent,
            children: Vec::new(),
            local: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
            entities: Vec::new(),
            draw: None,
        }
    }
}

/// A `(node, entity)` pair produced by the typed content queries, with the
/// node's world transform snapshotted at query time.
pub struct NodeContent<'a, T: ?Sized> {
    /// Node the entity is attached to.
    pub node: NodeId,
    /// Index of the entity within the node's entity list; together with
    /// `node` this is the entity's stable identity.
    pub entity_index: usize,
    /// World transform of the node at query time.
    pub world: Mat4,
    /// The entity itself.
    pub content: &'a T,
}

/// The scene: a tree of nodes plus per-frame update callbacks.
pub struct Scene {
    nodes: Vec<SceneNode>,
    /// Callbacks run at the start of every frame, before the transform
    /// scan. Used for animation without an external ECS.
    pub update_functions: Vec<SceneUpdateFn>,
}

impl Scene {
    /// Create a scene containing only a root node with identity transforms.
    pub fn new() -> Self {
        Self {
            nodes: vec![SceneNode::new(None)],
            update_functions: Vec::new(),
        }
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Add an empty node under `parent` and return its id.
    pub fn add_node(&mut self, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(SceneNode::new(Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Attach an entity to a node.
    pub fn attach(&mut self, node: NodeId, entity: Entity) {
        self.nodes[node.0].entities.push(entity);
    }

    /// Set a node's local transform.
    pub fn set_local(&mut self, node: NodeId, transform: Mat4) {
        self.nodes[node.0].local = transform;
    }

    /// Set a node's custom draw callback.
    pub fn set_draw(&mut self, node: NodeId, draw: NodeDrawFn) {
        self.nodes[node.0].draw = Some(draw);
    }

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> &SceneNode {
        &self.nodes[id.0]
    }

    /// Mutably borrow a node.
    pub fn node_mut(&mut self, id: NodeId) -> &mut SceneNode {
        &mut self.nodes[id.0]
    }

    /// World transform of a node as of the last transform update.
    pub fn world(&self, id: NodeId) -> Mat4 {
        self.nodes[id.0].world
    }

    /// Depth-first preorder visit of every node.
    ///
    /// The visitor receives node borrows living as long as the scene
    /// borrow, so it may collect entity references.
    pub fn visit<'s>(&'s self, mut visitor: impl FnMut(NodeId, &'s SceneNode)) {
        self.visit_from(self.root(), &mut visitor);
    }

    fn visit_from<'s>(&'s self, id: NodeId, visitor: &mut impl FnMut(NodeId, &'s SceneNode)) {
        visitor(id, &self.nodes[id.0]);
        // children vec is cloned cheaply to keep the visitor free to borrow
        // node contents; ids are stable for the duration of the walk
        for child in self.nodes[id.0].children.clone() {
            self.visit_from(child, visitor);
        }
    }

    /// Top-down fold: each node receives the value its parent produced.
    ///
    /// This is the primitive behind world-transform propagation; the value
    /// for the root is `initial`.
    pub fn scan<P: Copy>(&mut self, initial: P, mut scanner: impl FnMut(&mut SceneNode, P) -> P) {
        self.scan_from(NodeId(0), initial, &mut scanner);
    }

    fn scan_from<P: Copy>(
        &mut self,
        id: NodeId,
        carry: P,
        scanner: &mut impl FnMut(&mut SceneNode, P) -> P,
    ) {
        let next = scanner(&mut self.nodes[id.0], carry);
        for child in self.nodes[id.0].children.clone() {
            self.scan_from(child, next, scanner);
        }
    }

    /// Recompute every node's world transform as
    /// `parent_world * local`, with the root's parent taken as identity.
    ///
    /// Must run before any content query feeds a draw; the renderer calls
    /// this first thing every frame.
    pub fn update_world_transforms(&mut self) {
        self.scan(Mat4::IDENTITY, |node, parent_world| {
            node.world = parent_world * node.local;
            node.world
        });
    }

    /// Nodes matching a predicate, in traversal order.
    pub fn find_nodes(&self, mut selector: impl FnMut(&SceneNode) -> bool) -> Vec<NodeId> {
        let mut result = Vec::new();
        self.visit(|id, node| {
            if selector(node) {
                result.push(id);
            }
        });
        result
    }

    /// Generic typed content query: every entity for which `select`
    /// returns `Some`, in traversal order, once per attached entity.
    pub fn find_content<'a, T: ?Sized>(
        &'a self,
        mut select: impl FnMut(&'a Entity) -> Option<&'a T>,
    ) -> Vec<NodeContent<'a, T>> {
        let mut result = Vec::new();
        self.visit(|id, node| {
            for (entity_index, entity) in node.entities.iter().enumerate() {
                if let Some(content) = select(entity) {
                    result.push(NodeContent {
                        node: id,
                        entity_index,
                        world: node.world,
                        content,
                    });
                }
            }
        });
        result
    }

    /// All lights in the scene.
    pub fn lights(&self) -> Vec<NodeContent<'_, Light>> {
        self.find_content(|e| match e {
            Entity::Light(light) => Some(light),
            _ => None,
        })
    }

    /// All meshes in the scene.
    pub fn meshes(&self) -> Vec<NodeContent<'_, Mesh>> {
        self.find_content(|e| match e {
            Entity::Mesh(mesh) => Some(mesh),
            _ => None,
        })
    }

    /// All instanced meshes in the scene.
    pub fn instanced_meshes(&self) -> Vec<NodeContent<'_, InstancedMesh>> {
        self.find_content(|e| match e {
            Entity::InstancedMesh(mesh) => Some(mesh),
            _ => None,
        })
    }

    /// All line meshes in the scene.
    pub fn line_meshes(&self) -> Vec<NodeContent<'_, LineMesh>> {
        self.find_content(|e| match e {
            Entity::LineMesh(mesh) => Some(mesh),
            _ => None,
        })
    }

    /// All fog volumes in the scene.
    pub fn fogs(&self) -> Vec<NodeContent<'_, Fog>> {
        self.find_content(|e| match e {
            Entity::Fog(fog) => Some(fog),
            _ => None,
        })
    }

    /// All ray-marched volumes in the scene.
    pub fn ray_marchers(&self) -> Vec<NodeContent<'_, RayMarcher>> {
        self.find_content(|e| match e {
            Entity::RayMarcher(rm) => Some(rm),
            _ => None,
        })
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{AmbientLight, PointLight};
    use glam::Vec3;

    fn translation(x: f32, y: f32, z: f32) -> Mat4 {
        Mat4::from_translation(Vec3::new(x, y, z))
    }

    #[test]
    fn world_transforms_compose_down_the_tree() {
        let mut scene = Scene::new();
        let a = scene.add_node(scene.root());
        let b = scene.add_node(a);
        let c = scene.add_node(b);
        scene.set_local(a, translation(1.0, 0.0, 0.0));
        scene.set_local(b, translation(0.0, 2.0, 0.0));
        scene.set_local(c, translation(0.0, 0.0, 3.0));

        scene.update_world_transforms();

        assert_eq!(scene.world(scene.root()), Mat4::IDENTITY);
        assert_eq!(scene.world(a), translation(1.0, 0.0, 0.0));
        assert_eq!(scene.world(b), translation(1.0, 2.0, 0.0));
        assert_eq!(scene.world(c), translation(1.0, 2.0, 3.0));
    }

    #[test]
    fn root_world_equals_its_local() {
        let mut scene = Scene::new();
        scene.set_local(scene.root(), translation(5.0, 6.0, 7.0));
        let child = scene.add_node(scene.root());
        scene.set_local(child, translation(1.0, 0.0, 0.0));

        scene.update_world_transforms();

        assert_eq!(scene.world(scene.root()), translation(5.0, 6.0, 7.0));
        assert_eq!(scene.world(child), translation(6.0, 6.0, 7.0));
    }

    #[test]
    fn content_query_finds_every_entity_once() {
        let mut scene = Scene::new();
        let a = scene.add_node(scene.root());
        let b = scene.add_node(a);
        scene.attach(a, Entity::Light(Light::Point(PointLight::default())));
        // two lights on the same node must both be reported
        scene.attach(b, Entity::Light(Light::Ambient(AmbientLight::default())));
        scene.attach(b, Entity::Light(Light::Point(PointLight::default())));
        scene.attach(b, Entity::Fog(Fog::default()));

        let lights = scene.lights();
        assert_eq!(lights.len(), 3);
        assert_eq!(lights[0].node, a);
        assert_eq!(lights[1].node, b);
        assert_eq!(lights[2].node, b);
        assert_eq!(lights[1].entity_index, 0);
        assert_eq!(lights[2].entity_index, 1);

        assert_eq!(scene.fogs().len(), 1);
        assert!(scene.meshes().is_empty());
    }

    #[test]
    fn content_references_outlive_the_query() {
        let mut scene = Scene::new();
        let node = scene.add_node(scene.root());
        scene.attach(node, Entity::Light(Light::Point(PointLight::default())));
        scene.update_world_transforms();

        // the borrows collected inside visit stay usable after it returns
        let lights = scene.lights();
        let first: &Light = lights[0].content;
        assert_eq!(first.shadows(), crate::entity::Shadows::None);
        assert_eq!(lights[0].world, scene.world(node));
    }

    #[test]
    fn visit_order_is_depth_first_preorder() {
        let mut scene = Scene::new();
        let a = scene.add_node(scene.root());
        let b = scene.add_node(scene.root());
        let a1 = scene.add_node(a);

        let mut order = Vec::new();
        scene.visit(|id, _| order.push(id));
        assert_eq!(order, vec![scene.root(), a, a1, b]);
    }
}
