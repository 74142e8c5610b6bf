use glam::{Mat4, Quat, Vec3};

use crate::error::{SceneError, SceneResult};
use crate::material::Material;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub usize);

// ======================
// === GEOMETRY DATA ===
// ======================

/// Triangle list geometry in CPU memory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// A `width` × `height` quad in the XY plane facing +Z, one segment each
    /// way. UV (0, 0) is the top-left corner.
    pub fn plane(width: f32, height: f32) -> Self {
        let (hw, hh) = (width / 2.0, height / 2.0);
        Self {
            positions: vec![[-hw, hh, 0.0], [hw, hh, 0.0], [-hw, -hh, 0.0], [hw, -hh, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 4],
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]],
            indices: vec![0, 2, 1, 2, 3, 1],
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Fills in missing normals (area-weighted) and UVs (zero).
    pub fn ensure_attributes(&mut self) {
        let count = self.positions.len();
        if self.uvs.len() != count {
            self.uvs = vec![[0.0, 0.0]; count];
        }
        if self.normals.len() == count {
            return;
        }

        let mut normals = vec![Vec3::ZERO; count];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if a >= count || b >= count || c >= count {
                continue;
            }
            let pa = Vec3::from(self.positions[a]);
            let face = (Vec3::from(self.positions[b]) - pa).cross(Vec3::from(self.positions[c]) - pa);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        self.normals = normals
            .into_iter()
            .map(|n| n.try_normalize().unwrap_or(Vec3::Z).to_array())
            .collect();
    }
}

// ==================
// === TRANSFORMS ===
// ==================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Rotates in local space around `axis` (normalized here).
    pub fn rotate_on_axis(&mut self, axis: Vec3, angle: f32) {
        let Some(axis) = axis.try_normalize() else {
            return;
        };
        self.rotation = (self.rotation * Quat::from_axis_angle(axis, angle)).normalize();
    }
}

// ==================
// === SCENE GRAPH ===
// ==================

#[derive(Clone, Debug, PartialEq)]
pub struct Renderable {
    pub mesh: MeshId,
    pub material: Material,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub transform: Transform,
    pub renderable: Option<Renderable>,
    pub visible: bool,
}

/// Draw request produced by walking the graph.
#[derive(Clone, Debug)]
pub struct DrawItem<'a> {
    pub node: NodeId,
    pub mesh: MeshId,
    pub world: Mat4,
    pub material: &'a Material,
}

/// Index ranges assigned to a graph merged in with [`SceneGraph::attach`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphOffset {
    pub nodes: usize,
    pub meshes: usize,
    pub mesh_count: usize,
}

impl GraphOffset {
    pub fn node(&self, id: NodeId) -> NodeId {
        NodeId(id.0 + self.nodes)
    }

    pub fn mesh(&self, id: MeshId) -> MeshId {
        MeshId(id.0 + self.meshes)
    }

    pub fn mesh_ids(&self) -> impl Iterator<Item = MeshId> {
        (self.meshes..self.meshes + self.mesh_count).map(MeshId)
    }
}

/// Arena-owned node tree. Nodes are never removed, so ids stay valid.
#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<Node>,
    meshes: Vec<MeshData>,
    roots: Vec<NodeId>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str, transform: Transform, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let parent = parent.filter(|p| p.0 < self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            transform,
            renderable: None,
            visible: true,
        });
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn add_mesh(&mut self, mesh: MeshData) -> MeshId {
        self.meshes.push(mesh);
        MeshId(self.meshes.len() - 1)
    }

    pub fn set_renderable(&mut self, id: NodeId, mesh: MeshId, material: Material) -> SceneResult<()> {
        self.node_mut(id)?.renderable = Some(Renderable { mesh, material });
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> SceneResult<&Node> {
        self.nodes.get(id.0).ok_or(SceneError::InvalidNode(id.0))
    }

    pub fn node_mut(&mut self, id: NodeId) -> SceneResult<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(SceneError::InvalidNode(id.0))
    }

    pub fn mesh(&self, id: MeshId) -> Option<&MeshData> {
        self.meshes.get(id.0)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Depth-first search for `name` in the subtree rooted at `root`
    /// (the root itself included).
    pub fn find_by_name(&self, root: NodeId, name: &str) -> SceneResult<NodeId> {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node(id)?;
            if node.name == name {
                return Ok(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        Err(SceneError::NodeNotFound(name.to_string()))
    }

    /// Replaces the material on `id`, or on its direct renderable children
    /// when the node itself only groups primitives. Returns how many
    /// renderables changed.
    pub fn replace_material(&mut self, id: NodeId, material: Material) -> SceneResult<usize> {
        if let Some(renderable) = self.node_mut(id)?.renderable.as_mut() {
            renderable.material = material;
            return Ok(1);
        }

        let children = self.node(id)?.children.clone();
        let mut replaced = 0;
        for child in children {
            if let Some(renderable) = self.node_mut(child)?.renderable.as_mut() {
                renderable.material = material.clone();
                replaced += 1;
            }
        }
        Ok(replaced)
    }

    pub fn material_mut(&mut self, id: NodeId) -> Option<&mut Material> {
        self.nodes
            .get_mut(id.0)
            .and_then(|node| node.renderable.as_mut())
            .map(|renderable| &mut renderable.material)
    }

    pub fn rotate_on_axis(&mut self, id: NodeId, axis: Vec3, angle: f32) -> SceneResult<()> {
        self.node_mut(id)?.transform.rotate_on_axis(axis, angle);
        Ok(())
    }

    pub fn set_translation(&mut self, id: NodeId, translation: Vec3) -> SceneResult<()> {
        self.node_mut(id)?.transform.translation = translation;
        Ok(())
    }

    /// Merges `other` into this graph. Its roots become children of `parent`
    /// (or new roots); ids inside `other` are shifted by the returned offset.
    pub fn attach(&mut self, other: SceneGraph, parent: Option<NodeId>) -> GraphOffset {
        let offset = GraphOffset {
            nodes: self.nodes.len(),
            meshes: self.meshes.len(),
            mesh_count: other.meshes.len(),
        };
        let parent = parent.filter(|p| p.0 < self.nodes.len());

        self.meshes.extend(other.meshes);
        for mut node in other.nodes {
            node.parent = node.parent.map(|p| offset.node(p));
            node.children.iter_mut().for_each(|c| *c = offset.node(*c));
            if let Some(renderable) = node.renderable.as_mut() {
                renderable.mesh = offset.mesh(renderable.mesh);
            }
            self.nodes.push(node);
        }

        for root in other.roots {
            let root = offset.node(root);
            match parent {
                Some(p) => {
                    self.nodes[root.0].parent = Some(p);
                    self.nodes[p.0].children.push(root);
                }
                None => self.roots.push(root),
            }
        }
        offset
    }

    pub fn world_matrix(&self, id: NodeId) -> SceneResult<Mat4> {
        let mut node = self.node(id)?;
        let mut matrix = node.transform.matrix();
        while let Some(parent) = node.parent {
            node = self.node(parent)?;
            matrix = node.transform.matrix() * matrix;
        }
        Ok(matrix)
    }

    /// Visible renderables with their world matrices, parents before children.
    pub fn draw_list(&self) -> Vec<DrawItem<'_>> {
        let mut items = Vec::new();
        let mut stack: Vec<(NodeId, Mat4)> = self.roots.iter().rev().map(|&r| (r, Mat4::IDENTITY)).collect();

        while let Some((id, parent_world)) = stack.pop() {
            let Some(node) = self.nodes.get(id.0) else {
                continue;
            };
            if !node.visible {
                continue;
            }
            let world = parent_world * node.transform.matrix();
            if let Some(renderable) = &node.renderable {
                items.push(DrawItem {
                    node: id,
                    mesh: renderable.mesh,
                    world,
                    material: &renderable.material,
                });
            }
            stack.extend(node.children.iter().rev().map(|&c| (c, world)));
        }
        items
    }
}

// ===================
// === ENVIRONMENT ===
// ===================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

/// Scene-wide lighting and backdrop. `map` names the equirectangular texture
/// used both for image-based lighting and the background.
#[derive(Clone, Debug, PartialEq)]
pub struct Environment {
    pub map: Option<String>,
    pub ambient: AmbientLight,
    pub environment_intensity: f32,
    pub background_blurriness: f32,
    pub background_intensity: f32,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            map: None,
            ambient: AmbientLight { color: Vec3::ONE, intensity: 1.0 },
            environment_intensity: 1.0,
            background_blurriness: 0.0,
            background_intensity: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{StandardMaterial, TransmissionMaterial};

    fn sample_graph() -> (SceneGraph, NodeId, NodeId) {
        let mut graph = SceneGraph::new();
        let root = graph.add_node("Scene", Transform::IDENTITY, None);
        let mesh = graph.add_mesh(MeshData::plane(1.0, 1.0));
        let sphere = graph.add_node("Sphere", Transform::IDENTITY, Some(root));
        graph.set_renderable(sphere, mesh, Material::default()).expect("node exists");
        (graph, root, sphere)
    }

    #[test]
    fn plane_has_two_triangles_facing_z() {
        let plane = MeshData::plane(19.2, 10.8);
        assert_eq!(plane.vertex_count(), 4);
        assert_eq!(plane.indices.len(), 6);
        assert_eq!(plane.positions[1], [9.6, 5.4, 0.0]);
        let mut recomputed = plane.clone();
        recomputed.normals.clear();
        recomputed.ensure_attributes();
        for n in recomputed.normals {
            assert!((Vec3::from(n) - Vec3::Z).length() < 1e-6);
        }
    }

    #[test]
    fn find_by_name_searches_subtree() {
        let (graph, root, sphere) = sample_graph();
        assert_eq!(graph.find_by_name(root, "Sphere"), Ok(sphere));
        assert_eq!(graph.find_by_name(root, "Scene"), Ok(root));
        assert_eq!(
            graph.find_by_name(root, "Cube"),
            Err(SceneError::NodeNotFound("Cube".to_string()))
        );
        assert_eq!(graph.find_by_name(NodeId(99), "Sphere"), Err(SceneError::InvalidNode(99)));
    }

    #[test]
    fn replace_material_on_group_reaches_primitives() {
        let (mut graph, root, sphere) = sample_graph();
        let glass = Material::Transmission(TransmissionMaterial::blob());
        assert_eq!(graph.replace_material(root, glass.clone()), Ok(1));
        assert_eq!(graph.material_mut(sphere).cloned(), Some(glass));
    }

    #[test]
    fn attach_offsets_ids() {
        let mut scene = SceneGraph::new();
        let plane_mesh = scene.add_mesh(MeshData::plane(2.0, 2.0));
        let plane = scene.add_node("Plane", Transform::IDENTITY, None);
        scene
            .set_renderable(plane, plane_mesh, Material::Standard(StandardMaterial::default()))
            .expect("node exists");

        let (model, root, sphere) = sample_graph();
        let offset = scene.attach(model, None);

        let root = offset.node(root);
        let sphere = offset.node(sphere);
        assert_eq!(scene.roots(), &[plane, root]);
        assert_eq!(scene.node(sphere).expect("node").parent, Some(root));
        assert_eq!(offset.mesh_ids().collect::<Vec<_>>(), vec![MeshId(1)]);
        assert_eq!(scene.find_by_name(root, "Sphere"), Ok(sphere));
        assert_eq!(scene.draw_list().len(), 2);
    }

    #[test]
    fn rotate_on_axis_accumulates_in_local_space() {
        let (mut graph, root, _) = sample_graph();
        let axis = Vec3::new(1.0, 0.0, 1.0);
        for _ in 0..3 {
            graph.rotate_on_axis(root, axis, 0.1).expect("node exists");
        }
        let expected = Quat::from_axis_angle(axis.normalize(), 0.3);
        let actual = graph.node(root).expect("node").transform.rotation;
        assert!(actual.dot(expected).abs() > 1.0 - 1e-6);
    }

    #[test]
    fn world_matrix_composes_parents() {
        let (mut graph, root, sphere) = sample_graph();
        graph.set_translation(root, Vec3::new(1.0, 2.0, 3.0)).expect("node exists");
        graph.node_mut(sphere).expect("node").transform.translation = Vec3::new(0.0, 0.0, -3.0);
        let world = graph.world_matrix(sphere).expect("node exists");
        assert!((world.transform_point3(Vec3::ZERO) - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);

        let items = graph.draw_list();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].node, sphere);
        assert!(items[0].world.abs_diff_eq(world, 1e-6));
    }

    #[test]
    fn hidden_subtrees_are_skipped() {
        let (mut graph, root, _) = sample_graph();
        graph.node_mut(root).expect("node").visible = false;
        assert!(graph.draw_list().is_empty());
    }
}
