//! A single chunk: its block field, its front/back mesh pair, and the
//! greedy mesher that turns one into the other.
//!
//! Grounded on the original engine's `FChunk` (`Load`/`Unload`/`GreedyMesh`/
//! `SwapMeshBuffer`) and on this codebase's own `mesher::GreedyMesher`, with
//! the neighbor-aware mask lookups dropped: this spec's chunks don't stitch
//! meshes across chunk borders, so a face at the chunk boundary is always
//! treated as visible (the far side is unknown, not transparent).

use nalgebra::{point, Point3};

use crate::{
    block::BlockType,
    codec::{decode, encode},
    collaborators::{ColliderHandle, PhysicsCollaborator, RendererCollaborator, TriangleMeshDescriptor},
    config::{CHUNK_SIZE, CHUNK_VOLUME},
    error::CodecError,
    transform::Transform,
    Side,
};

/// Position of a chunk in chunk-space (world position is `self * CHUNK_SIZE`).
/// The sentinel `(-1, -1, -1)` marks a working-set slot with no chunk
/// assigned.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChunkPosition {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkPosition {
    pub const SENTINEL: ChunkPosition = ChunkPosition { x: -1, y: -1, z: -1 };

    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }

    pub fn world_origin(&self) -> Point3<i32> {
        point![
            self.x * CHUNK_SIZE as i32,
            self.y * CHUNK_SIZE as i32,
            self.z * CHUNK_SIZE as i32
        ]
    }
}

#[inline(always)]
fn local_index(x: usize, y: usize, z: usize) -> usize {
    y * CHUNK_SIZE * CHUNK_SIZE + x * CHUNK_SIZE + z
}

/// One renderable vertex: a chunk-local integer position, the block type the
/// quad it belongs to carries, and which side it faces (used by the shader
/// as a normal/atlas selector).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ChunkVertex {
    pub position: [u32; 3],
    pub block: BlockType,
    pub side: Side,
}

/// A chunk's renderable surface: indices, per-vertex render records, and a
/// parallel flat position buffer suitable for handing straight to a
/// triangle-mesh collision shape builder (`vertex_stride = 12`).
#[derive(Default)]
pub struct ChunkMesh {
    pub indices: Vec<u32>,
    pub vertices: Vec<ChunkVertex>,
    pub positions: Vec<[f32; 3]>,
}

impl ChunkMesh {
    fn clear(&mut self) {
        self.indices.clear();
        self.vertices.clear();
        self.positions.clear();
    }

    fn push_quad(&mut self, quad: &Quad, side: Side) {
        let base = self.vertices.len() as u32;
        for corner in &quad.corners {
            let position = [corner[0] as f32, corner[1] as f32, corner[2] as f32];
            self.positions.push(position);
            self.vertices.push(ChunkVertex {
                position: *corner,
                block: quad.block,
                side,
            });
        }
        let winding: [u32; 6] = if quad.is_back_face {
            [0, 1, 2, 2, 3, 0]
        } else {
            [0, 3, 2, 0, 2, 1]
        };
        self.indices.extend(winding.iter().map(|i| base + i));
    }

    pub fn triangle_mesh_descriptor(&self) -> TriangleMeshDescriptor<'_> {
        // SAFETY-free reinterpretation: `positions` is a flat `[f32; 3]` per
        // vertex, contiguous, which is exactly the stride the physics
        // collaborator expects.
        let flat: &[f32] = bytemuck_flatten(&self.positions);
        TriangleMeshDescriptor {
            vertex_base: flat,
            vertex_stride: 12,
            vertex_count: self.positions.len(),
            index_base: &self.indices,
            index_stride: 12,
            triangle_count: self.indices.len() / 3,
        }
    }
}

/// Reinterprets a `&[[f32; 3]]` as a flat `&[f32]` without copying. `[f32; 3]`
/// has no padding, so this is always a valid, correctly-aligned view.
fn bytemuck_flatten(positions: &[[f32; 3]]) -> &[f32] {
    let len = positions.len() * 3;
    let ptr = positions.as_ptr() as *const f32;
    unsafe { std::slice::from_raw_parts(ptr, len) }
}

struct Quad {
    corners: [[u32; 3]; 4],
    block: BlockType,
    is_back_face: bool,
}

pub struct Chunk {
    blocks: Box<[BlockType; CHUNK_VOLUME]>,
    transform: Transform,
    mesh_front: ChunkMesh,
    mesh_back: ChunkMesh,
    collision_handle: Option<ColliderHandle>,
    loaded: bool,
    empty: bool,
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunk {
    pub fn new() -> Self {
        Self {
            blocks: vec![BlockType::NONE; CHUNK_VOLUME]
                .into_boxed_slice()
                .try_into()
                .ok()
                .expect("CHUNK_VOLUME-length vec always converts to a CHUNK_VOLUME array"),
            transform: Transform::default(),
            mesh_front: ChunkMesh::default(),
            mesh_back: ChunkMesh::default(),
            collision_handle: None,
            loaded: false,
            empty: true,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn front_mesh(&self) -> &ChunkMesh {
        &self.mesh_front
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Decodes `bytes` into this chunk's block field and marks it loaded.
    /// Returns `true` iff the decoded chunk is entirely `BlockType::NONE`
    /// (the caller may then skip meshing). Leaves the chunk unloaded on a
    /// codec error.
    pub fn load(&mut self, bytes: &[u8], world_position: Point3<i32>) -> Result<bool, CodecError> {
        debug_assert!(!self.loaded, "load() called on an already-loaded chunk");
        let decoded = decode(bytes)?;
        self.blocks = decoded.blocks;
        self.transform = Transform::to(point![
            world_position.x as f32,
            world_position.y as f32,
            world_position.z as f32
        ]);
        self.loaded = true;
        Ok(!decoded.non_empty)
    }

    /// Encodes the current block field and marks the chunk unloaded. Leaves
    /// the meshes untouched; a slot that's about to be reused will overwrite
    /// them via the next `load`/`rebuild_mesh`/`swap_mesh_buffer` cycle.
    pub fn unload(&mut self) -> Vec<u8> {
        debug_assert!(self.loaded, "unload() called on a chunk that isn't loaded");
        self.loaded = false;
        encode(&self.blocks)
    }

    fn local_coords_in_range(pos: Point3<i32>) -> bool {
        (0..CHUNK_SIZE as i32).contains(&pos.x)
            && (0..CHUNK_SIZE as i32).contains(&pos.y)
            && (0..CHUNK_SIZE as i32).contains(&pos.z)
    }

    pub fn get_block(&self, local: Point3<i32>) -> BlockType {
        debug_assert!(Self::local_coords_in_range(local));
        self.blocks[local_index(local.x as usize, local.y as usize, local.z as usize)]
    }

    pub fn set_block(&mut self, local: Point3<i32>, block: BlockType) {
        debug_assert!(Self::local_coords_in_range(local));
        self.blocks[local_index(local.x as usize, local.y as usize, local.z as usize)] = block;
    }

    pub fn destroy_block(&mut self, local: Point3<i32>) {
        self.set_block(local, BlockType::NONE);
    }

    /// Runs the greedy mesher, writing the result into the back buffer. Pure
    /// with respect to `blocks`; this is the method the worker thread calls.
    pub fn rebuild_mesh(&mut self) {
        self.mesh_back.clear();
        GreedyMesher::new(&self.blocks).mesh_into(&mut self.mesh_back);
    }

    /// Foreground-only. Promotes the back buffer to the front buffer and
    /// reconciles collision registration with the physics collaborator,
    /// mirroring the source's `SwapMeshBuffer`: add on empty->non-empty,
    /// remove on non-empty->empty, rebuild-in-place otherwise.
    pub fn swap_mesh_buffer(
        &mut self,
        handle: ColliderHandle,
        physics: &mut impl PhysicsCollaborator,
    ) {
        let was_empty = self.empty;
        std::mem::swap(&mut self.mesh_front, &mut self.mesh_back);
        self.mesh_back.clear();
        self.empty = self.mesh_front.indices.is_empty();

        match (was_empty, self.empty) {
            (true, false) => {
                physics.add_collider(handle, self.mesh_front.triangle_mesh_descriptor());
                physics.set_world_transform(handle, &self.transform);
                self.collision_handle = Some(handle);
            }
            (false, true) => {
                if let Some(handle) = self.collision_handle.take() {
                    physics.remove_collider(handle);
                }
            }
            (false, false) => {
                if let Some(handle) = self.collision_handle {
                    physics.remove_collider(handle);
                    physics.add_collider(handle, self.mesh_front.triangle_mesh_descriptor());
                    physics.set_world_transform(handle, &self.transform);
                }
            }
            (true, true) => {}
        }
    }

    pub fn render(&self, renderer: &mut impl RendererCollaborator) {
        renderer.set_model_transform(&self.transform);
        renderer.render(&self.mesh_front);
    }

    /// Releases collision registration and clears the back buffer. Does not
    /// touch `blocks` or `loaded` — the caller is responsible for persisting
    /// via `unload` first if needed.
    pub fn shutdown(&mut self, physics: &mut impl PhysicsCollaborator) {
        if let Some(handle) = self.collision_handle.take() {
            physics.remove_collider(handle);
        }
        self.mesh_back.clear();
    }
}

/// Greedy mesher over a single chunk's block field. Sweeps each of the six
/// face directions independently; within a direction, sweeps layer by layer
/// along the perpendicular axis, builds a visibility mask for that layer,
/// then greedily expands maximal rectangles out of the mask.
struct GreedyMesher<'c> {
    blocks: &'c [BlockType; CHUNK_VOLUME],
    mask: Box<[BlockType]>,
}

const SIZE: i32 = CHUNK_SIZE as i32;

impl<'c> GreedyMesher<'c> {
    fn new(blocks: &'c [BlockType; CHUNK_VOLUME]) -> Self {
        Self {
            blocks,
            mask: vec![BlockType::NONE; CHUNK_SIZE * CHUNK_SIZE].into_boxed_slice(),
        }
    }

    fn block_at(&self, axis: usize, u: i32, v: i32, layer: i32) -> BlockType {
        if !(0..SIZE).contains(&u) || !(0..SIZE).contains(&v) || !(0..SIZE).contains(&layer) {
            return BlockType::NONE;
        }
        let mut coords = [0i32; 3];
        coords[axis] = layer;
        coords[(axis + 1) % 3] = u;
        coords[(axis + 2) % 3] = v;
        self.blocks[local_index(coords[0] as usize, coords[1] as usize, coords[2] as usize)]
    }

    fn mask_at(&self, u: i32, v: i32) -> BlockType {
        self.mask[(u * SIZE + v) as usize]
    }

    fn set_mask(&mut self, u: i32, v: i32, block: BlockType) {
        self.mask[(u * SIZE + v) as usize] = block;
    }

    /// Fills the mask for one layer along `axis`, comparing the cell just
    /// behind the plane (`layer - 1` along `axis`) against the cell just
    /// ahead of it (`layer` along `axis`). The face is hidden iff the two
    /// cells are equal (including both empty); otherwise the mask holds
    /// whichever side is visible for this direction (the `+axis` side for a
    /// back face, the `-axis` side otherwise).
    fn fill_mask(&mut self, axis: usize, layer: i32, back_face: bool) {
        for u in 0..SIZE {
            for v in 0..SIZE {
                let behind = self.block_at(axis, u, v, layer - 1);
                let ahead = self.block_at(axis, u, v, layer);
                let value = if behind == ahead {
                    BlockType::NONE
                } else if back_face {
                    ahead
                } else {
                    behind
                };
                self.set_mask(u, v, value);
            }
        }
    }

    fn pick_pos(&self) -> Option<(i32, i32)> {
        for u in 0..SIZE {
            for v in 0..SIZE {
                if self.mask_at(u, v).is_some() {
                    return Some((u, v));
                }
            }
        }
        None
    }

    fn expand_right(&self, u: i32, v: i32) -> (i32, i32) {
        let start = self.mask_at(u, v);
        let mut end = u;
        while end + 1 < SIZE && self.mask_at(end + 1, v) == start {
            end += 1;
        }
        (u, end)
    }

    fn expand_down(&self, u0: i32, u1: i32, v: i32) -> i32 {
        let start = self.mask_at(u0, v);
        let mut end = v;
        'outer: while end + 1 < SIZE {
            for u in u0..=u1 {
                if self.mask_at(u, end + 1) != start {
                    break 'outer;
                }
            }
            end += 1;
        }
        end
    }

    fn mark_visited(&mut self, u0: i32, u1: i32, v0: i32, v1: i32) {
        for u in u0..=u1 {
            for v in v0..=v1 {
                self.set_mask(u, v, BlockType::NONE);
            }
        }
    }

    fn corners(axis: usize, layer: i32, u0: i32, u1: i32, v0: i32, v1: i32) -> [[u32; 3]; 4] {
        let make = |u: i32, v: i32| -> [u32; 3] {
            let mut coords = [0i32; 3];
            coords[axis] = layer;
            coords[(axis + 1) % 3] = u;
            coords[(axis + 2) % 3] = v;
            [coords[0] as u32, coords[1] as u32, coords[2] as u32]
        };
        [
            make(u0, v0),
            make(u1 + 1, v0),
            make(u1 + 1, v1 + 1),
            make(u0, v1 + 1),
        ]
    }

    fn mesh_into(&mut self, mesh: &mut ChunkMesh) {
        for &side in &Side::ALL {
            let axis = side.axis() as usize;
            let back_face = !side.facing_positive();
            for layer in 0..=SIZE {
                self.fill_mask(axis, layer, back_face);
                while let Some((u, v)) = self.pick_pos() {
                    let block = self.mask_at(u, v);
                    let (u0, u1) = self.expand_right(u, v);
                    let v1 = self.expand_down(u0, u1, v);
                    self.mark_visited(u0, u1, v, v1);
                    let quad = Quad {
                        corners: Self::corners(axis, layer, u0, u1, v, v1),
                        block,
                        is_back_face: back_face,
                    };
                    mesh.push_quad(&quad, side);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks_of(ty: u8) -> Box<[BlockType; CHUNK_VOLUME]> {
        vec![BlockType(ty); CHUNK_VOLUME]
            .into_boxed_slice()
            .try_into()
            .ok()
            .unwrap()
    }

    #[test]
    fn load_of_all_none_reports_empty() {
        let mut chunk = Chunk::new();
        let bytes = encode(&blocks_of(0));
        let empty_hint = chunk.load(&bytes, point![0, 0, 0]).unwrap();
        assert!(empty_hint);
        assert!(chunk.is_loaded());
    }

    #[test]
    fn load_of_solid_reports_non_empty() {
        let mut chunk = Chunk::new();
        let bytes = encode(&blocks_of(9));
        let empty_hint = chunk.load(&bytes, point![0, 0, 0]).unwrap();
        assert!(!empty_hint);
    }

    #[test]
    fn all_none_chunk_meshes_to_nothing() {
        let mut chunk = Chunk::new();
        chunk.load(&encode(&blocks_of(0)), point![0, 0, 0]).unwrap();
        chunk.rebuild_mesh();
        assert_eq!(chunk.mesh_back.indices.len(), 0);
    }

    #[test]
    fn solid_chunk_meshes_to_six_full_face_quads() {
        let mut chunk = Chunk::new();
        chunk.load(&encode(&blocks_of(1)), point![0, 0, 0]).unwrap();
        chunk.rebuild_mesh();
        // 6 quads * 6 indices each (2 triangles).
        assert_eq!(chunk.mesh_back.indices.len(), 6 * 6);
        assert_eq!(chunk.mesh_back.vertices.len(), 6 * 4);
    }

    #[test]
    fn single_isolated_block_exposes_all_six_faces() {
        // With no neighbor-chunk awareness, an isolated block's neighbors are
        // all empty (whether they fall outside the chunk or just elsewhere
        // inside it), so every face is visible.
        let mut blocks = blocks_of(0);
        blocks[local_index(0, 0, 0)] = BlockType(3);
        let mut chunk = Chunk::new();
        chunk.load(&encode(&blocks), point![0, 0, 0]).unwrap();
        chunk.rebuild_mesh();
        assert_eq!(chunk.mesh_back.indices.len(), 6 * 6);
    }

    #[test]
    fn adjacent_different_type_blocks_still_emit_their_shared_face() {
        // Two touching solid cells of different types are never "equal", so
        // the shared face between them must still be meshed (once per side,
        // each carrying its own block type) rather than culled the way two
        // touching cells of the *same* type would be.
        let mut blocks = blocks_of(0);
        blocks[local_index(5, 5, 5)] = BlockType(1);
        blocks[local_index(6, 5, 5)] = BlockType(2);
        let mut chunk = Chunk::new();
        chunk.load(&encode(&blocks), point![0, 0, 0]).unwrap();
        chunk.rebuild_mesh();

        let shared_plane: Vec<_> = chunk
            .mesh_back
            .vertices
            .iter()
            .filter(|v| v.position[0] == 6)
            .collect();
        assert!(shared_plane.iter().any(|v| v.block == BlockType(1)));
        assert!(shared_plane.iter().any(|v| v.block == BlockType(2)));
    }

    #[test]
    fn rebuild_mesh_is_idempotent() {
        let mut blocks = blocks_of(0);
        blocks[local_index(5, 5, 5)] = BlockType(2);
        let mut chunk = Chunk::new();
        chunk.load(&encode(&blocks), point![0, 0, 0]).unwrap();
        chunk.rebuild_mesh();
        let first_indices = chunk.mesh_back.indices.clone();
        chunk.rebuild_mesh();
        assert_eq!(chunk.mesh_back.indices, first_indices);
    }

    #[test]
    fn unload_then_load_round_trips_blocks() {
        let mut blocks = blocks_of(0);
        blocks[local_index(1, 2, 3)] = BlockType(4);
        let mut chunk = Chunk::new();
        chunk.load(&encode(&blocks), point![0, 0, 0]).unwrap();
        let bytes = chunk.unload();
        assert!(!chunk.is_loaded());
        let mut chunk2 = Chunk::new();
        chunk2.load(&bytes, point![0, 0, 0]).unwrap();
        assert_eq!(chunk2.get_block(point![1, 2, 3]), BlockType(4));
    }
}
