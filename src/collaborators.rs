//! Trait boundaries for everything this crate treats as an external system:
//! the on-disk region-file container, the physics/collision backend, the
//! render backend, and the observer (camera) driving the working set. None
//! of these traits are implemented here — a host binary supplies real
//! implementations; tests supply fakes.

use nalgebra::Point3;

use crate::{chunk::ChunkPosition, error::RegionFileError, transform::Transform};

/// A handle into whatever the physics collaborator uses to identify a
/// registered collider. Opaque to this crate.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ColliderHandle(pub u64);

/// A view over a chunk's mesh vertex/index buffers suitable for building a
/// triangle-mesh collision shape, mirroring the physics backend's expected
/// stride: 12 bytes (three `f32`s) per vertex, 12 bytes (three `u32`s) per
/// triangle's indices.
pub struct TriangleMeshDescriptor<'a> {
    pub vertex_base: &'a [f32],
    pub vertex_stride: usize,
    pub vertex_count: usize,
    pub index_base: &'a [u32],
    pub index_stride: usize,
    pub triangle_count: usize,
}

/// Persists and retrieves the run-length-encoded block field for a chunk
/// position. A region file groups many chunk positions together and is
/// opened/closed by reference count as chunks enter and leave the working
/// set, not by chunk.
pub trait RegionFileCollaborator {
    fn set_world(&mut self, name: &str) -> Result<(), RegionFileError>;
    fn world_size(&self) -> i32;

    fn add_region_file_reference(&mut self, chunk_pos: ChunkPosition);
    fn remove_region_file_reference(&mut self, chunk_pos: ChunkPosition);

    fn chunk_data(&mut self, chunk_pos: ChunkPosition) -> Result<Vec<u8>, RegionFileError>;
    fn write_chunk_data(
        &mut self,
        chunk_pos: ChunkPosition,
        bytes: &[u8],
    ) -> Result<(), RegionFileError>;
}

/// Registers and unregisters collision shapes built from chunk meshes.
/// Called exclusively from the foreground swap drain.
pub trait PhysicsCollaborator {
    fn add_collider(&mut self, handle: ColliderHandle, mesh: TriangleMeshDescriptor<'_>);
    fn remove_collider(&mut self, handle: ColliderHandle);
    fn set_world_transform(&mut self, handle: ColliderHandle, transform: &Transform);
}

/// Culls against the observer's current view frustum.
pub trait Frustum {
    fn is_uniform_aabb_visible(&self, center: Point3<f32>, side: f32) -> bool;
}

/// Uploads and draws a chunk's front mesh.
pub trait RendererCollaborator {
    fn set_model_transform(&mut self, transform: &Transform);
    fn render(&mut self, mesh: &crate::chunk::ChunkMesh);
}

/// Read-only access to the thing the working set streams chunks around.
pub trait ObserverCollaborator {
    fn position(&self) -> Point3<f32>;
    fn frustum(&self) -> &dyn Frustum;
}
