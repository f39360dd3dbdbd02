//! The chunk working-set manager: a fixed-capacity array of [`Chunk`]
//! slots streamed around a moving observer by a background worker thread,
//! with buffer hand-off back to the foreground through a swap queue.
//!
//! Grounded on the authoritative (threaded) `ChunkManager` from the
//! original engine — the single-threaded, noise-seeded variant in the same
//! source tree is a historical artifact and is not reflected here (see
//! DESIGN.md).

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
};

use nalgebra::Point3;
use parking_lot::Mutex;

use crate::{
    aabb::Aabb,
    chunk::{Chunk, ChunkPosition},
    collaborators::{
        ColliderHandle, ObserverCollaborator, PhysicsCollaborator, RegionFileCollaborator,
        RendererCollaborator,
    },
    config::{EngineConfig, CHUNK_SIZE},
    util::{floor_div, floor_mod, ChannelPair},
    block::BlockType,
};

/// A pending buffer hand-off: which slot finished meshing, and which
/// position it was meshing for (so a stale entry can be recognized and
/// dropped if the slot gets reused before the foreground drains it).
#[derive(Copy, Clone, Debug)]
struct SwapEntry {
    slot: usize,
    position: ChunkPosition,
}

struct Shared {
    slots: Vec<Mutex<Chunk>>,
    slot_positions: Vec<Mutex<ChunkPosition>>,
    rebuild_set: Mutex<VecDeque<usize>>,
    rebuild_pending: Mutex<std::collections::HashSet<usize>>,
    swap_queue: Mutex<VecDeque<SwapEntry>>,
    refreshing: AtomicBool,
    must_shutdown: AtomicBool,
}

impl Shared {
    fn new(pool_size: usize) -> Self {
        let mut slots = Vec::with_capacity(pool_size);
        let mut slot_positions = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            slots.push(Mutex::new(Chunk::new()));
            slot_positions.push(Mutex::new(ChunkPosition::SENTINEL));
        }
        Self {
            slots,
            slot_positions,
            rebuild_set: Mutex::new(VecDeque::new()),
            rebuild_pending: Mutex::new(std::collections::HashSet::new()),
            swap_queue: Mutex::new(VecDeque::new()),
            refreshing: AtomicBool::new(false),
            must_shutdown: AtomicBool::new(false),
        }
    }

    fn slot_index(&self, pos: ChunkPosition) -> usize {
        let s = self.slots.len() as i64;
        let h = (pos.x as i64).wrapping_mul(73_856_093)
            ^ (pos.y as i64).wrapping_mul(19_349_663)
            ^ (pos.z as i64).wrapping_mul(83_492_791);
        h.rem_euclid(s) as usize
    }

    fn remove_swap_entries_for_slot(&self, slot: usize) {
        self.swap_queue.lock().retain(|entry| entry.slot != slot);
    }

    fn enqueue_rebuild(&self, slot: usize) {
        let mut pending = self.rebuild_pending.lock();
        if pending.insert(slot) {
            self.rebuild_set.lock().push_back(slot);
        }
    }
}

/// Worker-thread loop body: rebuilds dirty slots, then (unless a visibility
/// sweep is in progress) loads up to `chunks_to_load_per_frame` queued
/// positions, persisting whatever previously occupied a reused slot first.
fn worker_loop<R: RegionFileCollaborator>(
    shared: Arc<Shared>,
    load_rx: crossbeam_channel::Receiver<ChunkPosition>,
    mut region: R,
    chunks_to_load_per_frame: usize,
) -> R {
    while !shared.must_shutdown.load(Ordering::Acquire) {
        drain_rebuild_set(&shared);

        if !shared.refreshing.load(Ordering::Acquire) {
            for _ in 0..chunks_to_load_per_frame {
                let pos = match load_rx.try_recv() {
                    Ok(pos) => pos,
                    Err(_) => break,
                };
                load_one(&shared, &mut region, pos);
            }
        }

        if load_rx.is_empty() && shared.rebuild_set.lock().is_empty() {
            std::thread::yield_now();
        }
    }
    region
}

fn drain_rebuild_set(shared: &Shared) {
    loop {
        let slot = {
            let mut queue = shared.rebuild_set.lock();
            match queue.pop_front() {
                Some(slot) => {
                    shared.rebuild_pending.lock().remove(&slot);
                    slot
                }
                None => break,
            }
        };
        let position = *shared.slot_positions[slot].lock();
        if position.is_sentinel() {
            continue;
        }
        shared.slots[slot].lock().rebuild_mesh();
        shared.remove_swap_entries_for_slot(slot);
        shared
            .swap_queue
            .lock()
            .push_back(SwapEntry { slot, position });
    }
}

/// Enqueues every position in the XZ slab `y` within `center +- d`, skipping
/// positions outside `[0, world_size)` and positions whose target slot
/// already holds them.
fn enqueue_plane(
    shared: &Shared,
    load_tx: &crossbeam_channel::Sender<ChunkPosition>,
    center: ChunkPosition,
    y: i32,
    d: i32,
    world_size: i32,
) {
    if !(0..world_size).contains(&y) {
        return;
    }
    for x in (center.x - d)..=(center.x + d) {
        if !(0..world_size).contains(&x) {
            continue;
        }
        for z in (center.z - d)..=(center.z + d) {
            if !(0..world_size).contains(&z) {
                continue;
            }
            let pos = ChunkPosition::new(x, y, z);
            let slot = shared.slot_index(pos);
            if *shared.slot_positions[slot].lock() != pos {
                let _ = load_tx.send(pos);
            }
        }
    }
}

fn load_one<R: RegionFileCollaborator>(shared: &Shared, region: &mut R, pos: ChunkPosition) {
    let slot = shared.slot_index(pos);
    let previous = *shared.slot_positions[slot].lock();

    {
        let mut chunk = shared.slots[slot].lock();
        if chunk.is_loaded() {
            log::debug!("evicting chunk {:?} from slot {} for {:?}", previous, slot, pos);
            let bytes = chunk.unload();
            if let Err(err) = region.write_chunk_data(previous, &bytes) {
                log::error!("failed to persist evicted chunk {:?}: {}", previous, err);
            }
            region.remove_region_file_reference(previous);
        }
    }

    region.add_region_file_reference(pos);
    match region.chunk_data(pos) {
        Ok(bytes) => {
            let mut chunk = shared.slots[slot].lock();
            match chunk.load(&bytes, pos.world_origin()) {
                Ok(empty_hint) => {
                    log::debug!("loaded chunk {:?} into slot {} (empty={})", pos, slot, empty_hint);
                    if !empty_hint {
                        chunk.rebuild_mesh();
                    }
                    drop(chunk);
                    shared.remove_swap_entries_for_slot(slot);
                    shared
                        .swap_queue
                        .lock()
                        .push_back(SwapEntry { slot, position: pos });
                }
                Err(err) => {
                    log::warn!("rejecting corrupt chunk data for {:?}: {}", pos, err);
                    region.remove_region_file_reference(pos);
                }
            }
        }
        Err(err) => {
            log::warn!("could not read chunk data for {:?}: {}", pos, err);
            region.remove_region_file_reference(pos);
        }
    }
}

/// Streams chunks around a moving observer. Generic over the region-file
/// collaborator because that's the only collaborator the worker thread
/// needs to own; physics and renderer collaborators are only ever touched
/// from the foreground and are passed as arguments to the methods that need
/// them.
pub struct WorkingSetManager<R: RegionFileCollaborator + Send + 'static> {
    config: EngineConfig,
    world_size: i32,
    shared: Arc<Shared>,
    load_tx: crossbeam_channel::Sender<ChunkPosition>,
    load_rx_for_respawn: Option<crossbeam_channel::Receiver<ChunkPosition>>,
    worker: Option<JoinHandle<R>>,
    last_observer_chunk: Option<ChunkPosition>,
    render_list: Vec<usize>,
}

impl<R: RegionFileCollaborator + Send + 'static> WorkingSetManager<R> {
    /// Builds a manager with no world loaded and no worker thread running.
    /// Call [`Self::load_world`] to bind a world and start streaming.
    pub fn new(config: EngineConfig) -> Self {
        let pool_size = config.pool_size();
        let ChannelPair { rx, tx } = ChannelPair::new();
        Self {
            config,
            world_size: 0,
            shared: Arc::new(Shared::new(pool_size)),
            load_tx: tx,
            load_rx_for_respawn: Some(rx),
            worker: None,
            last_observer_chunk: None,
            render_list: Vec::new(),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.shared.slots.len()
    }

    /// Stops any running worker (returning its region collaborator), resets
    /// every slot to unoccupied, binds `region` to `name`, and starts a
    /// fresh worker thread.
    pub fn load_world(&mut self, name: &str, mut region: R) -> anyhow::Result<()> {
        self.stop_worker();
        region.set_world(name)?;
        self.world_size = region.world_size();

        for position in &self.shared.slot_positions {
            *position.lock() = ChunkPosition::SENTINEL;
        }
        self.last_observer_chunk = None;
        self.spawn_worker(region);
        Ok(())
    }

    fn spawn_worker(&mut self, region: R) {
        self.shared.must_shutdown.store(false, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let load_rx = self
            .load_rx_for_respawn
            .take()
            .expect("respawn receiver consumed without being restored");
        let chunks_to_load_per_frame = self.config.chunks_to_load_per_frame;
        self.worker = Some(std::thread::spawn(move || {
            worker_loop(shared, load_rx, region, chunks_to_load_per_frame)
        }));
    }

    fn stop_worker(&mut self) -> Option<R> {
        self.shared.must_shutdown.store(true, Ordering::SeqCst);
        let worker = self.worker.take()?;
        let (tx, rx) = crossbeam_channel::unbounded();
        self.load_tx = tx;
        self.load_rx_for_respawn = Some(rx);
        let region = worker.join().expect("worker thread panicked");
        log::debug!("worker thread stopped");
        Some(region)
    }

    /// Changes the view distance, reallocating the slot array. Requires a
    /// running world; rebinds the retrieved region collaborator to a fresh
    /// worker once the new array is in place.
    pub fn set_view_distance(&mut self, view_distance: i32) {
        let region = match self.stop_worker() {
            Some(region) => region,
            None => return,
        };
        self.config.view_distance = view_distance;
        self.shared = Arc::new(Shared::new(self.config.pool_size()));
        self.last_observer_chunk = None;
        self.spawn_worker(region);
    }

    fn world_chunk_pos(&self, world: Point3<f32>) -> ChunkPosition {
        ChunkPosition::new(
            floor_div(world.x as i32, CHUNK_SIZE as i32),
            floor_div(world.y as i32, CHUNK_SIZE as i32),
            floor_div(world.z as i32, CHUNK_SIZE as i32),
        )
    }

    /// Foreground tick: recomputes the visible set if the observer crossed
    /// a chunk boundary, then drains the swap queue.
    pub fn update(&mut self, observer: &impl ObserverCollaborator, physics: &mut impl PhysicsCollaborator) {
        let observer_chunk = self.world_chunk_pos(observer.position());
        if self.last_observer_chunk != Some(observer_chunk) {
            self.update_visible_list(observer_chunk);
            self.last_observer_chunk = Some(observer_chunk);
        }
        self.drain_swap_queue(physics);
    }

    /// The visibility sweep: XZ-plane-first at the observer's height, then
    /// alternating `y = cy - v` / `y = cy + v` planes outward, one
    /// `view_distance` in radius. Brackets the whole sweep with `refreshing`
    /// so the worker doesn't start consuming the freshly repopulated
    /// `load_queue` until it's fully written.
    ///
    /// The source clears its load list outright before repopulating it; here
    /// the receiving end lives on the worker thread, so any already-sent
    /// position for a slot that's no longer relevant is left in the channel.
    /// That's harmless: the worker's `slot_positions` check on dequeue means
    /// a stale send just causes one redundant (but correct) reload rather
    /// than a bug.
    fn update_visible_list(&mut self, center: ChunkPosition) {
        self.shared.refreshing.store(true, Ordering::SeqCst);

        let d = self.config.view_distance;
        enqueue_plane(&self.shared, &self.load_tx, center, center.y, d, self.world_size);
        for v in 1..=(d / 2).max(0) {
            enqueue_plane(&self.shared, &self.load_tx, center, center.y - v, d, self.world_size);
            enqueue_plane(&self.shared, &self.load_tx, center, center.y + v, d, self.world_size);
        }

        self.shared.refreshing.store(false, Ordering::SeqCst);
    }

    /// Foreground-only. Promotes up to `mesh_swaps_per_frame` completed back
    /// buffers to front buffers and reconciles collision registration.
    fn drain_swap_queue(&mut self, physics: &mut impl PhysicsCollaborator) {
        for _ in 0..self.config.mesh_swaps_per_frame {
            if !self.swap_one(physics) {
                break;
            }
        }
    }

    /// Foreground-only, uncapped. Promotes every completed back buffer
    /// currently in the swap queue, including ones the worker enqueues while
    /// this runs. Used by `shutdown`, which must not leave a loaded-but-never-
    /// committed slot at the sentinel position (see `shutdown`'s doc comment).
    fn drain_swap_queue_fully(&mut self, physics: &mut impl PhysicsCollaborator) {
        while self.swap_one(physics) {}
    }

    /// Promotes a single completed back buffer, if one is queued. Returns
    /// `false` if the swap queue was empty.
    fn swap_one(&mut self, physics: &mut impl PhysicsCollaborator) -> bool {
        let entry = match self.shared.swap_queue.lock().pop_front() {
            Some(entry) => entry,
            None => return false,
        };
        let handle = ColliderHandle(entry.slot as u64);
        self.shared.slots[entry.slot]
            .lock()
            .swap_mesh_buffer(handle, physics);
        *self.shared.slot_positions[entry.slot].lock() = entry.position;
        true
    }

    /// Recomputes the render list by frustum-culling every non-empty slot,
    /// then renders each survivor.
    pub fn render(&mut self, observer: &impl ObserverCollaborator, renderer: &mut impl RendererCollaborator) {
        self.render_list.clear();
        let frustum = observer.frustum();
        for (slot, position_lock) in self.shared.slot_positions.iter().enumerate() {
            let position = *position_lock.lock();
            if position.is_sentinel() {
                continue;
            }
            let chunk = self.shared.slots[slot].lock();
            if chunk.is_empty() {
                continue;
            }
            let origin = position.world_origin();
            let half = CHUNK_SIZE as f32 / 2.0;
            let center = Point3::new(
                origin.x as f32 + half,
                origin.y as f32 + half,
                origin.z as f32 + half,
            );
            let bounds = Aabb::centered(center, CHUNK_SIZE as f32);
            if frustum.is_uniform_aabb_visible(bounds.center(), bounds.dimensions().x) {
                self.render_list.push(slot);
            }
        }

        for &slot in &self.render_list {
            self.shared.slots[slot].lock().render(renderer);
        }
    }

    fn split_world_pos(&self, world: Point3<i32>) -> Option<(ChunkPosition, Point3<i32>)> {
        let bound = self.world_size * CHUNK_SIZE as i32;
        if !(0..bound).contains(&world.x) || !(0..bound).contains(&world.y) || !(0..bound).contains(&world.z) {
            return None;
        }
        let chunk_pos = ChunkPosition::new(
            floor_div(world.x, CHUNK_SIZE as i32),
            floor_div(world.y, CHUNK_SIZE as i32),
            floor_div(world.z, CHUNK_SIZE as i32),
        );
        let local = Point3::new(
            floor_mod(world.x, CHUNK_SIZE as i32),
            floor_mod(world.y, CHUNK_SIZE as i32),
            floor_mod(world.z, CHUNK_SIZE as i32),
        );
        Some((chunk_pos, local))
    }

    pub fn get_block(&self, world: Point3<i32>) -> BlockType {
        let (chunk_pos, local) = match self.split_world_pos(world) {
            Some(split) => split,
            None => return BlockType::NONE,
        };
        let slot = self.shared.slot_index(chunk_pos);
        if *self.shared.slot_positions[slot].lock() != chunk_pos {
            return BlockType::NONE;
        }
        self.shared.slots[slot].lock().get_block(local)
    }

    pub fn set_block(&mut self, world: Point3<i32>, block: BlockType) {
        self.mutate_block(world, |chunk, local| chunk.set_block(local, block));
    }

    pub fn destroy_block(&mut self, world: Point3<i32>) {
        self.mutate_block(world, |chunk, local| chunk.destroy_block(local));
    }

    fn mutate_block(&mut self, world: Point3<i32>, apply: impl FnOnce(&mut Chunk, Point3<i32>)) {
        let (chunk_pos, local) = match self.split_world_pos(world) {
            Some(split) => split,
            None => return,
        };
        let slot = self.shared.slot_index(chunk_pos);
        if *self.shared.slot_positions[slot].lock() != chunk_pos {
            return;
        }
        apply(&mut self.shared.slots[slot].lock(), local);
        self.shared.enqueue_rebuild(slot);
    }

    /// Stops the worker, drains the swap queue to completion (not just one
    /// capped pass — the worker is already stopped, so nothing will add to it
    /// after this call, and every chunk it loaded must land at its real slot
    /// position before the persist loop below runs, or it's skipped as if it
    /// were never resident), persists every resident chunk, and returns the
    /// region collaborator.
    pub fn shutdown(&mut self, physics: &mut impl PhysicsCollaborator) -> Option<R> {
        let mut region = self.stop_worker()?;
        self.drain_swap_queue_fully(physics);
        for slot in 0..self.shared.slots.len() {
            let position = *self.shared.slot_positions[slot].lock();
            if position.is_sentinel() {
                continue;
            }
            let mut chunk = self.shared.slots[slot].lock();
            if chunk.is_loaded() {
                let bytes = chunk.unload();
                if let Err(err) = region.write_chunk_data(position, &bytes) {
                    log::error!("failed to persist chunk {:?} on shutdown: {}", position, err);
                }
                region.remove_region_file_reference(position);
            }
            chunk.shutdown(physics);
        }
        self.shared.rebuild_set.lock().clear();
        self.shared.rebuild_pending.lock().clear();
        self.shared.swap_queue.lock().clear();
        Some(region)
    }

    #[cfg(test)]
    fn slot_position(&self, slot: usize) -> ChunkPosition {
        *self.shared.slot_positions[slot].lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::RegionFileError, transform::Transform};
    use std::{
        collections::HashMap,
        sync::{Arc as StdArc, Mutex as StdMutex},
    };

    struct FakeFrustum;
    impl crate::collaborators::Frustum for FakeFrustum {
        fn is_uniform_aabb_visible(&self, _center: Point3<f32>, _side: f32) -> bool {
            true
        }
    }

    struct FakeObserver {
        position: Point3<f32>,
        frustum: FakeFrustum,
    }
    impl ObserverCollaborator for FakeObserver {
        fn position(&self) -> Point3<f32> {
            self.position
        }
        fn frustum(&self) -> &dyn crate::collaborators::Frustum {
            &self.frustum
        }
    }

    struct FakePhysics {
        registered: HashMap<u64, ()>,
    }
    impl PhysicsCollaborator for FakePhysics {
        fn add_collider(&mut self, handle: ColliderHandle, _mesh: crate::collaborators::TriangleMeshDescriptor<'_>) {
            self.registered.insert(handle.0, ());
        }
        fn remove_collider(&mut self, handle: ColliderHandle) {
            self.registered.remove(&handle.0);
        }
        fn set_world_transform(&mut self, _handle: ColliderHandle, _transform: &Transform) {}
    }

    #[derive(Clone, Default)]
    struct FakeRegion {
        data: StdArc<StdMutex<HashMap<(i32, i32, i32), Vec<u8>>>>,
        world_size: i32,
    }

    impl RegionFileCollaborator for FakeRegion {
        fn set_world(&mut self, _name: &str) -> Result<(), RegionFileError> {
            self.world_size = 4;
            Ok(())
        }
        fn world_size(&self) -> i32 {
            self.world_size
        }
        fn add_region_file_reference(&mut self, _chunk_pos: ChunkPosition) {}
        fn remove_region_file_reference(&mut self, _chunk_pos: ChunkPosition) {}
        fn chunk_data(&mut self, chunk_pos: ChunkPosition) -> Result<Vec<u8>, RegionFileError> {
            let key = (chunk_pos.x, chunk_pos.y, chunk_pos.z);
            let data = self.data.lock().unwrap();
            match data.get(&key) {
                Some(bytes) => Ok(bytes.clone()),
                None => Ok(crate::codec::encode(&vec![BlockType::NONE; crate::config::CHUNK_VOLUME]
                    .into_boxed_slice()
                    .try_into()
                    .ok()
                    .unwrap())),
            }
        }
        fn write_chunk_data(&mut self, chunk_pos: ChunkPosition, bytes: &[u8]) -> Result<(), RegionFileError> {
            let key = (chunk_pos.x, chunk_pos.y, chunk_pos.z);
            self.data.lock().unwrap().insert(key, bytes.to_vec());
            Ok(())
        }
    }

    fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..2000 {
            if condition() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        panic!("condition never became true");
    }

    #[test]
    fn streams_chunks_around_the_observer_and_renders_them() {
        let _ = env_logger::try_init();
        let config = EngineConfig {
            view_distance: 1,
            chunks_to_load_per_frame: 64,
            mesh_swaps_per_frame: 64,
        };
        let mut manager = WorkingSetManager::new(config);
        manager.load_world("test", FakeRegion::default()).unwrap();

        let observer = FakeObserver {
            position: Point3::new(16.0, 16.0, 16.0),
            frustum: FakeFrustum,
        };
        let mut physics = FakePhysics {
            registered: HashMap::new(),
        };

        manager.update(&observer, &mut physics);
        wait_until(|| manager.slot_position(manager.shared.slot_index(ChunkPosition::new(0, 0, 0))) == ChunkPosition::new(0, 0, 0));
        manager.update(&observer, &mut physics);

        assert_eq!(manager.get_block(Point3::new(16, 16, 16)), BlockType::NONE);

        manager.shutdown(&mut physics);
    }

    #[test]
    fn mutating_a_block_enqueues_its_slot_for_rebuild() {
        let config = EngineConfig {
            view_distance: 1,
            chunks_to_load_per_frame: 64,
            mesh_swaps_per_frame: 64,
        };
        let mut manager = WorkingSetManager::new(config);
        manager.load_world("test", FakeRegion::default()).unwrap();
        let observer = FakeObserver {
            position: Point3::new(16.0, 16.0, 16.0),
            frustum: FakeFrustum,
        };
        let mut physics = FakePhysics {
            registered: HashMap::new(),
        };
        manager.update(&observer, &mut physics);
        wait_until(|| manager.slot_position(manager.shared.slot_index(ChunkPosition::new(0, 0, 0))) == ChunkPosition::new(0, 0, 0));

        manager.set_block(Point3::new(5, 5, 5), BlockType(3));
        let slot = manager.shared.slot_index(ChunkPosition::new(0, 0, 0));
        assert!(manager.shared.rebuild_pending.lock().contains(&slot));

        manager.shutdown(&mut physics);
    }
}
