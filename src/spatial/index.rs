use std::ops::Range;

use dashmap::DashMap;
use glam::Vec3;

use crate::{error::Error, settings::SpatialSettings};

use super::{
    key::{CellKey, CellKeySpace},
    thread_pool::InsertThreadPool,
};

// -------------------------------------------------------------------------------------------------

/// Kind of an entity in a [`BucketIndex`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
)]
#[repr(u8)]
pub enum EntityCategory {
    /// A body which takes part in physics collisions.
    #[default]
    PhysicsEntity,
    /// A moving unit.
    Unit,
    /// A static target.
    Target,
}

/// Opaque handle of an entity in a [`BucketIndex`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle(pub u64);

/// An entity's state in a [`BucketIndex`] cycle.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct EntityRecord {
    pub entity: EntityHandle,
    /// World space position.
    pub position: Vec3,
    pub category: EntityCategory,
}

/// Lifecycle state of a [`BucketIndex`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum BucketIndexState {
    /// Cleared: all queries return nothing.
    #[default]
    Empty,
    /// All entities of the last rebuild got inserted.
    Populated,
}

// -------------------------------------------------------------------------------------------------

/// Insert the records in the given range into the bucket map. Bucket entries are indices into
/// the records slice.
pub(crate) fn insert_records(
    records: &[EntityRecord],
    range: Range<usize>,
    buckets: &DashMap<CellKey, Vec<u32>>,
    key_space: &CellKeySpace,
) {
    for index in range {
        let key = key_space.key_of(records[index].position);
        buckets.entry(key).or_default().push(index as u32);
    }
}

// -------------------------------------------------------------------------------------------------

/// Groups moving entities into fixed size spatial cells for cheap proximity queries.
///
/// The index gets rebuilt from scratch every cycle: [`rebuild`](Self::rebuild) clears all
/// buckets, grows the index's capacity when needed and then inserts all entities, concurrently
/// on a worker pool for large entity counts. Query results are valid until the next rebuild
/// starts and must not be retained across cycles.
///
/// Capacity grows to the high-water mark of seen entities and never shrinks.
pub struct BucketIndex {
    key_space: CellKeySpace,
    records: Vec<EntityRecord>,
    buckets: DashMap<CellKey, Vec<u32>>,
    capacity: usize,
    state: BucketIndexState,
    workers: Option<InsertThreadPool>,
}

impl Default for BucketIndex {
    fn default() -> Self {
        Self::new(&SpatialSettings::default())
    }
}

impl BucketIndex {
    /// Create a new, empty index. Spawns insert worker threads when the settings ask for more
    /// than one worker.
    pub fn new(settings: &SpatialSettings) -> Self {
        let workers = if settings.worker_threads() >= 2 {
            Some(InsertThreadPool::new(settings.worker_threads()))
        } else {
            None
        };
        Self {
            key_space: CellKeySpace::new(settings.cell_size()),
            records: Vec::new(),
            buckets: DashMap::new(),
            capacity: 0,
            state: BucketIndexState::Empty,
            workers,
        }
    }

    /// Use the given key space instead of the default one for the settings' cell size.
    /// Clears the index.
    pub fn with_key_space(mut self, key_space: CellKeySpace) -> Self {
        self.key_space = key_space;
        self.clear();
        self
    }

    /// The key space, which maps positions to cell keys.
    pub fn key_space(&self) -> &CellKeySpace {
        &self.key_space
    }

    /// Key of the cell the given position lies in.
    pub fn key_of(&self, position: Vec3) -> CellKey {
        self.key_space.key_of(position)
    }

    pub fn state(&self) -> BucketIndexState {
        self.state
    }

    /// Number of entities the index can hold without growing.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entities in the index.
    pub fn len(&self) -> usize {
        match self.state {
            BucketIndexState::Empty => 0,
            BucketIndexState::Populated => self.records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of worker threads which insert entities concurrently.
    pub fn worker_threads(&self) -> usize {
        self.workers
            .as_ref()
            .map(|workers| workers.thread_count())
            .unwrap_or(0)
    }

    /// Remove all entities. Keeps allocated capacity for cells which got used in the last
    /// cycle and drops cells which stayed empty.
    pub fn clear(&mut self) {
        self.state = BucketIndexState::Empty;
        self.records.clear();
        self.buckets.retain(|_, ids| {
            let keep = !ids.is_empty();
            ids.clear();
            keep
        });
    }

    /// Clear the index and insert all given entities.
    ///
    /// When growing the index fails, an [`Error::CapacityGrowthFailure`] is returned and the
    /// index stays empty for this cycle.
    pub fn rebuild(&mut self, entities: &[EntityRecord]) -> Result<(), Error> {
        self.clear_for(entities.len())?;
        self.records.extend_from_slice(entities);

        match &self.workers {
            Some(workers) if workers.should_use_concurrent_insertion(self.records.len()) => {
                workers.insert(&self.records, &self.buckets, &self.key_space);
            }
            _ => insert_records(
                &self.records,
                0..self.records.len(),
                &self.buckets,
                &self.key_space,
            ),
        }

        self.state = BucketIndexState::Populated;
        Ok(())
    }

    /// All entities in the given cell. Empty when the cell has no entities or when the index
    /// is not populated.
    pub fn query(&self, key: CellKey) -> Vec<EntityRecord> {
        let mut records = Vec::with_capacity(self.count_in_cell(key));
        self.for_each_in_cell(key, |record| records.push(*record));
        records
    }

    /// Call the given function for each entity in the given cell, without allocating.
    pub fn for_each_in_cell<F>(&self, key: CellKey, mut consumer: F)
    where
        F: FnMut(&EntityRecord),
    {
        if self.state != BucketIndexState::Populated {
            return;
        }
        if let Some(ids) = self.buckets.get(&key) {
            for id in ids.iter() {
                consumer(&self.records[*id as usize]);
            }
        }
    }

    /// Number of entities in the given cell.
    pub fn count_in_cell(&self, key: CellKey) -> usize {
        if self.state != BucketIndexState::Populated {
            return 0;
        }
        self.buckets.get(&key).map(|ids| ids.len()).unwrap_or(0)
    }

    /// Number of entities of the given category in the given cell.
    pub fn count_in_cell_of(&self, key: CellKey, category: EntityCategory) -> usize {
        let mut count = 0;
        self.for_each_in_cell(key, |record| {
            if record.category == category {
                count += 1;
            }
        });
        count
    }

    /// Number of cells which contain entities.
    pub fn cell_count(&self) -> usize {
        if self.state != BucketIndexState::Populated {
            return 0;
        }
        self.buckets.iter().filter(|ids| !ids.is_empty()).count()
    }

    /// Clear the index and make room for `entity_count` entities. On errors, the index stays
    /// cleared and empty.
    fn clear_for(&mut self, entity_count: usize) -> Result<(), Error> {
        self.clear();
        self.reserve(entity_count).inspect_err(|err| {
            log::error!("Failed to grow bucket index: {err}");
        })
    }

    fn reserve(&mut self, entity_count: usize) -> Result<(), Error> {
        if entity_count > u32::MAX as usize {
            return Err(Error::CapacityGrowthFailure(format!(
                "{entity_count} entities exceed the max entity count"
            )));
        }
        if entity_count <= self.capacity {
            return Ok(());
        }
        self.records.try_reserve_exact(entity_count)?;
        log::debug!(
            "Growing bucket index capacity from {} to {} entities",
            self.capacity,
            entity_count
        );
        // start over with fresh shards, sized for the new high-water mark
        self.buckets = DashMap::with_capacity(entity_count);
        self.capacity = entity_count;
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(count: usize) -> Vec<EntityRecord> {
        let categories = [
            EntityCategory::PhysicsEntity,
            EntityCategory::Unit,
            EntityCategory::Target,
        ];
        (0..count)
            .map(|index| EntityRecord {
                entity: EntityHandle(index as u64),
                // spread over a 40 x 40 x 10 units volume
                position: Vec3::new(
                    (index % 40) as f32 - 20.0,
                    ((index / 40) % 40) as f32 - 20.0,
                    (index % 10) as f32,
                ),
                category: categories[index % categories.len()],
            })
            .collect()
    }

    fn inline_index() -> BucketIndex {
        BucketIndex::new(&SpatialSettings::default().with_worker_threads(1))
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = inline_index();
        assert_eq!(index.state(), BucketIndexState::Empty);
        for key in [CellKey(0), CellKey(1), CellKey(-1), CellKey(i64::MAX)] {
            assert!(index.query(key).is_empty());
            assert_eq!(index.count_in_cell(key), 0);
        }
        assert_eq!(index.cell_count(), 0);
    }

    #[test]
    fn query_after_clear() {
        let mut index = inline_index();
        let entities = entities(100);
        index.rebuild(&entities).unwrap();
        let key = index.key_of(entities[0].position);
        assert!(!index.query(key).is_empty());
        index.clear();
        assert_eq!(index.state(), BucketIndexState::Empty);
        assert!(index.query(key).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn records_land_in_their_cells() {
        let mut index = inline_index();
        let entities = vec![
            EntityRecord {
                entity: EntityHandle(1),
                position: Vec3::new(1.0, 1.0, 1.0),
                category: EntityCategory::Unit,
            },
            EntityRecord {
                entity: EntityHandle(2),
                position: Vec3::new(4.0, 2.0, 0.5),
                category: EntityCategory::Target,
            },
            EntityRecord {
                entity: EntityHandle(3),
                position: Vec3::new(6.0, 1.0, 1.0),
                category: EntityCategory::Unit,
            },
        ];
        index.rebuild(&entities).unwrap();
        assert_eq!(index.state(), BucketIndexState::Populated);
        assert_eq!(index.len(), 3);
        assert_eq!(index.cell_count(), 2);

        let key = index.key_of(Vec3::new(2.5, 2.5, 2.5));
        let mut found = index
            .query(key)
            .iter()
            .map(|record| record.entity)
            .collect::<Vec<_>>();
        found.sort();
        assert_eq!(found, vec![EntityHandle(1), EntityHandle(2)]);
        assert_eq!(index.count_in_cell_of(key, EntityCategory::Unit), 1);
        assert_eq!(index.count_in_cell_of(key, EntityCategory::PhysicsEntity), 0);

        let key = index.key_of(Vec3::new(7.0, 0.0, 0.0));
        assert_eq!(index.query(key)[0].entity, EntityHandle(3));

        // rebuilding replaces all previous records
        index.rebuild(&entities[2..]).unwrap();
        assert_eq!(index.count_in_cell(index.key_of(Vec3::ONE)), 0);
        assert_eq!(index.count_in_cell(key), 1);
    }

    #[test]
    fn capacity_grows_to_high_water_mark() {
        let mut index = inline_index();
        assert_eq!(index.capacity(), 0);
        index.rebuild(&entities(100)).unwrap();
        assert_eq!(index.capacity(), 100);
        index.rebuild(&entities(10)).unwrap();
        assert_eq!(index.capacity(), 100);
        assert_eq!(index.len(), 10);
        index.rebuild(&entities(1000)).unwrap();
        assert_eq!(index.capacity(), 1000);
        index.rebuild(&[]).unwrap();
        assert_eq!(index.capacity(), 1000);
        assert_eq!(index.state(), BucketIndexState::Populated);
        assert!(index.is_empty());
    }

    #[test]
    fn failed_growth_leaves_index_empty() {
        let mut index = inline_index();
        let entities = entities(100);
        index.rebuild(&entities).unwrap();
        let key = index.key_of(entities[0].position);
        assert_eq!(index.state(), BucketIndexState::Populated);

        let result = index.clear_for(u32::MAX as usize + 1);
        assert!(matches!(result, Err(Error::CapacityGrowthFailure(_))));
        assert_eq!(index.state(), BucketIndexState::Empty);
        assert!(index.query(key).is_empty());
        assert_eq!(index.count_in_cell(key), 0);
        assert_eq!(index.cell_count(), 0);
        assert!(index.is_empty());
        // previous capacity is kept, and the next cycle succeeds again
        assert_eq!(index.capacity(), 100);
        index.rebuild(&entities).unwrap();
        assert_eq!(index.len(), 100);
    }

    #[test]
    fn concurrent_rebuild_matches_inline_rebuild() {
        let entities = entities(10_000);

        let mut inline = inline_index();
        inline.rebuild(&entities).unwrap();

        let mut concurrent = BucketIndex::new(&SpatialSettings::default().with_worker_threads(4));
        assert_eq!(concurrent.worker_threads(), 4);
        // run a few cycles, reusing cleared buckets
        for _ in 0..3 {
            concurrent.rebuild(&entities).unwrap();
        }

        assert_eq!(inline.len(), 10_000);
        assert_eq!(concurrent.len(), 10_000);
        assert_eq!(inline.cell_count(), concurrent.cell_count());

        let mut total = 0;
        for entity in &entities {
            let key = inline.key_of(entity.position);
            let mut expected = inline.query(key);
            let mut found = concurrent.query(key);
            expected.sort_by_key(|record| record.entity);
            found.sort_by_key(|record| record.entity);
            assert_eq!(expected, found);
            total += 1;
        }
        assert_eq!(total, 10_000);

        // no lost or duplicated inserts
        let mut keys = entities
            .iter()
            .map(|entity| concurrent.key_of(entity.position))
            .collect::<Vec<_>>();
        keys.sort();
        keys.dedup();
        let inserted = keys
            .iter()
            .map(|key| concurrent.count_in_cell(*key))
            .sum::<usize>();
        assert_eq!(inserted, 10_000);
    }
}
