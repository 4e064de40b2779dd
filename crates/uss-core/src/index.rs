//! Transient bounding-box index.
//!
//! A packed R-tree (sort-tile-recursive bulk load) rebuilt from a store
//! snapshot for a single operation and torn down afterwards. It is never the
//! system of record.

use std::ops::Range;

use crate::spatial::BoundingBox;

/// Fan-out of every node.
const NODE_CAPACITY: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry<T> {
    pub id: String,
    pub bbox: BoundingBox,
    pub metadata: T,
}

impl<T> IndexEntry<T> {
    pub fn new(id: impl Into<String>, bbox: BoundingBox, metadata: T) -> Self {
        Self {
            id: id.into(),
            bbox,
            metadata,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    bbox: BoundingBox,
    /// Indices into the level below (or into `entries` for leaves).
    children: Range<usize>,
}

#[derive(Debug)]
pub struct SpatialIndex<T> {
    entries: Vec<IndexEntry<T>>,
    /// `levels[0]` holds leaves, the last level holds the root(s).
    levels: Vec<Vec<Node>>,
}

impl<T> Default for SpatialIndex<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            levels: Vec::new(),
        }
    }
}

impl<T> SpatialIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the index content with `entries`. Always starts from empty.
    pub fn build<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = IndexEntry<T>>,
    {
        self.teardown();

        let mut entries: Vec<IndexEntry<T>> = entries.into_iter().collect();
        if entries.is_empty() {
            return;
        }

        let order = str_order(&entries.iter().map(|e| e.bbox).collect::<Vec<_>>());
        entries = permute(entries, &order);

        let mut level = pack(entries.iter().map(|e| e.bbox));
        self.entries = entries;

        loop {
            let order = str_order(&level.iter().map(|n| n.bbox).collect::<Vec<_>>());
            level = permute(level, &order);
            let done = level.len() <= 1;
            let parents = pack(level.iter().map(|n| n.bbox));
            self.levels.push(level);
            if done {
                break;
            }
            level = parents;
        }
    }

    /// Entries whose bounding box overlaps `query` (closed intervals).
    pub fn intersects(&self, query: &BoundingBox) -> Vec<&IndexEntry<T>> {
        let mut found = Vec::new();
        let Some(top) = self.levels.len().checked_sub(1) else {
            return found;
        };

        let mut stack: Vec<(usize, usize)> = (0..self.levels[top].len())
            .map(|i| (top, i))
            .collect();

        while let Some((depth, idx)) = stack.pop() {
            let node = &self.levels[depth][idx];
            if !node.bbox.intersects(query) {
                continue;
            }
            if depth == 0 {
                found.extend(
                    self.entries[node.children.clone()]
                        .iter()
                        .filter(|entry| entry.bbox.intersects(query)),
                );
            } else {
                stack.extend(node.children.clone().map(|child| (depth - 1, child)));
            }
        }
        found
    }

    /// Drop every entry and node.
    pub fn teardown(&mut self) {
        self.entries.clear();
        self.levels.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Group consecutive boxes into nodes of at most `NODE_CAPACITY` children.
fn pack(boxes: impl Iterator<Item = BoundingBox>) -> Vec<Node> {
    let boxes: Vec<BoundingBox> = boxes.collect();
    boxes
        .chunks(NODE_CAPACITY)
        .enumerate()
        .filter_map(|(chunk_idx, chunk)| {
            let start = chunk_idx * NODE_CAPACITY;
            let bbox = chunk.iter().copied().reduce(|a, b| a.union(&b))?;
            Some(Node {
                bbox,
                children: start..start + chunk.len(),
            })
        })
        .collect()
}

/// Sort-tile-recursive ordering: vertical slices by x, then y within a slice.
fn str_order(boxes: &[BoundingBox]) -> Vec<usize> {
    let n = boxes.len();
    let node_count = n.div_ceil(NODE_CAPACITY);
    let slice_count = (node_count as f64).sqrt().ceil().max(1.0) as usize;
    let slice_size = slice_count * NODE_CAPACITY;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| boxes[a].center().0.total_cmp(&boxes[b].center().0));
    for slice in order.chunks_mut(slice_size) {
        slice.sort_by(|&a, &b| boxes[a].center().1.total_cmp(&boxes[b].center().1));
    }
    order
}

fn permute<U>(items: Vec<U>, order: &[usize]) -> Vec<U> {
    let mut slots: Vec<Option<U>> = items.into_iter().map(Some).collect();
    order.iter().filter_map(|&i| slots[i].take()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<IndexEntry<usize>> {
        (0..n)
            .map(|i| {
                let x = (i % 20) as f64 * 0.01;
                let y = (i / 20) as f64 * 0.01;
                IndexEntry::new(
                    format!("e{i}"),
                    BoundingBox::new(x, y, x + 0.005, y + 0.005),
                    i,
                )
            })
            .collect()
    }

    fn ids(found: &[&IndexEntry<usize>]) -> Vec<usize> {
        let mut ids: Vec<usize> = found.iter().map(|e| e.metadata).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index: SpatialIndex<()> = SpatialIndex::new();
        assert!(index.is_empty());
        assert!(index
            .intersects(&BoundingBox::new(-180.0, -90.0, 180.0, 90.0))
            .is_empty());
    }

    #[test]
    fn every_entry_finds_itself() {
        let entries = grid(250);
        let mut index = SpatialIndex::new();
        index.build(entries.clone());
        assert_eq!(index.len(), 250);
        for entry in &entries {
            let found = index.intersects(&entry.bbox);
            assert!(found.iter().any(|e| e.id == entry.id), "{} missing", entry.id);
        }
    }

    #[test]
    fn matches_brute_force_scan() {
        let entries = grid(400);
        let mut index = SpatialIndex::new();
        index.build(entries.clone());

        let query = BoundingBox::new(0.033, 0.041, 0.112, 0.087);
        let expected: Vec<usize> = entries
            .iter()
            .filter(|e| e.bbox.intersects(&query))
            .map(|e| e.metadata)
            .collect();
        assert!(!expected.is_empty());
        assert_eq!(ids(&index.intersects(&query)), expected);
    }

    #[test]
    fn build_replaces_previous_content() {
        let mut index = SpatialIndex::new();
        index.build(grid(50));
        index.build(vec![IndexEntry::new(
            "only",
            BoundingBox::new(10.0, 10.0, 11.0, 11.0),
            0usize,
        )]);
        assert_eq!(index.len(), 1);
        assert!(index
            .intersects(&BoundingBox::new(0.0, 0.0, 1.0, 1.0))
            .is_empty());
    }

    #[test]
    fn teardown_releases_entries() {
        let mut index = SpatialIndex::new();
        index.build(grid(30));
        index.teardown();
        assert!(index.is_empty());
        assert!(index
            .intersects(&BoundingBox::new(0.0, 0.0, 1.0, 1.0))
            .is_empty());
    }
}
