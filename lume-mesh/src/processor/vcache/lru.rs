use std::collections::VecDeque;

use super::score::vertex_score;
use super::{TriangleAdjacency, VertexRecord};

/// LRU model of the post-transform cache, used only for scoring.
/// Front of the queue is the most recently used vertex.
#[derive(Debug, Default)]
pub struct LruCacheModel {
    entries: VecDeque<u32>,
}

impl LruCacheModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Moves `vertex` to the front, inserting it if absent.
    pub fn use_vertex(&mut self, vertex: u32) {
        if let Some(position) = self.entries.iter().position(|&v| v == vertex) {
            if position == 0 {
                return;
            }
            self.entries.remove(position);
        }
        self.entries.push_front(vertex);
    }

    /// Assigns cache positions and fresh scores to the first `capacity`
    /// entries and drops the rest (their position becomes -1).
    ///
    /// `triangles_to_rescan` is refilled with the not yet emitted triangles of
    /// the resident vertices, without duplicates, in first-seen order.
    pub fn enforce_size(
        &mut self,
        capacity: usize,
        vertices: &mut [VertexRecord],
        adjacency: &TriangleAdjacency,
        triangles_to_rescan: &mut Vec<u32>,
    ) {
        triangles_to_rescan.clear();

        for (position, &vertex) in self.entries.iter().take(capacity).enumerate() {
            let record = &mut vertices[vertex as usize];
            record.cache_position = position as i32;

            for &triangle in adjacency.triangles(vertex) {
                if triangle != TriangleAdjacency::EMPTY && !triangles_to_rescan.contains(&triangle) {
                    triangles_to_rescan.push(triangle);
                }
            }

            record.score = vertex_score(record.cache_position, record.num_unadded_references, capacity);
        }

        // 被挤出缓存的顶点不重新计分
        for &vertex in self.entries.iter().skip(capacity) {
            vertices[vertex as usize].cache_position = -1;
        }
        self.entries.truncate(capacity);
    }

    /// Position of `vertex` in the cache, -1 if not cached.
    pub fn cache_position(&self, vertex: u32) -> i32 {
        self.entries
            .iter()
            .position(|&v| v == vertex)
            .map_or(-1, |p| p as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::vcache::TriangleRecord;

    fn strip(num_triangles: u32) -> (Vec<VertexRecord>, TriangleAdjacency) {
        let triangles: Vec<TriangleRecord> = (0..num_triangles)
            .map(|t| TriangleRecord::new([t, t + 1, t + 2]))
            .collect();
        let num_vertices = num_triangles as usize + 2;
        let adjacency = TriangleAdjacency::build(num_vertices, &triangles);
        let vertices = (0..num_vertices as u32)
            .map(|v| VertexRecord::new(adjacency.triangles(v).len() as u32))
            .collect();
        (vertices, adjacency)
    }

    #[test]
    fn use_vertex_moves_to_front() {
        let mut cache = LruCacheModel::new();
        for v in [4, 7, 9] {
            cache.use_vertex(v);
        }
        assert_eq!(cache.cache_position(9), 0);
        assert_eq!(cache.cache_position(4), 2);

        cache.use_vertex(4);
        assert_eq!(cache.cache_position(4), 0);
        assert_eq!(cache.cache_position(9), 1);
        assert_eq!(cache.cache_position(7), 2);
        assert_eq!(cache.cache_position(1), -1);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn enforce_size_bounds_the_cache() {
        let (mut vertices, adjacency) = strip(60);
        let mut cache = LruCacheModel::new();
        let mut rescan = Vec::new();

        for v in 0..vertices.len() as u32 {
            cache.use_vertex(v);
            cache.enforce_size(32, &mut vertices, &adjacency, &mut rescan);

            assert!(cache.len() <= 32);
            assert!(vertices.iter().all(|r| r.cache_position < 32));
            assert!(vertices.iter().filter(|r| r.cache_position >= 0).count() <= 32);
        }

        let last = vertices.len() as u32 - 1;
        assert_eq!(vertices[last as usize].cache_position, 0);
        assert_eq!(vertices[0].cache_position, -1);
        assert_eq!(cache.cache_position(last - 31), 31);
    }

    #[test]
    fn rescan_list_has_live_triangles_once() {
        let (mut vertices, mut adjacency) = strip(4);
        adjacency.remove(2, 1);
        adjacency.remove(3, 1);
        adjacency.remove(1, 1);

        let mut cache = LruCacheModel::new();
        let mut rescan = vec![99];
        for v in [1, 2, 3] {
            cache.use_vertex(v);
        }
        cache.enforce_size(32, &mut vertices, &adjacency, &mut rescan);

        // 顶点 3, 2, 1 依次访问
        assert_eq!(rescan, vec![2, 3, 0]);
        assert_eq!(vertices[3].cache_position, 0);
        assert!(vertices[3].score > 0.0);
    }
}
