//! Vertex cache aware triangle reordering (Tom Forsyth's linear-speed
//! algorithm as used by Torque's `TriListOpt`).

pub mod lru;
pub mod score;

use crate::error::{MeshError, MeshResult};
use lru::LruCacheModel;
use score::vertex_score;

pub use score::MAX_SIZE_VERTEX_CACHE;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexRecord {
    /// -1 when not in the simulated cache
    pub cache_position: i32,
    pub score: f32,
    pub num_references: u32,
    pub num_unadded_references: u32,
}

impl VertexRecord {
    pub fn new(num_references: u32) -> Self {
        Self {
            cache_position: -1,
            score: 0.0,
            num_references,
            num_unadded_references: num_references,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleRecord {
    pub score: f32,
    pub emitted: bool,
    pub vertices: [u32; 3],
}

impl TriangleRecord {
    pub fn new(vertices: [u32; 3]) -> Self {
        Self { score: 0.0, emitted: false, vertices }
    }
}

/// Triangles referencing each vertex, CSR layout. Emitted triangles are
/// overwritten with [`TriangleAdjacency::EMPTY`], lists never shrink.
#[derive(Clone, Debug)]
pub struct TriangleAdjacency {
    offsets: Vec<u32>,
    slots: Vec<u32>,
}

impl TriangleAdjacency {
    pub const EMPTY: u32 = u32::MAX;

    pub fn build(num_vertices: usize, triangles: &[TriangleRecord]) -> Self {
        let mut offsets = vec![0u32; num_vertices + 1];
        for triangle in triangles {
            for &v in &triangle.vertices {
                offsets[v as usize + 1] += 1;
            }
        }
        for i in 0..num_vertices {
            offsets[i + 1] += offsets[i];
        }

        let mut cursor = offsets[..num_vertices].to_vec();
        let mut slots = vec![Self::EMPTY; offsets[num_vertices] as usize];
        for (t, triangle) in triangles.iter().enumerate() {
            for &v in &triangle.vertices {
                let c = &mut cursor[v as usize];
                slots[*c as usize] = t as u32;
                *c += 1;
            }
        }

        Self { offsets, slots }
    }

    pub fn triangles(&self, vertex: u32) -> &[u32] {
        let start = self.offsets[vertex as usize] as usize;
        let end = self.offsets[vertex as usize + 1] as usize;
        &self.slots[start..end]
    }

    /// Clears the first slot of `vertex` holding `triangle`.
    pub fn remove(&mut self, vertex: u32, triangle: u32) {
        let start = self.offsets[vertex as usize] as usize;
        let end = self.offsets[vertex as usize + 1] as usize;
        if let Some(slot) = self.slots[start..end].iter_mut().find(|s| **s == triangle) {
            *slot = Self::EMPTY;
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    triangle: Option<u32>,
    score: f32,
}

impl Candidate {
    const NONE: Self = Self { triangle: None, score: -1.0 };
}

/// Two-slot cache of the best scoring triangles seen since the last reset.
#[derive(Clone, Copy, Debug)]
struct Candidates {
    next_best: Candidate,
    next_next_best: Candidate,
}

impl Candidates {
    const NONE: Self = Self {
        next_best: Candidate::NONE,
        next_next_best: Candidate::NONE,
    };

    fn offer_next_next(&mut self, candidate: Candidate) {
        if candidate.score > self.next_next_best.score {
            self.next_next_best = candidate;
        }
    }

    fn offer(&mut self, score: f32, triangle: u32) {
        let candidate = Candidate { triangle: Some(triangle), score };
        if score > self.next_best.score {
            self.offer_next_next(self.next_best);
            self.next_best = candidate;
        }
        self.offer_next_next(candidate);
    }

    /// Falls back to the runner-up when the rescan found no candidate. The
    /// runner-up slot is consumed either way.
    fn promote_next_next(&mut self, triangles: &[TriangleRecord]) {
        if self.next_best.triangle.is_some() {
            return;
        }
        if let Some(t) = self.next_next_best.triangle {
            if !triangles[t as usize].emitted {
                self.next_best = self.next_next_best;
            }
            self.next_next_best = Candidate::NONE;
        }
    }
}

/// Reorders a triangle list for a 32 entry vertex cache.
pub fn optimize_triangle_ordering(num_vertices: usize, indices: &[u32]) -> MeshResult<Vec<u32>> {
    optimize_triangle_ordering_with_cache(num_vertices, indices, MAX_SIZE_VERTEX_CACHE)
}

/// Reorders a triangle list so that consecutive triangles share vertices.
///
/// Only the order of the triangles changes. Every triangle is emitted once
/// with its vertices in their original order. Empty input (no vertices or
/// no indices) is returned as is.
///
/// # Panics
///
/// If the candidate bookkeeping ever selects an emitted triangle or runs out
/// of candidates while triangles are pending.
pub fn optimize_triangle_ordering_with_cache(
    num_vertices: usize,
    indices: &[u32],
    capacity: usize,
) -> MeshResult<Vec<u32>> {
    if num_vertices == 0 || indices.is_empty() {
        return Ok(indices.to_vec());
    }
    if capacity <= 3 {
        return Err(MeshError::MalformedInput(format!(
            "vertex cache capacity {} too small, need at least 4",
            capacity
        )));
    }
    if indices.len() % 3 != 0 {
        return Err(MeshError::MalformedInput(format!(
            "{} indices is not a triangle list",
            indices.len()
        )));
    }
    if let Some(&bad) = indices.iter().find(|&&i| i as usize >= num_vertices) {
        return Err(MeshError::IndexOutOfRange {
            stream: "triangle indices",
            index: bad,
            count: num_vertices,
        });
    }

    // 1. 初始化顶点、三角形与邻接表
    let mut triangles: Vec<TriangleRecord> = indices
        .chunks_exact(3)
        .map(|c| TriangleRecord::new([c[0], c[1], c[2]]))
        .collect();
    let mut adjacency = TriangleAdjacency::build(num_vertices, &triangles);
    let mut vertices: Vec<VertexRecord> = (0..num_vertices as u32)
        .map(|v| {
            let mut record = VertexRecord::new(adjacency.triangles(v).len() as u32);
            record.score = vertex_score(-1, record.num_unadded_references, capacity);
            record
        })
        .collect();

    let mut candidates = Candidates::NONE;
    for (t, triangle) in triangles.iter_mut().enumerate() {
        triangle.score = triangle.vertices.iter().map(|&v| vertices[v as usize].score).sum();
        candidates.offer(triangle.score, t as u32);
    }

    // 2. 逐个输出三角形
    let mut cache = LruCacheModel::new();
    let mut output = Vec::with_capacity(indices.len());
    let mut triangles_to_rescan = Vec::new();

    while output.len() < indices.len() {
        if candidates.next_best.triangle.is_none() {
            // 候选缓存为空，线性扫描全部未输出的三角形
            candidates = Candidates::NONE;
            for (t, triangle) in triangles.iter().enumerate() {
                if !triangle.emitted {
                    candidates.offer(triangle.score, t as u32);
                }
            }
        }
        let Some(best) = candidates.next_best.triangle else {
            panic!(
                "ran out of candidate triangles with {} of {} indices emitted",
                output.len(),
                indices.len()
            );
        };

        let triangle = &mut triangles[best as usize];
        assert!(!triangle.emitted, "triangle {} selected twice", best);
        for &v in &triangle.vertices {
            output.push(v);
            vertices[v as usize].num_unadded_references -= 1;
            adjacency.remove(v, best);
            cache.use_vertex(v);
        }
        triangle.emitted = true;

        cache.enforce_size(capacity, &mut vertices, &adjacency, &mut triangles_to_rescan);

        candidates.next_best = Candidate::NONE;
        for &t in &triangles_to_rescan {
            let triangle = &mut triangles[t as usize];
            if !triangle.emitted {
                triangle.score = triangle.vertices.iter().map(|&v| vertices[v as usize].score).sum();
                candidates.offer(triangle.score, t);
            }
        }

        candidates.promote_next_next(&triangles);
    }

    // 每个顶点的引用都已用完，邻接表只剩空槽
    debug_assert!(vertices.iter().enumerate().all(|(v, record)| {
        let slots = adjacency.triangles(v as u32);
        record.num_unadded_references == 0
            && slots.len() == record.num_references as usize
            && slots.iter().all(|&t| t == TriangleAdjacency::EMPTY)
    }));

    Ok(output)
}
