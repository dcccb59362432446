//! Merges per-attribute index streams (as found in OBJ files) into one index
//! per vertex.

use std::collections::HashMap;

use crate::error::{MeshError, MeshResult};

/// Per-corner indices into `values`.
#[derive(Clone, Copy, Debug)]
pub struct AttributeStream<'a, T> {
    pub indices: &'a [u32],
    pub values: &'a [T],
}

impl<'a, T> AttributeStream<'a, T> {
    pub fn new(indices: &'a [u32], values: &'a [T]) -> Self {
        Self { indices, values }
    }
}

/// Output of [`separate_to_unified`]. Value vectors of absent streams are empty.
#[derive(Clone, Debug, PartialEq)]
pub struct Unified<A, B, C> {
    pub indices: Vec<u32>,
    pub num_vertices: usize,
    pub values0: Vec<A>,
    pub values1: Vec<B>,
    pub values2: Vec<C>,
}

impl<A, B, C> Default for Unified<A, B, C> {
    fn default() -> Self {
        Self {
            indices: Vec::new(),
            num_vertices: 0,
            values0: Vec::new(),
            values1: Vec::new(),
            values2: Vec::new(),
        }
    }
}

fn check_stream<T>(
    stream: Option<&AttributeStream<'_, T>>,
    name: &'static str,
    num_indices: usize,
) -> MeshResult<()> {
    let Some(stream) = stream else { return Ok(()) };
    if stream.indices.len() != num_indices {
        return Err(MeshError::AttributeMismatch(format!(
            "{} has {} indices, expected {}",
            name,
            stream.indices.len(),
            num_indices
        )));
    }
    if let Some(&bad) = stream.indices.iter().find(|&&i| i as usize >= stream.values.len()) {
        return Err(MeshError::IndexOutOfRange {
            stream: name,
            index: bad,
            count: stream.values.len(),
        });
    }
    Ok(())
}

/// Builds one index list such that for every present stream `k` and corner `i`
/// `values_k[indices[i]] == stream_k.values[stream_k.indices[i]]`.
///
/// New vertices are numbered in order of first appearance. A single present
/// stream is passed through unchanged, without deduplication.
pub fn separate_to_unified<A: Copy, B: Copy, C: Copy>(
    num_indices: usize,
    stream0: Option<AttributeStream<'_, A>>,
    stream1: Option<AttributeStream<'_, B>>,
    stream2: Option<AttributeStream<'_, C>>,
) -> MeshResult<Unified<A, B, C>> {
    check_stream(stream0.as_ref(), "stream 0", num_indices)?;
    check_stream(stream1.as_ref(), "stream 1", num_indices)?;
    check_stream(stream2.as_ref(), "stream 2", num_indices)?;

    let present = [stream0.is_some(), stream1.is_some(), stream2.is_some()]
        .iter()
        .filter(|&&p| p)
        .count();

    match present {
        0 if num_indices == 0 => Ok(Unified::default()),
        0 => Err(MeshError::MalformedInput(format!(
            "{} indices but no index streams",
            num_indices
        ))),
        1 => {
            let mut out = Unified::default();
            if let Some(s) = stream0 {
                out.indices = s.indices.to_vec();
                out.values0 = s.values.to_vec();
                out.num_vertices = s.values.len();
            } else if let Some(s) = stream1 {
                out.indices = s.indices.to_vec();
                out.values1 = s.values.to_vec();
                out.num_vertices = s.values.len();
            } else if let Some(s) = stream2 {
                out.indices = s.indices.to_vec();
                out.values2 = s.values.to_vec();
                out.num_vertices = s.values.len();
            }
            Ok(out)
        }
        _ => {
            let mut out = Unified::default();
            out.indices.reserve(num_indices);
            // 完整的三元组作为键，不做位压缩
            let mut remap: HashMap<[u32; 3], u32> = HashMap::with_capacity(num_indices);

            for corner in 0..num_indices {
                let key = [
                    stream0.map_or(0, |s| s.indices[corner]),
                    stream1.map_or(0, |s| s.indices[corner]),
                    stream2.map_or(0, |s| s.indices[corner]),
                ];
                let next = remap.len() as u32;
                let index = *remap.entry(key).or_insert_with(|| {
                    if let Some(s) = stream0 {
                        out.values0.push(s.values[key[0] as usize]);
                    }
                    if let Some(s) = stream1 {
                        out.values1.push(s.values[key[1] as usize]);
                    }
                    if let Some(s) = stream2 {
                        out.values2.push(s.values[key[2] as usize]);
                    }
                    next
                });
                out.indices.push(index);
            }

            out.num_vertices = remap.len();
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Positions<'a> = AttributeStream<'a, [f32; 3]>;
    type Normals<'a> = AttributeStream<'a, [f32; 3]>;
    type Uvs<'a> = AttributeStream<'a, [f32; 2]>;

    #[test]
    fn every_corner_sees_its_original_values() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]];
        let normals = [[0.0, 0.0, 1.0], [0.0, 0.0, -1.0]];
        let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
        let p_idx = [0, 1, 2, 0, 2, 3, 0, 1, 2];
        let n_idx = [0, 0, 0, 0, 0, 0, 1, 1, 1];
        let t_idx = [0, 1, 2, 0, 2, 1, 0, 1, 2];

        let out = separate_to_unified(
            p_idx.len(),
            Some(Positions::new(&p_idx, &positions)),
            Some(Normals::new(&n_idx, &normals)),
            Some(Uvs::new(&t_idx, &uvs)),
        )
        .unwrap();

        for i in 0..p_idx.len() {
            let v = out.indices[i] as usize;
            assert_eq!(out.values0[v], positions[p_idx[i] as usize]);
            assert_eq!(out.values1[v], normals[n_idx[i] as usize]);
            assert_eq!(out.values2[v], uvs[t_idx[i] as usize]);
        }

        let distinct: std::collections::HashSet<_> =
            (0..p_idx.len()).map(|i| (p_idx[i], n_idx[i], t_idx[i])).collect();
        assert_eq!(out.num_vertices, distinct.len());
        assert_eq!(out.values0.len(), out.num_vertices);
        assert_eq!(out.values2.len(), out.num_vertices);
    }

    #[test]
    fn vertices_are_numbered_by_first_appearance() {
        let positions = [[0.0f32; 3], [1.0; 3], [2.0; 3]];
        let normals = [[0.0f32, 1.0, 0.0]];
        let p_idx = [2, 0, 2, 1, 0];
        let n_idx = [0, 0, 0, 0, 0];

        let out = separate_to_unified::<_, _, [f32; 2]>(
            5,
            Some(Positions::new(&p_idx, &positions)),
            Some(Normals::new(&n_idx, &normals)),
            None,
        )
        .unwrap();

        assert_eq!(out.indices, vec![0, 1, 0, 2, 1]);
        assert_eq!(out.values0, vec![[2.0; 3], [0.0; 3], [1.0; 3]]);
        assert!(out.values2.is_empty());
    }

    #[test]
    fn single_stream_passes_through() {
        let positions = [[0.0f32; 3], [1.0; 3], [2.0; 3], [3.0; 3]];
        let p_idx = [0, 1, 2, 2, 1, 3];

        let out = separate_to_unified::<_, [f32; 3], [f32; 2]>(
            6,
            Some(Positions::new(&p_idx, &positions)),
            None,
            None,
        )
        .unwrap();

        assert_eq!(out.indices, p_idx.to_vec());
        assert_eq!(out.values0, positions.to_vec());
        assert_eq!(out.num_vertices, 4);
    }

    #[test]
    fn wide_indices_do_not_collide() {
        let positions: Vec<f32> = (0..70_000).map(|i| i as f32).collect();
        let uvs = [[0.0f32, 0.0], [1.0, 1.0]];
        // 0x10000 和 0 在 16 位压缩下会冲突
        let p_idx = [0, 0x10000, 0, 0x10000];
        let t_idx = [0, 0, 1, 1];

        let out = separate_to_unified::<_, [f32; 3], _>(
            4,
            Some(AttributeStream::new(&p_idx, &positions)),
            None,
            Some(Uvs::new(&t_idx, &uvs)),
        )
        .unwrap();

        assert_eq!(out.indices, vec![0, 1, 2, 3]);
        assert_eq!(out.values0, vec![0.0, 65536.0, 0.0, 65536.0]);
    }

    #[test]
    fn malformed_streams_are_rejected() {
        let positions = [[0.0f32; 3]; 3];
        let normals = [[0.0f32; 3]; 3];

        let short = separate_to_unified::<_, _, [f32; 2]>(
            3,
            Some(Positions::new(&[0, 1, 2], &positions)),
            Some(Normals::new(&[0, 1], &normals)),
            None,
        );
        assert!(matches!(short, Err(MeshError::AttributeMismatch(_))));

        let out_of_range = separate_to_unified::<_, _, [f32; 2]>(
            3,
            Some(Positions::new(&[0, 1, 3], &positions)),
            Some(Normals::new(&[0, 1, 2], &normals)),
            None,
        );
        assert!(matches!(
            out_of_range,
            Err(MeshError::IndexOutOfRange { index: 3, count: 3, .. })
        ));

        let nothing = separate_to_unified::<[f32; 3], [f32; 3], [f32; 2]>(0, None, None, None).unwrap();
        assert!(nothing.indices.is_empty());
        assert!(separate_to_unified::<f32, f32, f32>(3, None, None, None).is_err());
    }
}
