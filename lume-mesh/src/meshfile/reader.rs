use std::fs::File;
use std::mem::size_of;
use std::path::Path;

use bytemuck::{pod_read_unaligned, Pod};
use glam::Vec3;
use memmap2::Mmap;

use super::{
    BufferEntry, BufferKind, IndexSpec, IndexType, MeshFileHeader, VertexAttributeSpec,
    VertexDataSet, MAGIC, VERSION,
};
use crate::error::{MeshError, MeshResult};
use crate::mesh::{Aabb, AttributeType};
use crate::processor::precision::half_to_float;

fn invalid(msg: impl Into<String>) -> MeshError {
    MeshError::InvalidMeshFile(msg.into())
}

/// Validated view over the bytes of a mesh file.
#[derive(Clone, Copy, Debug)]
pub struct MeshFile<'a> {
    bytes: &'a [u8],
    header: MeshFileHeader,
}

impl<'a> MeshFile<'a> {
    /// Checks magic, version and that every table and buffer lies inside `bytes`.
    pub fn parse(bytes: &'a [u8]) -> MeshResult<Self> {
        if bytes.len() < size_of::<MeshFileHeader>() {
            return Err(invalid("file too small to hold a header"));
        }
        let header: MeshFileHeader = pod_read_unaligned(&bytes[..size_of::<MeshFileHeader>()]);
        if header.magic != MAGIC {
            return Err(invalid(format!("bad magic {:#010x}", header.magic)));
        }
        if header.version != VERSION {
            return Err(invalid(format!("unsupported version {}", header.version)));
        }

        let file = Self { bytes, header };
        for i in 0..header.num_buffers {
            let entry = file.buffer(i)?;
            if BufferKind::from_u32(entry.kind).is_none() {
                return Err(invalid(format!("buffer {} has unknown kind {}", i, entry.kind)));
            }
            file.buffer_data(i)?;
        }
        for i in 0..header.num_index_specs {
            file.index_spec(i)?;
        }
        for i in 0..header.num_vertex_data_sets {
            let num_vertices = file.vertex_data_set(i)?.num_vertices;
            for spec in file.vertex_specs(i)? {
                file.attribute_layout(&spec, num_vertices)?;
            }
        }
        Ok(file)
    }

    fn record<T: Pod>(&self, offset: usize, what: &str) -> MeshResult<T> {
        let end = offset + size_of::<T>();
        if end > self.bytes.len() {
            return Err(invalid(format!("{} at {} runs past end of file", what, offset)));
        }
        Ok(pod_read_unaligned(&self.bytes[offset..end]))
    }

    pub fn header(&self) -> &MeshFileHeader {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bounds(&self) -> Aabb {
        Aabb {
            min: Vec3::from_array(self.header.bounds_min),
            max: Vec3::from_array(self.header.bounds_max),
        }
    }

    pub fn buffer(&self, index: u32) -> MeshResult<BufferEntry> {
        if index >= self.header.num_buffers {
            return Err(invalid(format!("buffer {} out of range", index)));
        }
        let offset = size_of::<MeshFileHeader>() + index as usize * size_of::<BufferEntry>();
        self.record(offset, "buffer entry")
    }

    pub fn buffers(&self) -> MeshResult<Vec<BufferEntry>> {
        (0..self.header.num_buffers).map(|i| self.buffer(i)).collect()
    }

    pub fn buffer_data(&self, index: u32) -> MeshResult<&'a [u8]> {
        let entry = self.buffer(index)?;
        let start = entry.offset as usize;
        let end = start + entry.size as usize;
        self.bytes
            .get(start..end)
            .ok_or_else(|| invalid(format!("buffer {} ({}..{}) runs past end of file", index, start, end)))
    }

    pub fn index_spec(&self, index: u32) -> MeshResult<IndexSpec> {
        if index >= self.header.num_index_specs {
            return Err(invalid(format!("index spec {} out of range", index)));
        }
        let offset = self.header.index_specs_offset as usize + index as usize * size_of::<IndexSpec>();
        self.record(offset, "index spec")
    }

    pub fn index_specs(&self) -> MeshResult<Vec<IndexSpec>> {
        (0..self.header.num_index_specs).map(|i| self.index_spec(i)).collect()
    }

    pub fn vertex_data_set(&self, index: u32) -> MeshResult<VertexDataSet> {
        if index >= self.header.num_vertex_data_sets {
            return Err(invalid(format!("vertex data set {} out of range", index)));
        }
        let offset =
            self.header.vertex_data_sets_offset as usize + index as usize * size_of::<VertexDataSet>();
        self.record(offset, "vertex data set")
    }

    pub fn vertex_data_sets(&self) -> MeshResult<Vec<VertexDataSet>> {
        (0..self.header.num_vertex_data_sets).map(|i| self.vertex_data_set(i)).collect()
    }

    pub fn vertex_specs(&self, data_set: u32) -> MeshResult<Vec<VertexAttributeSpec>> {
        let set = self.vertex_data_set(data_set)?;
        (0..set.num_vertex_specs as usize)
            .map(|i| {
                let offset = set.vertex_specs_offset as usize + i * size_of::<VertexAttributeSpec>();
                self.record(offset, "vertex spec")
            })
            .collect()
    }

    /// Index data of `spec` widened to u32.
    pub fn read_indices(&self, spec: &IndexSpec) -> MeshResult<Vec<u32>> {
        let index_type = IndexType::from_u32(spec.index_type)
            .ok_or_else(|| invalid(format!("unknown index type {}", spec.index_type)))?;
        let data = self.buffer_data(spec.buffer)?;
        let start = spec.offset as usize;
        let end = start + spec.count as usize * index_type.size();
        let data = data
            .get(start..end)
            .ok_or_else(|| invalid(format!("index range {}..{} outside buffer {}", start, end, spec.buffer)))?;

        Ok(match index_type {
            IndexType::UInt8 => data.iter().map(|&i| i as u32).collect(),
            IndexType::UInt16 => data
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
                .collect(),
            IndexType::UInt32 => data
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        })
    }

    /// Type and stride of `spec`, after checking that `num_vertices`
    /// elements fit inside its buffer.
    fn attribute_layout(&self, spec: &VertexAttributeSpec, num_vertices: u32) -> MeshResult<(AttributeType, usize)> {
        let attribute_type = AttributeType::from_u32(spec.attribute_type)
            .ok_or_else(|| invalid(format!("unknown attribute type {}", spec.attribute_type)))?;
        if !(1..=4).contains(&spec.components) || spec.offset < 0 || spec.stride < 0 || spec.buffer < 0 {
            return Err(invalid(format!("malformed vertex spec {:#010x}", spec.semantic)));
        }

        let data = self.buffer_data(spec.buffer as u32)?;
        let element_size = spec.components as usize * attribute_type.size();
        let stride = match spec.stride {
            0 => element_size,
            s => s as usize,
        };

        if num_vertices > 0 {
            // 最后一个元素的末尾
            let end = (num_vertices as usize - 1)
                .checked_mul(stride)
                .and_then(|n| n.checked_add(spec.offset as usize))
                .and_then(|n| n.checked_add(element_size));
            match end {
                Some(end) if end <= data.len() => {}
                _ => {
                    return Err(invalid(format!(
                        "{} vertices of {:#010x} do not fit buffer {} ({} bytes)",
                        num_vertices,
                        spec.semantic,
                        spec.buffer,
                        data.len()
                    )));
                }
            }
        }
        Ok((attribute_type, stride))
    }

    /// Attribute data converted to f32, `components` values per vertex.
    /// Integer types are converted without normalization.
    pub fn read_attribute(&self, spec: &VertexAttributeSpec, num_vertices: u32) -> MeshResult<Vec<f32>> {
        let (attribute_type, stride) = self.attribute_layout(spec, num_vertices)?;
        let data = self.buffer_data(spec.buffer as u32)?;
        let components = spec.components as usize;
        let size = attribute_type.size();

        let mut out = Vec::with_capacity(num_vertices as usize * components);
        for v in 0..num_vertices as usize {
            let base = spec.offset as usize + v * stride;
            let element = &data[base..base + components * size];
            for c in element.chunks_exact(size) {
                out.push(match attribute_type {
                    AttributeType::Float => f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                    AttributeType::Half => half_to_float(u16::from_le_bytes([c[0], c[1]])),
                    AttributeType::Int8 => c[0] as i8 as f32,
                    AttributeType::UInt8 => c[0] as f32,
                    AttributeType::Int16 => i16::from_le_bytes([c[0], c[1]]) as f32,
                    AttributeType::UInt16 => u16::from_le_bytes([c[0], c[1]]) as f32,
                    AttributeType::Int32 => i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32,
                    AttributeType::UInt32 => u32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32,
                });
            }
        }
        Ok(out)
    }
}

/// Memory mapped mesh file.
pub struct MappedMeshFile {
    mmap: Mmap,
}

impl MappedMeshFile {
    pub fn open<P: AsRef<Path>>(path: P) -> MeshResult<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: 映射期间文件不应被其他进程修改
        let mmap = unsafe { Mmap::map(&file)? };
        MeshFile::parse(&mmap)?;
        Ok(Self { mmap })
    }

    pub fn mesh_file(&self) -> MeshResult<MeshFile<'_>> {
        MeshFile::parse(&self.mmap)
    }
}
