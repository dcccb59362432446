use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::mem::size_of;
use std::path::Path;

use bytemuck::{bytes_of, cast_slice};
use log::{debug, warn};

use super::{
    align_to_buffer, encode_material_name, BufferEntry, BufferKind, IndexSpec, IndexType,
    MeshFileHeader, VertexAttributeSpec, VertexDataSet, MAGIC, VERSION,
};
use crate::error::{MeshError, MeshResult};
use crate::mesh::{Aabb, Mesh};

/// Vertex attribute specs sharing one vertex count.
#[derive(Clone, Debug, Default)]
pub struct VertexDataSetContents {
    /// `buffer` counts vertex buffers only, starting at 0
    pub specs: Vec<VertexAttributeSpec>,
    pub num_vertices: u32,
}

/// Everything that goes into one mesh file.
#[derive(Clone, Debug, Default)]
pub struct MeshFileContents<'a> {
    pub index_buffers: Vec<Cow<'a, [u8]>>,
    pub vertex_buffers: Vec<Cow<'a, [u8]>>,
    pub vertex_data_sets: Vec<VertexDataSetContents>,
    pub index_specs: Vec<IndexSpec>,
    pub bounds: Aabb,
}

/// Absolute byte offsets of every section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshFileLayout {
    pub index_specs_offset: usize,
    pub vertex_data_sets_offset: usize,
    pub vertex_specs_offset: usize,
    pub headers_end: usize,
    pub buffers_start: usize,
    /// Buffer table order: index buffers, then vertex buffers
    pub buffer_offsets: Vec<usize>,
    pub file_size: usize,
}

impl<'a> MeshFileContents<'a> {
    /// One index buffer and one vertex data set per mesh, one tightly packed
    /// vertex buffer per attribute.
    pub fn from_mesh_set(meshes: &'a [Mesh]) -> MeshResult<Self> {
        let mut contents = MeshFileContents::default();

        for mesh in meshes {
            let indices = mesh.indices();
            if let Some(&bad) = indices.iter().find(|&&i| i >= mesh.num_vertices()) {
                return Err(MeshError::IndexOutOfRange {
                    stream: "mesh indices",
                    index: bad,
                    count: mesh.num_vertices() as usize,
                });
            }

            // 能用 16 位索引就用 16 位
            let fits_u16 = indices.iter().all(|&i| i <= u16::MAX as u32);
            let (index_type, index_bytes) = if fits_u16 {
                let narrow: Vec<u16> = indices.iter().map(|&i| i as u16).collect();
                (IndexType::UInt16, Cow::Owned(cast_slice::<u16, u8>(&narrow).to_vec()))
            } else {
                (IndexType::UInt32, Cow::Borrowed(cast_slice::<u32, u8>(indices)))
            };

            contents.index_specs.push(IndexSpec {
                mode: mesh.mode() as u32,
                index_type: index_type as u32,
                buffer: contents.index_buffers.len() as u32,
                offset: 0,
                count: indices.len() as u32,
                vertex_data_set: contents.vertex_data_sets.len() as u32,
                material: encode_material_name(mesh.material()),
            });
            contents.index_buffers.push(index_bytes);

            let mut specs = Vec::new();
            for (semantic, attribute) in mesh.attributes() {
                specs.push(VertexAttributeSpec {
                    semantic,
                    attribute_type: attribute.attribute_type() as u32,
                    components: attribute.components() as i32,
                    offset: 0,
                    stride: 0,
                    buffer: contents.vertex_buffers.len() as i32,
                    normalized: 1,
                    _padding: [0; 3],
                });
                contents.vertex_buffers.push(Cow::Borrowed(attribute.raw_data()));
            }
            contents.vertex_data_sets.push(VertexDataSetContents {
                specs,
                num_vertices: mesh.num_vertices(),
            });

            contents.bounds = contents.bounds.union(&mesh.bounds()?);
        }

        Ok(contents)
    }

    pub fn num_buffers(&self) -> usize {
        self.index_buffers.len() + self.vertex_buffers.len()
    }

    pub fn layout(&self) -> MeshFileLayout {
        let index_specs_offset =
            size_of::<MeshFileHeader>() + self.num_buffers() * size_of::<BufferEntry>();
        let vertex_data_sets_offset =
            index_specs_offset + self.index_specs.len() * size_of::<IndexSpec>();
        let vertex_specs_offset =
            vertex_data_sets_offset + self.vertex_data_sets.len() * size_of::<VertexDataSet>();
        let total_specs: usize = self.vertex_data_sets.iter().map(|s| s.specs.len()).sum();
        let headers_end = vertex_specs_offset + total_specs * size_of::<VertexAttributeSpec>();
        let buffers_start = align_to_buffer(headers_end);

        let mut buffer_offsets = Vec::with_capacity(self.num_buffers());
        let mut offset = buffers_start;
        for buffer in self.index_buffers.iter().chain(self.vertex_buffers.iter()) {
            buffer_offsets.push(offset);
            offset = align_to_buffer(offset + buffer.len());
        }

        MeshFileLayout {
            index_specs_offset,
            vertex_data_sets_offset,
            vertex_specs_offset,
            headers_end,
            buffers_start,
            buffer_offsets,
            file_size: offset,
        }
    }

    fn validate(&self, layout: &MeshFileLayout) -> MeshResult<()> {
        if layout.file_size > u32::MAX as usize {
            return Err(MeshError::MalformedInput(format!(
                "mesh file would be {} bytes, offsets are 32 bit",
                layout.file_size
            )));
        }

        for spec in &self.index_specs {
            let buffer = self.index_buffers.get(spec.buffer as usize).ok_or_else(|| {
                MeshError::MalformedInput(format!("index spec refers to missing buffer {}", spec.buffer))
            })?;
            let index_type = IndexType::from_u32(spec.index_type).ok_or_else(|| {
                MeshError::MalformedInput(format!("unknown index type {}", spec.index_type))
            })?;
            let end = spec.offset as usize + spec.count as usize * index_type.size();
            if end > buffer.len() {
                return Err(MeshError::MalformedInput(format!(
                    "index spec reads {} bytes from a {} byte buffer",
                    end,
                    buffer.len()
                )));
            }
            if spec.vertex_data_set as usize >= self.vertex_data_sets.len() {
                return Err(MeshError::MalformedInput(format!(
                    "index spec refers to missing vertex data set {}",
                    spec.vertex_data_set
                )));
            }
        }

        for set in &self.vertex_data_sets {
            for spec in &set.specs {
                if spec.buffer < 0 || spec.buffer as usize >= self.vertex_buffers.len() {
                    return Err(MeshError::MalformedInput(format!(
                        "vertex spec {:#010x} refers to missing vertex buffer {}",
                        spec.semantic, spec.buffer
                    )));
                }
            }
        }
        Ok(())
    }

    /// Writes the complete file, returns the number of bytes written.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> MeshResult<usize> {
        let layout = self.layout();
        self.validate(&layout)?;

        let header = MeshFileHeader {
            magic: MAGIC,
            version: VERSION,
            reserved: 0,
            num_buffers: self.num_buffers() as u32,
            num_vertex_data_sets: self.vertex_data_sets.len() as u32,
            num_index_specs: self.index_specs.len() as u32,
            vertex_data_sets_offset: layout.vertex_data_sets_offset as u32,
            index_specs_offset: layout.index_specs_offset as u32,
            bounds_min: self.bounds.min.to_array(),
            bounds_max: self.bounds.max.to_array(),
        };
        writer.write_all(bytes_of(&header))?;

        let kinds = self
            .index_buffers
            .iter()
            .map(|b| (BufferKind::Index, b))
            .chain(self.vertex_buffers.iter().map(|b| (BufferKind::Vertex, b)));
        for ((kind, buffer), &offset) in kinds.zip(&layout.buffer_offsets) {
            let entry = BufferEntry {
                kind: kind as u32,
                offset: offset as u32,
                size: buffer.len() as u32,
                reserved: 0,
            };
            writer.write_all(bytes_of(&entry))?;
        }

        writer.write_all(cast_slice(&self.index_specs))?;

        let mut vertex_specs_offset = layout.vertex_specs_offset;
        for set in &self.vertex_data_sets {
            let data_set = VertexDataSet {
                num_vertex_specs: set.specs.len() as u32,
                vertex_specs_offset: vertex_specs_offset as u32,
                num_vertices: set.num_vertices,
                reserved: 0,
            };
            writer.write_all(bytes_of(&data_set))?;
            vertex_specs_offset += set.specs.len() * size_of::<VertexAttributeSpec>();
        }

        let index_buffer_count = self.index_buffers.len() as i32;
        for set in &self.vertex_data_sets {
            for spec in &set.specs {
                let mut spec = *spec;
                spec.buffer += index_buffer_count;
                writer.write_all(bytes_of(&spec))?;
            }
        }

        let zero = [0u8; super::BUFFER_ALIGNMENT];
        writer.write_all(&zero[..layout.buffers_start - layout.headers_end])?;
        for buffer in self.index_buffers.iter().chain(self.vertex_buffers.iter()) {
            writer.write_all(buffer)?;
            writer.write_all(&zero[..align_to_buffer(buffer.len()) - buffer.len()])?;
        }

        debug!(
            "Mesh file: {} buffers, {} index specs, {} data sets, {} bytes",
            header.num_buffers, header.num_index_specs, header.num_vertex_data_sets, layout.file_size
        );
        Ok(layout.file_size)
    }

    /// Writes to `path`. A partially written file is removed again on error.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> MeshResult<usize> {
        let path = path.as_ref();
        let file = File::create(path)?;

        let write = || -> MeshResult<usize> {
            let mut writer = BufWriter::with_capacity(1024 * 1024, file);
            let written = self.write_to(&mut writer)?;
            writer.flush()?;
            Ok(written)
        };

        write().inspect_err(|_| {
            if let Err(e) = fs::remove_file(path) {
                warn!("Could not remove incomplete mesh file {:?}: {}", path, e);
            }
        })
    }
}
