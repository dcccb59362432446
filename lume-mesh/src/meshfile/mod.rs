//! Binary mesh file format.
//!
//! Layout, all offsets absolute from the start of the file:
//!
//! ```text
//! MeshFileHeader
//! BufferEntry          x num_buffers (index buffers first)
//! IndexSpec            x num_index_specs
//! VertexDataSet        x num_vertex_data_sets
//! VertexAttributeSpec  x (sum of all data sets)
//! zero padding to 8
//! buffer payloads, each padded to 8
//! ```

pub mod reader;
pub mod writer;

use bytemuck::{Pod, Zeroable};

pub use reader::{MappedMeshFile, MeshFile};
pub use writer::{MeshFileContents, MeshFileLayout, VertexDataSetContents};

#[cfg(not(target_endian = "little"))]
compile_error!("mesh files are little-endian and written straight from memory");

pub const MAGIC: u32 = 0x8e8e_54f1;
pub const VERSION: u32 = 1;
pub const BUFFER_ALIGNMENT: usize = 8;
pub const MATERIAL_NAME_LEN: usize = 32;

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    Vertex = 1,
    Index = 2,
}

impl BufferKind {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Vertex),
            2 => Some(Self::Index),
            _ => None,
        }
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexType {
    UInt8 = 1,
    UInt16,
    UInt32,
}

impl IndexType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::UInt8),
            2 => Some(Self::UInt16),
            3 => Some(Self::UInt32),
            _ => None,
        }
    }

    pub fn size(self) -> usize {
        match self {
            Self::UInt8 => 1,
            Self::UInt16 => 2,
            Self::UInt32 => 4,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshFileHeader {
    pub magic: u32,
    pub version: u32,
    pub reserved: u32,
    /// Index and vertex buffers combined
    pub num_buffers: u32,
    pub num_vertex_data_sets: u32,
    pub num_index_specs: u32,
    pub vertex_data_sets_offset: u32,
    pub index_specs_offset: u32,
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct BufferEntry {
    /// `BufferKind`
    pub kind: u32,
    pub offset: u32,
    pub size: u32,
    pub reserved: u32,
}

/// Describes one draw range inside an index buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct IndexSpec {
    /// `PrimitiveMode`
    pub mode: u32,
    /// `IndexType`
    pub index_type: u32,
    /// Index into the buffer table
    pub buffer: u32,
    /// Byte offset inside the buffer
    pub offset: u32,
    /// Number of indices
    pub count: u32,
    pub vertex_data_set: u32,
    pub material: [u8; MATERIAL_NAME_LEN],
}

impl IndexSpec {
    /// Material name up to the first NUL byte.
    pub fn material_name(&self) -> String {
        let end = self
            .material
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MATERIAL_NAME_LEN);
        String::from_utf8_lossy(&self.material[..end]).into_owned()
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct VertexDataSet {
    pub num_vertex_specs: u32,
    pub vertex_specs_offset: u32,
    pub num_vertices: u32,
    pub reserved: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct VertexAttributeSpec {
    pub semantic: u32,
    /// `AttributeType`
    pub attribute_type: u32,
    pub components: i32,
    /// Byte offset of the first element inside the buffer
    pub offset: i32,
    /// 0 means tightly packed
    pub stride: i32,
    /// Index into the buffer table
    pub buffer: i32,
    pub normalized: u8,
    pub _padding: [u8; 3],
}

const _: () = assert!(std::mem::size_of::<MeshFileHeader>() == 56);
const _: () = assert!(std::mem::size_of::<BufferEntry>() == 16);
const _: () = assert!(std::mem::size_of::<IndexSpec>() == 56);
const _: () = assert!(std::mem::size_of::<VertexDataSet>() == 16);
const _: () = assert!(std::mem::size_of::<VertexAttributeSpec>() == 28);

/// Zero padded, truncated at 32 bytes.
pub fn encode_material_name(name: &str) -> [u8; MATERIAL_NAME_LEN] {
    let mut out = [0u8; MATERIAL_NAME_LEN];
    let bytes = name.as_bytes();
    let len = bytes.len().min(MATERIAL_NAME_LEN);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

pub fn align_to_buffer(offset: usize) -> usize {
    (offset + BUFFER_ALIGNMENT - 1) & !(BUFFER_ALIGNMENT - 1)
}
