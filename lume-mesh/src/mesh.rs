//! Intermediate mesh representation shared by the importers, the processing
//! stages and the mesh-file writer.

use bytemuck::Pod;
use glam::Vec3;

use crate::error::{MeshError, MeshResult};

/// Hashed vertex attribute names as stored in mesh files.
pub mod semantic {
    pub const POSITION: u32 = 0xe7dc_cea2;
    pub const NORMAL: u32 = 0x11c3_6e42;
    pub const TEXTURE_COORDS: u32 = 0x7dd0_ace6;
    pub const VERTEX_PRT0: u32 = 0xc03b_4aec;
    pub const VERTEX_PRT1: u32 = 0xa273_9294;
    pub const VERTEX_PRT2: u32 = 0x9d20_51c8;
    pub const SKIN_WEIGHTS: u32 = 0xfc22_8c1f;
    pub const SKIN_JOINTS: u32 = 0xe2cf_8e75;

    pub fn name(semantic: u32) -> Option<&'static str> {
        match semantic {
            POSITION => Some("position"),
            NORMAL => Some("normal"),
            TEXTURE_COORDS => Some("texture_coords"),
            VERTEX_PRT0 => Some("vertex_prt0"),
            VERTEX_PRT1 => Some("vertex_prt1"),
            VERTEX_PRT2 => Some("vertex_prt2"),
            SKIN_WEIGHTS => Some("skin_weights"),
            SKIN_JOINTS => Some("skin_joints"),
            _ => None,
        }
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeType {
    Float = 1,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Half,
}

impl AttributeType {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::Float,
            2 => Self::Int8,
            3 => Self::UInt8,
            4 => Self::Int16,
            5 => Self::UInt16,
            6 => Self::Int32,
            7 => Self::UInt32,
            8 => Self::Half,
            _ => return None,
        })
    }

    /// Size of one component in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 | Self::Half => 2,
            Self::Float | Self::Int32 | Self::UInt32 => 4,
        }
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveMode {
    Points = 1,
    Triangles,
    Lines,
    TriangleFan,
    TriangleStrip,
    LineStrip,
    LineStripAdjacency,
    TrianglesAdjacency,
    TriangleStripAdjacency,
}

impl PrimitiveMode {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::Points,
            2 => Self::Triangles,
            3 => Self::Lines,
            4 => Self::TriangleFan,
            5 => Self::TriangleStrip,
            6 => Self::LineStrip,
            7 => Self::LineStripAdjacency,
            8 => Self::TrianglesAdjacency,
            9 => Self::TriangleStripAdjacency,
            _ => return None,
        })
    }
}

/// Element types that map directly onto an attribute type and component count.
pub trait AttributeElement: Pod {
    const TYPE: AttributeType;
    const COMPONENTS: u32;
}

impl AttributeElement for f32 {
    const TYPE: AttributeType = AttributeType::Float;
    const COMPONENTS: u32 = 1;
}

impl AttributeElement for [f32; 2] {
    const TYPE: AttributeType = AttributeType::Float;
    const COMPONENTS: u32 = 2;
}

impl AttributeElement for [f32; 3] {
    const TYPE: AttributeType = AttributeType::Float;
    const COMPONENTS: u32 = 3;
}

impl AttributeElement for [f32; 4] {
    const TYPE: AttributeType = AttributeType::Float;
    const COMPONENTS: u32 = 4;
}

impl AttributeElement for [i32; 4] {
    const TYPE: AttributeType = AttributeType::Int32;
    const COMPONENTS: u32 = 4;
}

/// Tightly packed per-vertex data of one semantic.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    attribute_type: AttributeType,
    components: u32,
    data: Vec<u8>,
}

impl Attribute {
    pub fn from_elements<T: AttributeElement>(elements: &[T]) -> Self {
        Self {
            attribute_type: T::TYPE,
            components: T::COMPONENTS,
            data: bytemuck::cast_slice(elements).to_vec(),
        }
    }

    pub fn from_raw(attribute_type: AttributeType, components: u32, data: Vec<u8>) -> Self {
        Self { attribute_type, components, data }
    }

    pub fn attribute_type(&self) -> AttributeType {
        self.attribute_type
    }

    pub fn components(&self) -> u32 {
        self.components
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes per vertex.
    pub fn element_size(&self) -> usize {
        self.attribute_type.size() * self.components as usize
    }

    pub fn count(&self) -> usize {
        match self.element_size() {
            0 => 0,
            size => self.data.len() / size,
        }
    }

    /// Copies the data out as typed elements.
    pub fn to_elements<T: AttributeElement>(&self) -> MeshResult<Vec<T>> {
        if self.attribute_type != T::TYPE || self.components != T::COMPONENTS {
            return Err(MeshError::AttributeMismatch(format!(
                "attribute holds {:?}x{}, requested {:?}x{}",
                self.attribute_type,
                self.components,
                T::TYPE,
                T::COMPONENTS
            )));
        }
        Ok(self
            .data
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }
}

/// Axis aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::INFINITY,
        max: Vec3::NEG_INFINITY,
    };

    pub fn stretch(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// One draw call worth of geometry: attributes, an index list and a material.
#[derive(Clone, Debug)]
pub struct Mesh {
    indices: Vec<u32>,
    num_vertices: u32,
    mode: PrimitiveMode,
    material: String,
    // 插入顺序即写出顺序
    attributes: Vec<(u32, Attribute)>,
}

pub type MeshSet = Vec<Mesh>;

impl Mesh {
    pub fn new(num_vertices: u32) -> Self {
        Self::with_mode(num_vertices, PrimitiveMode::Triangles)
    }

    pub fn with_mode(num_vertices: u32, mode: PrimitiveMode) -> Self {
        Self {
            indices: Vec::new(),
            num_vertices,
            mode,
            material: String::new(),
            attributes: Vec::new(),
        }
    }

    pub fn set_attribute<T: AttributeElement>(&mut self, semantic: u32, elements: &[T]) -> MeshResult<()> {
        self.set_attribute_data(semantic, Attribute::from_elements(elements))
    }

    /// Adds or replaces an attribute. Its vertex count must match the mesh.
    pub fn set_attribute_data(&mut self, semantic: u32, attribute: Attribute) -> MeshResult<()> {
        let expected = self.num_vertices as usize * attribute.element_size();
        if attribute.data.len() != expected {
            return Err(MeshError::AttributeMismatch(format!(
                "attribute {:#010x} has {} bytes, mesh with {} vertices needs {}",
                semantic,
                attribute.data.len(),
                self.num_vertices,
                expected
            )));
        }

        match self.attributes.iter_mut().find(|(s, _)| *s == semantic) {
            Some(slot) => slot.1 = attribute,
            None => self.attributes.push((semantic, attribute)),
        }
        Ok(())
    }

    pub fn attribute(&self, semantic: u32) -> Option<&Attribute> {
        self.attributes.iter().find(|(s, _)| *s == semantic).map(|(_, a)| a)
    }

    pub fn remove_attribute(&mut self, semantic: u32) -> Option<Attribute> {
        let position = self.attributes.iter().position(|(s, _)| *s == semantic)?;
        Some(self.attributes.remove(position).1)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (u32, &Attribute)> {
        self.attributes.iter().map(|(s, a)| (*s, a))
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn set_indices(&mut self, indices: Vec<u32>) {
        self.indices = indices;
    }

    pub fn num_vertices(&self) -> u32 {
        self.num_vertices
    }

    pub fn mode(&self) -> PrimitiveMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PrimitiveMode) {
        self.mode = mode;
    }

    pub fn material(&self) -> &str {
        &self.material
    }

    pub fn set_material(&mut self, material: impl Into<String>) {
        self.material = material.into();
    }

    pub fn positions(&self) -> MeshResult<Vec<Vec3>> {
        let attribute = self
            .attribute(semantic::POSITION)
            .ok_or_else(|| MeshError::MalformedInput("mesh has no position attribute".into()))?;
        Ok(attribute
            .to_elements::<[f32; 3]>()?
            .into_iter()
            .map(Vec3::from_array)
            .collect())
    }

    pub fn scale_positions(&mut self, factor: f32) -> MeshResult<()> {
        let scaled: Vec<[f32; 3]> = self
            .positions()?
            .into_iter()
            .map(|p| (p * factor).to_array())
            .collect();
        self.set_attribute(semantic::POSITION, &scaled)
    }

    /// Bounds of the position attribute, empty when the mesh has none.
    pub fn bounds(&self) -> MeshResult<Aabb> {
        let mut bounds = Aabb::EMPTY;
        if self.attribute(semantic::POSITION).is_some() {
            for p in self.positions()? {
                bounds.stretch(p);
            }
        }
        Ok(bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_count_must_match_vertices() {
        let mut mesh = Mesh::new(3);
        let err = mesh.set_attribute(semantic::POSITION, &[[0.0f32; 3]; 2]);
        assert!(matches!(err, Err(MeshError::AttributeMismatch(_))));
        assert!(mesh.set_attribute(semantic::POSITION, &[[0.0f32; 3]; 3]).is_ok());
    }

    #[test]
    fn set_attribute_replaces_in_place() {
        let mut mesh = Mesh::new(1);
        mesh.set_attribute(semantic::POSITION, &[[1.0f32, 2.0, 3.0]]).unwrap();
        mesh.set_attribute(semantic::NORMAL, &[[0.0f32, 1.0, 0.0]]).unwrap();
        mesh.set_attribute(semantic::POSITION, &[[4.0f32, 5.0, 6.0]]).unwrap();

        let order: Vec<u32> = mesh.attributes().map(|(s, _)| s).collect();
        assert_eq!(order, vec![semantic::POSITION, semantic::NORMAL]);
        assert_eq!(mesh.positions().unwrap(), vec![Vec3::new(4.0, 5.0, 6.0)]);
    }

    #[test]
    fn typed_access_checks_layout() {
        let attribute = Attribute::from_elements(&[[1.0f32, 2.0]]);
        assert!(attribute.to_elements::<[f32; 3]>().is_err());
        assert_eq!(attribute.to_elements::<[f32; 2]>().unwrap(), vec![[1.0, 2.0]]);
        assert_eq!(attribute.count(), 1);
    }

    #[test]
    fn scale_and_bounds() {
        let mut mesh = Mesh::new(2);
        mesh.set_attribute(semantic::POSITION, &[[1.0f32, -2.0, 0.5], [-1.0, 4.0, 0.0]])
            .unwrap();
        mesh.scale_positions(2.0).unwrap();

        let bounds = mesh.bounds().unwrap();
        assert_eq!(bounds.min, Vec3::new(-2.0, -4.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(2.0, 8.0, 1.0));
    }

    #[test]
    fn mesh_without_positions_has_empty_bounds() {
        let mesh = Mesh::new(0);
        assert!(mesh.bounds().unwrap().is_empty());
        assert!(!Aabb { min: Vec3::ZERO, max: Vec3::ZERO }.is_empty());
    }
}
