pub mod error;
pub mod mesh;
pub mod meshfile;
pub mod obj;
pub mod processor;

pub use error::{MeshError, MeshResult};
pub use mesh::{semantic, Aabb, Attribute, AttributeElement, AttributeType, Mesh, MeshSet, PrimitiveMode};
pub use meshfile::{MappedMeshFile, MeshFile, MeshFileContents};
pub use obj::{load_obj_mesh_set, parse_obj};
pub use processor::{process_mesh_set, ProcessOptions};
