use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Attribute mismatch: {0}")]
    AttributeMismatch(String),
    #[error("Index {index} out of range for {stream} ({count} entries)")]
    IndexOutOfRange {
        stream: &'static str,
        index: u32,
        count: usize,
    },
    #[error("Invalid mesh file: {0}")]
    InvalidMeshFile(String),
    #[error("OBJ load failed: {0}")]
    Obj(#[from] tobj::LoadError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type MeshResult<T> = Result<T, MeshError>;
