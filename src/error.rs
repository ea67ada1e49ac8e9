use crate::ir::ShapeId;

pub type Result<T> = std::result::Result<T, DiagramError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DiagramError {
    #[error("Unknown shape {0:?}: it does not belong to this document")]
    UnknownShape(ShapeId),

    #[error("Unknown element id: {0}")]
    UnknownShapeName(String),

    #[error("Duplicate element id: {0}")]
    DuplicateShapeName(String),

    #[error("Fork from {origin:?} needs at least one target")]
    EmptyFork { origin: ShapeId },
}
