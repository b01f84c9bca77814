pub mod repository;

pub use repository::{ArtifactRepository, InsertOutcome, NewArtifact};
