pub mod error;
pub mod model;
pub mod parsing;

pub use error::ErrorKind;
pub use model::{Artifact, ExamType, SubjectMapping, WorkflowStatus};
pub use parsing::{ParsedIdentity, PartialIdentity};
