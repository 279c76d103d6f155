//! Domain model (IDs, repositories, artifacts, tracking records, errors).
//!
//! このモジュールは I/O を持ちません。loader と ports が共有する型だけを定義します。

pub mod artifact;
pub mod errors;
pub mod ids;
pub mod repository;
pub mod tracked;

pub use self::artifact::{ActivatedUnit, ArtifactEntry, ArtifactKind, Certificate, Provenance};
pub use self::errors::{ErrorKind, LoaderError};
pub use self::ids::{GenerationId, UnitId};
pub use self::repository::{RepositoryKind, RepositoryRef};
pub use self::tracked::{ArchiveRoot, FileStat, TrackedPath};
