pub mod archive;
pub mod file_kind;
pub mod storage;

pub use file_kind::FileKind;
