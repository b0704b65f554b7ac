mod error;
mod naming;

pub mod filesystem;

use tokio::io::AsyncRead;

pub use error::StorageError;
pub use filesystem::{FilesystemAssetStore, StagedAsset};
pub use naming::{generate_stored_name, sanitize_file_name};

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;
