use thiserror::Error;

/// Errors raised by table loading and table stores.
#[derive(Debug, Error)]
pub enum TableError {
    /// No table has been loaded (or imported) yet.
    #[error("no input table is loaded")]
    NotLoaded,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure inside the redb backend.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("keycode index error: {0}")]
    Index(#[from] fst::Error),

    #[error("table encoding error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Map any redb error into [`TableError::Storage`].
pub(crate) fn storage<E: Into<redb::Error>>(err: E) -> TableError {
    TableError::Storage(err.into().to_string())
}
