use thiserror::Error;

/// Errors returned by lookups into an [`AvlTree`](crate::AvlTree) or an
/// [`AvlMap`](crate::AvlMap).
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("key not found")]
    KeyNotFound,
}
