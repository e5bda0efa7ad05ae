use lotwise_core::{CoreError, Isbn13};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LotError {
    #[error("a lot needs at least one member")]
    EmptyLot,

    #[error("pricing member {isbn}: {source}")]
    Member {
        isbn: Isbn13,
        #[source]
        source: CoreError,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}
