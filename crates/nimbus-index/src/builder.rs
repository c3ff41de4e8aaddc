use nimbus_core::IndexKind;
use nimbus_vfs::MFile;

pub type BuildError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Produces the payload of a fresh index from the files it covers.
///
/// Record decoding lives outside this crate; the engine only persists what the builder
/// returns. Closures with the same signature implement the trait.
pub trait IndexBuilder {
    fn build(&self, kind: IndexKind, sources: &[MFile]) -> Result<Vec<u8>, BuildError>;
}

impl<F> IndexBuilder for F
where
    F: Fn(IndexKind, &[MFile]) -> Result<Vec<u8>, BuildError>,
{
    fn build(&self, kind: IndexKind, sources: &[MFile]) -> Result<Vec<u8>, BuildError> {
        self(kind, sources)
    }
}
