use crate::recognition::domain::identity::IdentityRecord;
use crate::shared::source_error::SourceError;

/// Supplies the identities that are actively sought.
///
/// Implementations may return records of any dimension; the registry
/// filters out the ones that do not fit.
pub trait RegistrySource: Send + Sync {
    fn fetch(&self) -> Result<Vec<IdentityRecord>, SourceError>;

    /// Short human-readable name used in logs.
    fn name(&self) -> &str;

    /// True for stand-in sources whose snapshots must be flagged as degraded.
    fn is_degraded(&self) -> bool {
        false
    }
}
