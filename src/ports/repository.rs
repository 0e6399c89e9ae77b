//! Repository port for learned-state persistence.

use std::path::Path;

use crate::{Result, persistence::SavedAgent};

/// Port for persisting and loading agent snapshots.
///
/// # Examples
///
/// ```no_run
/// use scroller::ports::AgentRepository;
/// use scroller::persistence::SavedAgent;
/// use std::path::Path;
///
/// fn checkpoint<R: AgentRepository>(repo: &R, saved: &SavedAgent) -> scroller::Result<()> {
///     repo.save(saved, Path::new("state/tabular.msgpack"))
/// }
/// ```
pub trait AgentRepository {
    /// Save a snapshot, replacing whatever was stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the location cannot be written or serialization
    /// fails.
    fn save(&self, agent: &SavedAgent, path: &Path) -> Result<()>;

    /// Load a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] with `NotFound` when nothing is stored at
    /// `path`, and a serialization error when the stored bytes are corrupt.
    fn load(&self, path: &Path) -> Result<SavedAgent>;
}
