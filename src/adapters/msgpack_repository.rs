//! MessagePack implementation of the agent repository.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use crate::{Result, error::Error, persistence::SavedAgent, ports::AgentRepository};

/// MessagePack-based agent repository.
///
/// Snapshots are written to a temporary sibling file and renamed into place,
/// so an interrupted save never leaves a truncated blob behind.
///
/// # Examples
///
/// ```no_run
/// use scroller::adapters::MsgPackRepository;
/// use scroller::ports::AgentRepository;
/// use std::path::Path;
///
/// let repo = MsgPackRepository::new();
/// let saved = repo.load(Path::new("state/tabular.msgpack"))?;
/// repo.save(&saved, Path::new("backup/tabular.msgpack"))?;
/// # Ok::<(), scroller::Error>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackRepository;

impl MsgPackRepository {
    /// Create a new MessagePack repository.
    pub fn new() -> Self {
        Self
    }
}

impl AgentRepository for MsgPackRepository {
    fn save(&self, agent: &SavedAgent, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| Error::Io {
                operation: format!("create directory {parent:?}"),
                source,
            })?;
        }

        let tmp = path.with_extension("msgpack.tmp");
        let file = File::create(&tmp).map_err(|source| Error::Io {
            operation: format!("create file {tmp:?}"),
            source,
        })?;
        let mut writer = BufWriter::new(file);

        rmp_serde::encode::write(&mut writer, agent).map_err(|e| {
            Error::SerializationContext {
                operation: "serialize agent to MessagePack".to_string(),
                message: e.to_string(),
            }
        })?;
        writer.flush().map_err(|source| Error::Io {
            operation: format!("flush file {tmp:?}"),
            source,
        })?;
        drop(writer);

        fs::rename(&tmp, path).map_err(|source| Error::Io {
            operation: format!("move {tmp:?} to {path:?}"),
            source,
        })
    }

    fn load(&self, path: &Path) -> Result<SavedAgent> {
        let file = File::open(path).map_err(|source| Error::Io {
            operation: format!("open file {path:?}"),
            source,
        })?;

        rmp_serde::decode::from_read(BufReader::new(file)).map_err(|e| {
            Error::SerializationContext {
                operation: "deserialize agent from MessagePack".to_string(),
                message: e.to_string(),
            }
        })
    }
}
