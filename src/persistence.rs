//! Versioned snapshots of learned state

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{Error, Result, dqn::NetworkState, ports::AgentKind, q_learning::TabularState};

/// Learned state of one agent variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Tabular(TabularState),
    Network(NetworkState),
}

impl AgentState {
    pub fn kind(&self) -> AgentKind {
        match self {
            AgentState::Tabular(_) => AgentKind::Tabular,
            AgentState::Network(_) => AgentKind::Network,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingMetadata {
    /// Episodes completed over the agent's lifetime
    pub episodes: u64,
    /// Timestamp when saved (RFC 3339)
    pub saved_at: Option<String>,
}

/// One persisted blob per agent variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedAgent {
    pub version: u32,
    pub state: AgentState,
    pub metadata: TrainingMetadata,
}

impl SavedAgent {
    /// Current save format version
    pub const VERSION: u32 = 1;

    pub fn new(state: AgentState, episodes: u64) -> Self {
        Self {
            version: Self::VERSION,
            state,
            metadata: TrainingMetadata {
                episodes,
                saved_at: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
            },
        }
    }

    pub fn kind(&self) -> AgentKind {
        self.state.kind()
    }

    /// Reject snapshots of another variant or another format version.
    pub fn check(&self, expected: AgentKind) -> Result<()> {
        if self.version != Self::VERSION {
            return Err(Error::UnsupportedVersion {
                found: self.version,
                expected: Self::VERSION,
            });
        }
        if self.kind() != expected {
            return Err(Error::AgentKindMismatch {
                found: self.kind().to_string(),
                expected: expected.to_string(),
            });
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self).map_err(|e| Error::SerializationContext {
            operation: "serialize agent to MessagePack".to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| Error::SerializationContext {
            operation: "deserialize agent from MessagePack".to_string(),
            message: e.to_string(),
        })
    }
}
