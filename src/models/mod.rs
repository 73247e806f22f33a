//! Data model shared by executors, fusion and the orchestrator

mod agent_message;
mod intent;
mod search_result;

pub use agent_message::AgentMessage;
pub use intent::{FusionMode, IntentType, QueryIntent, TemporalParams, TextParams, VisualParams};
pub use search_result::{IdentityKey, ResultType, SearchResult};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every component that can author an [`AgentMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    #[serde(rename = "TextSearchAgent")]
    TextSearch,
    #[serde(rename = "VisualSearchAgent")]
    VisualSearch,
    #[serde(rename = "TemporalAgent")]
    Temporal,
    #[serde(rename = "ResultFusionAgent")]
    ResultFusion,
    #[serde(rename = "OrchestratorAgent")]
    Orchestrator,
}

impl AgentKind {
    pub const ALL: [AgentKind; 5] = [
        AgentKind::TextSearch,
        AgentKind::VisualSearch,
        AgentKind::Temporal,
        AgentKind::ResultFusion,
        AgentKind::Orchestrator,
    ];

    /// Wire name used by the classifier and in explanations
    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::TextSearch => "TextSearchAgent",
            AgentKind::VisualSearch => "VisualSearchAgent",
            AgentKind::Temporal => "TemporalAgent",
            AgentKind::ResultFusion => "ResultFusionAgent",
            AgentKind::Orchestrator => "OrchestratorAgent",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name.trim())
    }

    /// Whether this agent retrieves candidates (as opposed to merging them)
    pub fn is_retrieval(&self) -> bool {
        matches!(
            self,
            AgentKind::TextSearch | AgentKind::VisualSearch | AgentKind::Temporal
        )
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
