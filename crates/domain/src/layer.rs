//! Structural classification of monitored methods.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Architectural layer a wrapped call site belongs to.
///
/// Each call site states its layer explicitly when it is wrapped; the layer
/// selects the default monitoring policy and becomes the `layer` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Layer {
    /// Inbound request handlers.
    Controller,
    /// Business services.
    Service,
    /// Persistence access.
    Repository,
    /// Outbound clients of other services.
    RemoteClient,
}

impl Layer {
    /// Every layer, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Controller,
        Self::Service,
        Self::Repository,
        Self::RemoteClient,
    ];

    /// Tag value for this layer.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Service => "service",
            Self::Repository => "repository",
            Self::RemoteClient => "remote-client",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_values_are_stable() {
        let tags: Vec<&str> = Layer::ALL.iter().map(|layer| layer.as_str()).collect();
        assert_eq!(
            tags,
            vec!["controller", "service", "repository", "remote-client"]
        );
    }

    #[test]
    fn serde_uses_camel_case() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&Layer::RemoteClient)?, "\"remoteClient\"");
        assert_eq!(serde_json::from_str::<Layer>("\"service\"")?, Layer::Service);
        Ok(())
    }
}
