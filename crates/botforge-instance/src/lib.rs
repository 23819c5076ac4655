/// Opaque instance identifier shared by a generated artifact and the
/// supervised process started from it. At most one live process exists per
/// id at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a supervised instance. Transitions are one-way:
/// Starting -> Running -> Stopped | Crashed. There is no way back to
/// Starting; a terminal instance leaves the registry and the id is reused
/// only by a fresh start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InstanceState {
    Starting,
    Running,
    Stopped,
    Crashed,
}

impl InstanceState {
    /// States that occupy the instance slot in the live registry.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InstanceStatus {
    pub instance_id: InstanceId,
    pub template_id: String,
    pub state: InstanceState,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub started_at_unix_ms: u64,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_id_is_non_empty() {
        let id = InstanceId::new();
        assert!(!id.0.is_empty());
    }

    #[test]
    fn instance_ids_are_unique() {
        assert_ne!(InstanceId::new(), InstanceId::new());
    }

    #[test]
    fn live_states() {
        assert!(InstanceState::Starting.is_live());
        assert!(InstanceState::Running.is_live());
        assert!(!InstanceState::Stopped.is_live());
        assert!(!InstanceState::Crashed.is_live());
    }
}
