/// An instance as seen by the autoscaler: an opaque provider-id and, optionally, its lifecycle
/// state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub status: Option<InstanceStatus>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceStatus {
    pub state: InstanceState,
    pub error_info: Option<InstanceErrorInfo>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InstanceState {
    Running,
    Creating,
    Deleting,
}

/// Why an instance failed to come up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceErrorInfo {
    pub error_class: InstanceErrorClass,
    pub error_code: String,
    pub error_message: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InstanceErrorClass {
    OutOfResources,
    Other,
}

// === impl Instance ===

impl Instance {
    pub fn new(id: impl Into<String>, state: InstanceState) -> Self {
        Self {
            id: id.into(),
            status: Some(InstanceStatus {
                state,
                error_info: None,
            }),
        }
    }

    pub fn running(id: impl Into<String>) -> Self {
        Self::new(id, InstanceState::Running)
    }

    /// An instance that never finished provisioning.
    pub fn failed(id: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: Some(InstanceStatus {
                state: InstanceState::Creating,
                error_info: Some(InstanceErrorInfo {
                    error_class: InstanceErrorClass::Other,
                    error_code: code.to_string(),
                    error_message: message.into(),
                }),
            }),
        }
    }

    pub fn state(&self) -> Option<InstanceState> {
        self.status.as_ref().map(|s| s.state)
    }
}
