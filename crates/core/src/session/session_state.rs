use super::session_error::SessionError;

/// Lifecycle of a camera session.
///
/// `Uninitialized` → `ModelLoading` → `Idle` ⇄ `Active`; any step can end in
/// `Error`, from which a start retries.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Uninitialized,
    ModelLoading,
    Idle,
    Active,
    Error(SessionError),
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    pub fn error(&self) -> Option<&SessionError> {
        match self {
            SessionState::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Whether a start request is accepted. Active counts: the running
    /// capture is stopped first.
    pub fn can_start(&self) -> bool {
        !matches!(self, SessionState::ModelLoading)
    }

    /// Short status text for hosts.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "Not started",
            SessionState::ModelLoading => "Loading model...",
            SessionState::Idle => "Ready",
            SessionState::Active => "Camera running",
            SessionState::Error(_) => "Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_is_uninitialized() {
        assert_eq!(SessionState::default(), SessionState::Uninitialized);
    }

    #[test]
    fn test_error_accessor() {
        let state = SessionState::Error(SessionError::CameraPermission);
        assert_eq!(state.error(), Some(&SessionError::CameraPermission));
        assert!(SessionState::Idle.error().is_none());
    }

    #[rstest]
    #[case(SessionState::Uninitialized, true)]
    #[case(SessionState::ModelLoading, false)]
    #[case(SessionState::Idle, true)]
    #[case(SessionState::Active, true)]
    #[case(SessionState::Error(SessionError::CameraPermission), true)]
    fn test_can_start(#[case] state: SessionState, #[case] expected: bool) {
        assert_eq!(state.can_start(), expected);
    }

    #[test]
    fn test_only_active_is_active() {
        assert!(SessionState::Active.is_active());
        assert!(!SessionState::Idle.is_active());
    }
}
