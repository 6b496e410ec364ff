/// Track state enumeration for object tracking lifecycle.
///
/// `Tentative -> Confirmed -> Lost -> Deleted`, with `Lost -> Confirmed`
/// as the only backward edge. `Deleted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum TrackState {
    /// Newly created track, not yet confirmed
    #[default]
    Tentative,
    /// Actively tracked object
    Confirmed,
    /// Temporarily lost track, eligible for recovery under the same id
    Lost,
    /// Removed from tracking; the id is never handed out again
    Deleted,
}

impl TrackState {
    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: TrackState) -> bool {
        use TrackState::*;
        matches!(
            (self, next),
            (Tentative, Tentative)
                | (Tentative, Confirmed)
                | (Tentative, Deleted)
                | (Confirmed, Confirmed)
                | (Confirmed, Lost)
                | (Lost, Lost)
                | (Lost, Confirmed)
                | (Lost, Deleted)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::TrackState::*;

    #[test]
    fn test_only_backward_edge_is_recovery() {
        assert!(Lost.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(Tentative));
        assert!(!Lost.can_transition_to(Tentative));
        assert!(!Deleted.can_transition_to(Confirmed));
        assert!(!Deleted.can_transition_to(Deleted));
    }
}
