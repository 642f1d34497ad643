/// Lifecycle of the single active link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Scanning,
    Connecting,
    DiscoveringCapabilities,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    /// Whether `next` is an edge of the connection graph.
    ///
    /// Any state may drop straight to `Disconnected` (radio loss, power off);
    /// otherwise the path is `Disconnected -> Connecting ->
    /// DiscoveringCapabilities -> Connected -> Disconnecting`, with scanning
    /// only entered from and left to `Disconnected`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (from, Disconnected) => from != Disconnected,
            (Disconnected, Scanning) | (Disconnected, Connecting) => true,
            (Connecting, DiscoveringCapabilities) => true,
            (DiscoveringCapabilities, Connected) => true,
            (Connected, Disconnecting) => true,
            _ => false,
        }
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;

    #[test]
    fn connect_path_cannot_skip_capability_discovery() {
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(DiscoveringCapabilities));
        assert!(!Connecting.can_transition_to(Connected));
        assert!(DiscoveringCapabilities.can_transition_to(Connected));
    }

    #[test]
    fn every_state_can_drop_to_disconnected() {
        for state in [Scanning, Connecting, DiscoveringCapabilities, Connected, Disconnecting] {
            assert!(state.can_transition_to(Disconnected), "{state:?}");
        }
        assert!(!Disconnected.can_transition_to(Disconnected));
    }

    #[test]
    fn scanning_only_round_trips_through_disconnected() {
        assert!(Disconnected.can_transition_to(Scanning));
        assert!(!Scanning.can_transition_to(Connecting));
        assert!(!Connected.can_transition_to(Scanning));
    }
}
