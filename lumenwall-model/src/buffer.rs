/// State of one display framebuffer slot in the double/triple-buffer
/// pipeline (§4.8). Transitions are one-directional except the final
/// `Displaying -> Free`, which only happens once a newer buffer is promoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Free,
    Rendering,
    Pending,
    Displaying,
}

impl BufferState {
    /// Whether `self -> next` is a transition the state machine allows.
    pub fn can_transition_to(self, next: BufferState) -> bool {
        matches!(
            (self, next),
            (BufferState::Free, BufferState::Rendering)
                | (BufferState::Rendering, BufferState::Pending)
                | (BufferState::Pending, BufferState::Displaying)
                | (BufferState::Displaying, BufferState::Free)
        )
    }
}

/// Panel rotation, persisted in configuration and applied identically by the
/// upscaler and (when active) the external GUI toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn as_degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Rotation::Deg0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_state_machine_allows_exactly_the_spec_transitions() {
        use BufferState::*;
        assert!(Free.can_transition_to(Rendering));
        assert!(Rendering.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Displaying));
        assert!(Displaying.can_transition_to(Free));

        assert!(!Free.can_transition_to(Pending));
        assert!(!Rendering.can_transition_to(Displaying));
        assert!(!Pending.can_transition_to(Free));
        assert!(!Displaying.can_transition_to(Rendering));
    }

    #[test]
    fn rotation_round_trips_valid_degrees() {
        for d in [0, 90, 180, 270] {
            assert_eq!(Rotation::from_degrees(d).unwrap().as_degrees(), d);
        }
        assert!(Rotation::from_degrees(45).is_none());
    }
}
