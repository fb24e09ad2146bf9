//! Form state machine: tracks where a conversation is within its form.

/// The states of a form session.
///
/// Progresses linearly: AwaitingField(0) → … → AwaitingField(n-1) →
/// AwaitingConfirmation → Completed. Cancelled is reachable from every
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormState {
    AwaitingField(usize),
    AwaitingConfirmation,
    Completed,
    Cancelled,
}

impl FormState {
    /// Initial state on form entry.
    pub fn initial() -> Self {
        Self::AwaitingField(0)
    }

    /// Check if a transition from `self` to `target` is valid for a form
    /// with `field_count` fields.
    pub fn can_transition_to(&self, target: FormState, field_count: usize) -> bool {
        use FormState::*;
        match (self, target) {
            (AwaitingField(_) | AwaitingConfirmation, Cancelled) => true,
            (AwaitingField(i), AwaitingField(j)) => j == i + 1 && j < field_count,
            (AwaitingField(i), AwaitingConfirmation) => i + 1 == field_count,
            (AwaitingConfirmation, Completed) => true,
            _ => false,
        }
    }

    /// Whether the session is finished and must be released.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// The state after field `index` has been answered.
    pub fn after_field(index: usize, field_count: usize) -> Self {
        if index + 1 >= field_count {
            Self::AwaitingConfirmation
        } else {
            Self::AwaitingField(index + 1)
        }
    }
}

impl std::fmt::Display for FormState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingField(i) => write!(f, "awaiting_field({i})"),
            Self::AwaitingConfirmation => write!(f, "awaiting_confirmation"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use FormState::*;
        let transitions = [
            (AwaitingField(0), AwaitingField(1)),
            (AwaitingField(1), AwaitingField(2)),
            (AwaitingField(2), AwaitingConfirmation),
            (AwaitingConfirmation, Completed),
            (AwaitingField(1), Cancelled),
            (AwaitingConfirmation, Cancelled),
        ];
        for (from, to) in transitions {
            assert!(from.can_transition_to(to, 3), "{from} should transition to {to}");
        }
    }

    #[test]
    fn invalid_transitions() {
        use FormState::*;
        // Skip fields
        assert!(!AwaitingField(0).can_transition_to(AwaitingField(2), 3));
        // Confirm early
        assert!(!AwaitingField(0).can_transition_to(AwaitingConfirmation, 3));
        // Go backward
        assert!(!AwaitingField(2).can_transition_to(AwaitingField(1), 3));
        // Past the last field
        assert!(!AwaitingField(2).can_transition_to(AwaitingField(3), 3));
        // Terminal
        assert!(!Completed.can_transition_to(Cancelled, 3));
        assert!(!Cancelled.can_transition_to(AwaitingField(0), 3));
        // Complete without confirmation
        assert!(!AwaitingField(2).can_transition_to(Completed, 3));
    }

    #[test]
    fn after_field_walks_to_confirmation() {
        let mut state = FormState::initial();
        let mut index = 0;
        while let FormState::AwaitingField(i) = state {
            let next = FormState::after_field(i, 3);
            assert!(state.can_transition_to(next, 3));
            state = next;
            index += 1;
        }
        assert_eq!(index, 3);
        assert_eq!(state, FormState::AwaitingConfirmation);
    }

    #[test]
    fn is_terminal() {
        assert!(FormState::Completed.is_terminal());
        assert!(FormState::Cancelled.is_terminal());
        assert!(!FormState::AwaitingConfirmation.is_terminal());
        assert!(!FormState::AwaitingField(0).is_terminal());
    }
}
