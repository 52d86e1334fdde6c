use crate::ports::PortError;

/// Lifecycle of one sign flow. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignPhase {
    Idle,
    PreSign,
    Signing,
    Completed,
    Terminated,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignAction {
    Invoke,
    Sign,
    Finish,
    NothingToSign,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: SignPhase,
    pub to: SignPhase,
    pub reason: &'static str,
}

pub fn sign_transition(
    phase: SignPhase,
    action: SignAction,
) -> Result<(SignPhase, StateTransition), PortError> {
    use SignAction as A;
    use SignPhase as P;

    let (to, reason) = match (phase, action) {
        (P::Idle, A::Invoke) => (P::PreSign, "flow_started"),
        (P::PreSign, A::Sign) => (P::Signing, "sign_requested"),
        (P::Signing, A::Finish) => (P::Completed, "result_emitted"),
        (P::Signing, A::NothingToSign) => (P::Terminated, "model_not_prepared"),
        (P::Idle | P::PreSign | P::Signing, A::Cancel) => (P::Cancelled, "cancelled"),
        _ => {
            return Err(PortError::Validation(format!(
                "illegal sign transition: {phase:?} via {action:?}"
            )))
        }
    };

    Ok((
        to,
        StateTransition {
            from: phase,
            to,
            reason,
        },
    ))
}

pub fn is_terminal(phase: SignPhase) -> bool {
    matches!(
        phase,
        SignPhase::Completed | SignPhase::Terminated | SignPhase::Cancelled
    )
}
