use rust_fsm::*;
use serde::Serialize;

state_machine! {
    oauth_flow(Unauthenticated)

    Unauthenticated(HydratePending) => Pending,
    Unauthenticated(HydrateAuthenticated) => Authenticated,

    Unauthenticated(Initiate) => Pending,
    Unauthenticated(Revoke) => Unauthenticated,

    Pending(Initiate) => Pending,
    Pending(Complete) => Authenticated,
    Pending(Expire) => Unauthenticated,
    Pending(Fail) => Unauthenticated,
    Pending(Revoke) => Unauthenticated,

    Authenticated(Initiate) => Authenticated,
    Authenticated(Complete) => Authenticated,
    Authenticated(Refresh) => Authenticated,
    Authenticated(RefreshRejected) => Unauthenticated,
    Authenticated(Revoke) => Unauthenticated
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthState {
    Unauthenticated,
    Pending,
    Authenticated,
}

impl AuthState {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Pending => "pending",
            AuthState::Authenticated => "authenticated",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    Initiate,
    Complete,
    Expire,
    Fail,
    Refresh,
    RefreshRejected,
    Revoke,
}

fn hydrate(machine: &mut oauth_flow::StateMachine, state: AuthState) -> Result<(), ()> {
    let input = match state {
        AuthState::Unauthenticated => return Ok(()),
        AuthState::Pending => oauth_flow::Input::HydratePending,
        AuthState::Authenticated => oauth_flow::Input::HydrateAuthenticated,
    };
    machine.consume(&input).map_err(|_| ())?;
    Ok(())
}

fn expected_next_state(current: AuthState, event: AuthEvent) -> Option<AuthState> {
    use AuthEvent::*;
    use AuthState::*;
    match (current, event) {
        (Unauthenticated, Initiate) => Some(Pending),
        (Unauthenticated, Revoke) => Some(Unauthenticated),
        (Pending, Initiate) => Some(Pending),
        (Pending, Complete) => Some(Authenticated),
        (Pending, Expire) | (Pending, Fail) | (Pending, Revoke) => Some(Unauthenticated),
        // Re-consent keeps the existing grant usable until the new one lands.
        (Authenticated, Initiate) | (Authenticated, Complete) | (Authenticated, Refresh) => {
            Some(Authenticated)
        }
        (Authenticated, RefreshRejected) | (Authenticated, Revoke) => Some(Unauthenticated),
        _ => None,
    }
}

pub fn transition(current: AuthState, event: AuthEvent) -> Option<AuthState> {
    let mut machine = oauth_flow::StateMachine::new();
    hydrate(&mut machine, current).ok()?;

    let input = match event {
        AuthEvent::Initiate => oauth_flow::Input::Initiate,
        AuthEvent::Complete => oauth_flow::Input::Complete,
        AuthEvent::Expire => oauth_flow::Input::Expire,
        AuthEvent::Fail => oauth_flow::Input::Fail,
        AuthEvent::Refresh => oauth_flow::Input::Refresh,
        AuthEvent::RefreshRejected => oauth_flow::Input::RefreshRejected,
        AuthEvent::Revoke => oauth_flow::Input::Revoke,
    };

    machine.consume(&input).ok()?;
    expected_next_state(current, event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_fsm_happy_path() {
        let pending = transition(AuthState::Unauthenticated, AuthEvent::Initiate);
        assert_eq!(pending, Some(AuthState::Pending));
        let authed = transition(AuthState::Pending, AuthEvent::Complete);
        assert_eq!(authed, Some(AuthState::Authenticated));
        assert_eq!(
            transition(AuthState::Authenticated, AuthEvent::Refresh),
            Some(AuthState::Authenticated)
        );
        assert_eq!(
            transition(AuthState::Authenticated, AuthEvent::Revoke),
            Some(AuthState::Unauthenticated)
        );
    }

    #[test]
    fn oauth_fsm_failure_paths_return_to_unauthenticated() {
        assert_eq!(
            transition(AuthState::Pending, AuthEvent::Expire),
            Some(AuthState::Unauthenticated)
        );
        assert_eq!(
            transition(AuthState::Pending, AuthEvent::Fail),
            Some(AuthState::Unauthenticated)
        );
        assert_eq!(
            transition(AuthState::Authenticated, AuthEvent::RefreshRejected),
            Some(AuthState::Unauthenticated)
        );
        assert_eq!(
            transition(AuthState::Pending, AuthEvent::Initiate),
            Some(AuthState::Pending)
        );
    }

    #[test]
    fn oauth_fsm_rejects_invalid_transition() {
        assert_eq!(transition(AuthState::Unauthenticated, AuthEvent::Complete), None);
        assert_eq!(transition(AuthState::Unauthenticated, AuthEvent::Refresh), None);
        assert_eq!(transition(AuthState::Pending, AuthEvent::Refresh), None);
    }
}
