//! Monitoring session lifecycle.
//!
//! [`SessionMachine`] is pure: it consumes [`Trigger`]s and answers with the
//! [`Effect`]s the driver must carry out. All I/O lives in
//! [`crate::session`].
//!
//! ```text
//! Idle -> Connecting -> Connected -> Running -> Finishing -> Closed
//!            |   \          |           |                     ^
//!            |    `-> TimedOut          `--- kill / lost -----'
//!            `-> Error
//! ```
//!
//! A timed-out session stays timed out: an acknowledgement arriving after
//! the timer fired only triggers another teardown and never marks the
//! session connected.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Running,
    Finishing,
    TimedOut,
    Error,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Transport opening started.
    Open,
    /// `status:connected` with its rule configuration.
    Acknowledged(Value),
    /// The connection timer elapsed.
    TimerFired,
    ServerError(Value),
    /// The script starts running.
    Start,
    /// The script completed with this code.
    Completed(i32),
    ExitDirective,
    KillDirective,
    ConnectionLost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CancelTimer,
    EmitStarting,
    EmitFinished(i32),
    /// Close the transport without further traffic.
    Teardown,
    /// Terminate with this code.
    Exit(i32),
    /// Terminate immediately on the server's request.
    Kill,
    /// Continue without monitoring.
    LostConnection,
}

#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
    rule_config: Option<Value>,
    completion_code: Option<i32>,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            rule_config: None,
            completion_code: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True once acknowledged and until the session closes.
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state,
            SessionState::Connected | SessionState::Running | SessionState::Finishing
        )
    }

    pub fn rule_config(&self) -> Option<&Value> {
        self.rule_config.as_ref()
    }

    /// The `_id` of the rule configuration, as a string.
    pub fn script_id(&self) -> Option<String> {
        match self.rule_config.as_ref()?.get("_id")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    pub fn completion_code(&self) -> Option<i32> {
        self.completion_code
    }

    pub fn apply(&mut self, trigger: Trigger) -> Vec<Effect> {
        use SessionState as S;

        match (self.state, trigger) {
            (S::Idle, Trigger::Open) => {
                self.state = S::Connecting;
                Vec::new()
            }

            (S::Connecting, Trigger::Acknowledged(config)) => {
                self.rule_config = Some(config);
                self.state = S::Connected;
                vec![Effect::CancelTimer, Effect::EmitStarting]
            }
            (S::TimedOut, Trigger::Acknowledged(_)) => vec![Effect::Teardown],

            (S::Connecting, Trigger::TimerFired) => {
                self.state = S::TimedOut;
                vec![Effect::Teardown]
            }

            (S::Connecting | S::Connected, Trigger::ServerError(_)) => {
                self.state = S::Error;
                vec![Effect::CancelTimer, Effect::Teardown]
            }

            (S::Connected, Trigger::Start) => {
                self.state = S::Running;
                Vec::new()
            }

            (S::Running, Trigger::Completed(code)) => {
                self.completion_code = Some(code);
                self.state = S::Finishing;
                vec![Effect::EmitFinished(code)]
            }

            (S::Finishing, Trigger::ExitDirective) => {
                self.state = S::Closed;
                vec![Effect::Exit(self.completion_code.unwrap_or_default())]
            }

            (S::Connected | S::Running | S::Finishing, Trigger::KillDirective) => {
                self.state = S::Closed;
                vec![Effect::Kill]
            }

            (S::Connected | S::Running, Trigger::ConnectionLost) => {
                self.state = S::Closed;
                vec![Effect::LostConnection]
            }
            (S::Finishing, Trigger::ConnectionLost) => {
                self.state = S::Closed;
                vec![
                    Effect::LostConnection,
                    Effect::Exit(self.completion_code.unwrap_or_default()),
                ]
            }
            (S::Connecting, Trigger::ConnectionLost) => {
                self.state = S::Error;
                vec![Effect::CancelTimer]
            }
            (S::TimedOut | S::Error, Trigger::ConnectionLost) => {
                self.state = S::Closed;
                Vec::new()
            }

            (state, trigger) => {
                tracing::debug!(?state, ?trigger, "Ignoring trigger");
                Vec::new()
            }
        }
    }
}
