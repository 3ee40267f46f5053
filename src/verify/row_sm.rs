use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Pausing,
    Paused,
    Stopping,
    Error,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Pausing => "pausing",
            LifecycleState::Paused => "paused",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Error => "error",
        }
    }

    /// Optimistic states only exist while a command is outstanding.
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            LifecycleState::Starting | LifecycleState::Pausing | LifecycleState::Stopping
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Start,
    Pause,
    Stop,
}

impl Command {
    pub const ALL: [Command; 3] = [Command::Start, Command::Pause, Command::Stop];

    /// Endpoint segment under `/strategy/`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Pause => "pause",
            Command::Stop => "stop",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Command::Start),
            "pause" => Some(Command::Pause),
            "stop" => Some(Command::Stop),
            _ => None,
        }
    }

    pub fn optimistic_state(&self) -> LifecycleState {
        match self {
            Command::Start => LifecycleState::Starting,
            Command::Pause => LifecycleState::Pausing,
            Command::Stop => LifecycleState::Stopping,
        }
    }

    pub fn confirmed_state(&self) -> LifecycleState {
        match self {
            Command::Start => LifecycleState::Running,
            Command::Pause => LifecycleState::Paused,
            Command::Stop => LifecycleState::Stopped,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

pub fn is_legal(state: LifecycleState, command: Command) -> bool {
    matches!(
        (state, command),
        (LifecycleState::Stopped, Command::Start)
            | (LifecycleState::Running, Command::Pause)
            | (LifecycleState::Running, Command::Stop)
            | (LifecycleState::Paused, Command::Stop)
            | (LifecycleState::Error, _)
    )
}

/// Returns the optimistic state for a legal command, `None` otherwise.
pub fn begin(state: LifecycleState, command: Command) -> Option<LifecycleState> {
    if is_legal(state, command) {
        Some(command.optimistic_state())
    } else {
        None
    }
}

pub fn available_commands(state: LifecycleState) -> Vec<Command> {
    Command::ALL
        .iter()
        .copied()
        .filter(|c| is_legal(state, *c))
        .collect()
}
