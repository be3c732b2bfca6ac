use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    Reading,
    Processing,
    Writing,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid run transition from {from:?} to {to:?}")]
pub struct RunStateError {
    pub from: RunPhase,
    pub to: RunPhase,
}

/// Tracks the phase of a single run and rejects transitions outside the chunk loop.
#[derive(Clone, Debug)]
pub struct RunStateMachine {
    phase: RunPhase,
    history: Vec<RunPhase>,
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self { phase: RunPhase::Init, history: vec![RunPhase::Init] }
    }
}

impl RunStateMachine {
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn history(&self) -> &[RunPhase] {
        &self.history
    }

    pub fn advance(&mut self, to: RunPhase) -> Result<(), RunStateError> {
        if !is_allowed(self.phase, to) {
            return Err(RunStateError { from: self.phase, to });
        }
        self.phase = to;
        self.history.push(to);
        Ok(())
    }

    /// Moves to `Failed` from any non-terminal phase.
    pub fn fail(&mut self) -> Result<(), RunStateError> {
        self.advance(RunPhase::Failed)
    }
}

fn is_allowed(from: RunPhase, to: RunPhase) -> bool {
    use RunPhase::*;

    match (from, to) {
        (Completed | Failed, _) => false,
        (_, Failed) => true,
        (Init, Reading) => true,
        // An empty page ends the run.
        (Reading, Processing) | (Reading, Completed) => true,
        (Processing, Writing) => true,
        (Writing, Reading) | (Writing, Completed) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{RunPhase, RunStateError, RunStateMachine};

    #[test]
    fn chunk_loop_reaches_completed() {
        let mut machine = RunStateMachine::default();
        for phase in [
            RunPhase::Reading,
            RunPhase::Processing,
            RunPhase::Writing,
            RunPhase::Reading,
            RunPhase::Processing,
            RunPhase::Writing,
            RunPhase::Reading,
            RunPhase::Completed,
        ] {
            machine.advance(phase).expect("legal transition");
        }

        assert_eq!(machine.phase(), RunPhase::Completed);
        assert_eq!(machine.history().len(), 9);
    }

    #[test]
    fn any_active_phase_can_fail() {
        let mut machine = RunStateMachine::default();
        machine.advance(RunPhase::Reading).expect("init -> reading");
        machine.advance(RunPhase::Processing).expect("reading -> processing");
        machine.fail().expect("processing -> failed");
        assert!(machine.phase().is_terminal());
    }

    #[test]
    fn terminal_phases_are_final() {
        let mut machine = RunStateMachine::default();
        machine.fail().expect("init -> failed");

        assert_eq!(
            machine.advance(RunPhase::Reading),
            Err(RunStateError { from: RunPhase::Failed, to: RunPhase::Reading })
        );
        assert!(machine.fail().is_err());
    }

    #[test]
    fn writing_cannot_be_skipped() {
        let mut machine = RunStateMachine::default();
        machine.advance(RunPhase::Reading).expect("init -> reading");
        machine.advance(RunPhase::Processing).expect("reading -> processing");

        assert!(machine.advance(RunPhase::Reading).is_err());
        assert!(machine.advance(RunPhase::Completed).is_err());
        assert_eq!(machine.phase(), RunPhase::Processing);
    }
}
