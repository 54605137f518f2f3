//! Transition table for upgrading one dependency.
//!
//! Candidates are indexed in ascending order, so `count - 1` is the newest.
//! The newest candidate is tried first; if it fails, the others are walked
//! from the oldest up and the last passing one is kept.

/// Where one dependency stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NotStarted,
    TryingMax,
    /// Testing candidate `index`; `last_passed` is the best one so far.
    Sequential {
        index: usize,
        last_passed: Option<usize>,
    },
    Terminal(Verdict),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The newest candidate passed and was committed.
    FullSuccess { reached: usize },
    /// An older candidate was committed. `stopped_at` is the first candidate
    /// that failed during the walk, `None` when the walk ran out.
    PartialSuccess {
        reached: usize,
        stopped_at: Option<usize>,
    },
    /// Nothing passed; the tree was reverted.
    TotalFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    Passed,
    Failed,
}

/// Side effects the orchestrator performs, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Pin candidate, migrate imports, run the test command.
    Try(usize),
    /// Pin candidate and migrate imports without testing.
    Restore(usize),
    Revert,
    Commit(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: State,
    pub actions: Vec<Action>,
}

impl Transition {
    fn to(next: State, actions: Vec<Action>) -> Self {
        Self { next, actions }
    }
}

pub fn transition(state: State, event: Event, count: usize) -> Transition {
    use Action::*;
    use Event::*;

    match (state, event) {
        (State::NotStarted, Start) if count > 0 => {
            Transition::to(State::TryingMax, vec![Try(count - 1)])
        }

        (State::TryingMax, Passed) => Transition::to(
            State::Terminal(Verdict::FullSuccess { reached: count - 1 }),
            vec![Commit(count - 1)],
        ),
        (State::TryingMax, Failed) if count == 1 => {
            Transition::to(State::Terminal(Verdict::TotalFailure), vec![Revert])
        }
        (State::TryingMax, Failed) => Transition::to(
            State::Sequential {
                index: 0,
                last_passed: None,
            },
            vec![Revert, Try(0)],
        ),

        // The newest candidate already failed, so the walk stops before it.
        (State::Sequential { index, .. }, Passed) if index + 2 < count => Transition::to(
            State::Sequential {
                index: index + 1,
                last_passed: Some(index),
            },
            vec![Try(index + 1)],
        ),
        (State::Sequential { index, .. }, Passed) => Transition::to(
            State::Terminal(Verdict::PartialSuccess {
                reached: index,
                stopped_at: None,
            }),
            vec![Commit(index)],
        ),
        (
            State::Sequential {
                index,
                last_passed: Some(previous),
            },
            Failed,
        ) => Transition::to(
            State::Terminal(Verdict::PartialSuccess {
                reached: previous,
                stopped_at: Some(index),
            }),
            vec![Revert, Restore(previous), Commit(previous)],
        ),
        (
            State::Sequential {
                last_passed: None, ..
            },
            Failed,
        ) => Transition::to(State::Terminal(Verdict::TotalFailure), vec![Revert]),

        // Unreachable from the rows above.
        _ => Transition::to(State::Terminal(Verdict::TotalFailure), vec![Revert]),
    }
}
