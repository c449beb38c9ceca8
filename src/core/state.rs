//! 运行状态：ROUTE → (DIRECT_ANSWER | PLAN → EXECUTE) → FINAL / STOP
//!
//! 转移表是封闭的：ROUTE 只能作为初始状态进入一次，FINAL / STOP 为终态。

use std::fmt;

use serde::Serialize;

use crate::core::AgentError;

/// 单次运行的状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Route,
    Plan,
    DirectAnswer,
    Execute,
    Final,
    Stop,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Route => "ROUTE",
            RunState::Plan => "PLAN",
            RunState::DirectAnswer => "DIRECT_ANSWER",
            RunState::Execute => "EXECUTE",
            RunState::Final => "FINAL",
            RunState::Stop => "STOP",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Final | RunState::Stop)
    }

    /// 转移表；任一非终态都可短路到 STOP
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Final | Stop, _) => false,
            (_, Stop) => true,
            (Route, DirectAnswer | Plan | Execute) => true,
            (Plan, Execute) => true,
            (DirectAnswer, Final) => true,
            (Execute, Final) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态机：持有当前状态与已走过的路径，非法转移返回 IllegalTransition
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: RunState,
    history: Vec<RunState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            current: RunState::Route,
            history: vec![RunState::Route],
        }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> RunState {
        self.current
    }

    /// 按进入顺序记录的全部状态（首项恒为 ROUTE）
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn advance(&mut self, next: RunState) -> Result<RunState, AgentError> {
        if !self.current.can_transition_to(next) {
            return Err(AgentError::IllegalTransition {
                from: self.current.to_string(),
                to: next.to_string(),
            });
        }
        self.current = next;
        self.history.push(next);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_react_path_with_planner() {
        let mut sm = StateMachine::new();
        sm.advance(RunState::Plan).unwrap();
        sm.advance(RunState::Execute).unwrap();
        sm.advance(RunState::Final).unwrap();
        assert_eq!(
            sm.history(),
            &[RunState::Route, RunState::Plan, RunState::Execute, RunState::Final]
        );
        assert!(sm.current().is_terminal());
    }

    #[test]
    fn test_route_cannot_be_reentered() {
        let mut sm = StateMachine::new();
        sm.advance(RunState::Execute).unwrap();
        let err = sm.advance(RunState::Route).unwrap_err();
        assert!(matches!(err, AgentError::IllegalTransition { .. }));
        assert_eq!(sm.current(), RunState::Execute);
    }

    #[test]
    fn test_terminal_states_are_irreversible() {
        let mut sm = StateMachine::new();
        sm.advance(RunState::DirectAnswer).unwrap();
        sm.advance(RunState::Final).unwrap();
        assert!(sm.advance(RunState::Stop).is_err());
        assert!(sm.advance(RunState::Execute).is_err());
    }

    #[test]
    fn test_any_live_state_may_stop() {
        for state in [RunState::Route, RunState::Plan, RunState::DirectAnswer, RunState::Execute] {
            assert!(state.can_transition_to(RunState::Stop), "{state} -> STOP");
        }
        assert!(!RunState::Plan.can_transition_to(RunState::Final));
        assert!(!RunState::DirectAnswer.can_transition_to(RunState::Execute));
    }
}
