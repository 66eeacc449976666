//! Breakpoint data model and the active-breakpoint registry.

use crate::events::BreakpointInfo;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// How many qualifying hits are needed before a breakpoint suspends
/// execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassCountStyle {
    /// Stop on every hit.
    None,
    /// Stop only when the hit count equals the target.
    Equal,
    /// Stop once the hit count reaches the target and on every hit after.
    EqualOrGreater,
    /// Stop on every n-th hit.
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassCount {
    pub style: PassCountStyle,
    pub count: u32,
}

impl Default for PassCount {
    fn default() -> Self {
        Self {
            style: PassCountStyle::None,
            count: 0,
        }
    }
}

impl PassCount {
    pub fn equal(count: u32) -> Self {
        Self {
            style: PassCountStyle::Equal,
            count,
        }
    }

    pub fn equal_or_greater(count: u32) -> Self {
        Self {
            style: PassCountStyle::EqualOrGreater,
            count,
        }
    }

    pub fn modulo(count: u32) -> Self {
        Self {
            style: PassCountStyle::Mod,
            count,
        }
    }
}

/// Where a breakpoint request points. File locations carry both the full
/// path and the bare filename; the insert command retries with the short
/// form when the backend leaves the full path pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BreakpointLocation {
    FileLine {
        file: String,
        full_path: String,
        line: u32,
    },
    Function {
        name: String,
    },
}

impl BreakpointLocation {
    pub fn file_line(file: impl Into<String>, full_path: impl Into<String>, line: u32) -> Self {
        Self::FileLine {
            file: file.into(),
            full_path: full_path.into(),
            line,
        }
    }

    pub fn function(name: impl Into<String>) -> Self {
        Self::Function { name: name.into() }
    }
}

/// Conditional-break policy for a breakpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionPolicy {
    None,
    /// Stop only while the expression evaluates true (backend-side).
    WhenTrue(String),
    /// Stop when the expression's value changes. The backend cannot do
    /// this itself, so the engine breaks on every hit and arbitrates.
    WhenChanged(String),
}

impl ConditionPolicy {
    /// The expression to evaluate on a hit, if this policy needs one.
    pub fn changed_expression(&self) -> Option<&str> {
        match self {
            ConditionPolicy::WhenChanged(expr) => Some(expr),
            _ => None,
        }
    }
}

/// A pending breakpoint request from the frontend; becomes a
/// [`BoundBreakpoint`] once the backend accepts it.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointRequest {
    pub location: BreakpointLocation,
    pub pass_count: PassCount,
    pub condition: ConditionPolicy,
}

impl BreakpointRequest {
    pub fn new(location: BreakpointLocation) -> Self {
        Self {
            location,
            pass_count: PassCount::default(),
            condition: ConditionPolicy::None,
        }
    }

    pub fn with_pass_count(mut self, pass_count: PassCount) -> Self {
        self.pass_count = pass_count;
        self
    }

    pub fn with_condition(mut self, condition: ConditionPolicy) -> Self {
        self.condition = condition;
        self
    }
}

/// Mutable state of a bound breakpoint.
#[derive(Debug, Clone)]
pub struct BreakpointState {
    pub gdb_id: u32,
    pub location: BreakpointLocation,
    pub address: Option<u64>,
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub enabled: bool,
    pub hit_count: u32,
    pub pass_count: PassCount,
    pub condition: ConditionPolicy,
    /// Break when the condition value changes rather than when it is true.
    pub break_when_cond_changed: bool,
    /// Last evaluated condition value, compared on each hit.
    pub previous_cond_evaluation: String,
    /// Derived from the pass count: stop only at the equal point.
    pub is_hit_count_equal: bool,
    /// Derived from the pass count: non-zero means stop every n-th hit.
    pub hit_count_multiple: u32,
}

/// Arbitration flags: a hit for this breakpoint is allowed to proceed only
/// while it holds the relevant flag, so a concurrent second notification
/// (or a concurrent pass-count/condition edit) cannot double-process it.
#[derive(Debug, Default)]
struct BlockFlags {
    pass_count: bool,
    conditional: bool,
}

/// A breakpoint the backend accepted and assigned an id to.
///
/// The block flags live behind their own lock, deliberately separate from
/// the engine-state critical region: hit arbitration is a finer-grained
/// concern than execution-state transitions.
#[derive(Debug)]
pub struct BoundBreakpoint {
    state: Mutex<BreakpointState>,
    blocks: Mutex<BlockFlags>,
}

impl BoundBreakpoint {
    pub fn new(request: BreakpointRequest, info: &BreakpointInfo) -> Self {
        Self {
            state: Mutex::new(BreakpointState {
                gdb_id: info.id,
                location: request.location,
                address: info.address,
                function: info.function.clone(),
                file: info.file.clone(),
                line: info.line,
                enabled: info.enabled,
                hit_count: info.hits,
                pass_count: PassCount::default(),
                condition: ConditionPolicy::None,
                break_when_cond_changed: false,
                previous_cond_evaluation: String::new(),
                is_hit_count_equal: false,
                hit_count_multiple: 0,
            }),
            blocks: Mutex::new(BlockFlags::default()),
        }
    }

    pub fn gdb_id(&self) -> u32 {
        self.state.lock().unwrap().gdb_id
    }

    pub fn hit_count(&self) -> u32 {
        self.state.lock().unwrap().hit_count
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> BreakpointState {
        self.state.lock().unwrap().clone()
    }

    /// Run `f` with the state locked.
    pub fn update<R>(&self, f: impl FnOnce(&mut BreakpointState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Try to acquire the requested block flags atomically. Both requested
    /// flags must be free for the acquisition to succeed; on failure
    /// nothing is taken.
    pub fn try_block(&self, hit: bool, cond: bool) -> bool {
        let mut b = self.blocks.lock().unwrap();
        match (hit, cond) {
            (true, true) => {
                if !b.pass_count && !b.conditional {
                    b.pass_count = true;
                    b.conditional = true;
                    true
                } else {
                    false
                }
            }
            (true, false) => {
                if !b.pass_count {
                    b.pass_count = true;
                    true
                } else {
                    false
                }
            }
            (false, true) => {
                if !b.conditional {
                    b.conditional = true;
                    true
                } else {
                    false
                }
            }
            (false, false) => false,
        }
    }

    /// Release previously acquired block flags.
    pub fn release_block(&self, hit: bool, cond: bool) {
        let mut b = self.blocks.lock().unwrap();
        if hit {
            b.pass_count = false;
        }
        if cond {
            b.conditional = false;
        }
    }
}

/// The active-breakpoint list, shared between the dispatch thread and
/// command threads. Structural mutation is guarded by its own lock.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    breakpoints: Mutex<Vec<Arc<BoundBreakpoint>>>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, breakpoint: Arc<BoundBreakpoint>) {
        self.breakpoints.lock().unwrap().push(breakpoint);
    }

    pub fn find(&self, gdb_id: u32) -> Option<Arc<BoundBreakpoint>> {
        self.breakpoints
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.gdb_id() == gdb_id)
            .cloned()
    }

    pub fn remove(&self, gdb_id: u32) -> Option<Arc<BoundBreakpoint>> {
        let mut list = self.breakpoints.lock().unwrap();
        let idx = list.iter().position(|b| b.gdb_id() == gdb_id)?;
        Some(list.remove(idx))
    }

    pub fn len(&self) -> usize {
        self.breakpoints.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.lock().unwrap().is_empty()
    }

    pub fn all(&self) -> Vec<Arc<BoundBreakpoint>> {
        self.breakpoints.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(id: u32) -> BoundBreakpoint {
        let info = BreakpointInfo {
            id,
            enabled: true,
            address: Some(0x1000),
            function: Some("main".to_string()),
            file: Some("main.c".to_string()),
            line: Some(10),
            hits: 0,
        };
        BoundBreakpoint::new(
            BreakpointRequest::new(BreakpointLocation::file_line("main.c", "/src/main.c", 10)),
            &info,
        )
    }

    #[test]
    fn test_block_flags_are_exclusive() {
        let bp = bound(1);
        assert!(bp.try_block(true, true));
        // A second hit notification cannot take either flag.
        assert!(!bp.try_block(true, true));
        assert!(!bp.try_block(true, false));
        assert!(!bp.try_block(false, true));
        bp.release_block(true, true);
        assert!(bp.try_block(true, true));
    }

    #[test]
    fn test_partial_block_blocks_combined_acquire() {
        let bp = bound(1);
        assert!(bp.try_block(false, true));
        assert!(!bp.try_block(true, true));
        // The pass-count flag alone is still free.
        assert!(bp.try_block(true, false));
        bp.release_block(true, true);
        assert!(bp.try_block(true, true));
    }

    #[test]
    fn test_acquire_nothing_always_fails() {
        let bp = bound(1);
        assert!(!bp.try_block(false, false));
    }

    #[test]
    fn test_registry_round_trip() {
        let registry = BreakpointRegistry::new();
        assert!(registry.is_empty());
        registry.insert(Arc::new(bound(1)));
        registry.insert(Arc::new(bound(2)));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find(2).unwrap().gdb_id(), 2);
        assert!(registry.find(3).is_none());
        let removed = registry.remove(1).unwrap();
        assert_eq!(removed.gdb_id(), 1);
        assert_eq!(registry.len(), 1);
    }
}
