use common::Word;
use thiserror::Error;

use super::expr::{evaluate, EvalContext, ExprError};

/// Capacity of the watchpoint pool.
pub const NR_WATCHPOINTS: usize = 32;

/// One pool slot. Its index in the pool is also the watchpoint number.
#[derive(Debug, Clone, Default)]
pub struct Watchpoint {
    no: usize,
    expr: Option<String>,
    last_value: Word,
    next: Option<usize>,
}

impl Watchpoint {
    pub fn no(&self) -> usize {
        self.no
    }

    pub fn expr(&self) -> &str {
        self.expr.as_deref().unwrap_or_default()
    }

    /// Value seen at the last check.
    pub fn last_value(&self) -> Word {
        self.last_value
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchpointChange {
    pub no: usize,
    pub expr: String,
    pub old_value: Word,
    pub new_value: Word,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum WatchpointError {
    /// returned when all slots hold an active watchpoint
    #[error("no free watchpoint, all {} are in use", NR_WATCHPOINTS)]
    PoolExhausted,

    #[error("No watchpoint number {0}.")]
    NotFound(usize),

    /// returned when a new watchpoint's expression cannot be evaluated
    #[error(transparent)]
    Expr(#[from] ExprError),

    /// returned when an active watchpoint can no longer be evaluated
    #[error("watchpoint {no}: {source}")]
    Evaluation {
        no: usize,
        #[source]
        source: ExprError,
    },
}

/// Fixed pool of watchpoints. Slots are threaded onto two singly linked
/// lists by index: free slots, and active watchpoints with the newest first.
#[derive(Debug, Clone)]
pub struct WatchpointPool {
    slots: Vec<Watchpoint>,
    head: Option<usize>,
    free: Option<usize>,
}

impl Default for WatchpointPool {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchpointPool {
    pub fn new() -> Self {
        let slots = (0..NR_WATCHPOINTS)
            .map(|no| Watchpoint {
                no,
                next: (no + 1 < NR_WATCHPOINTS).then_some(no + 1),
                ..Default::default()
            })
            .collect();
        WatchpointPool {
            slots,
            head: None,
            free: Some(0),
        }
    }

    /// Moves the first free slot to the head of the active list.
    pub fn allocate(&mut self) -> Result<usize, WatchpointError> {
        let handle = self.free.ok_or(WatchpointError::PoolExhausted)?;
        self.free = self.slots[handle].next;
        self.slots[handle].next = self.head;
        self.head = Some(handle);
        Ok(handle)
    }

    /// Looks up an active watchpoint. Returns its handle together with its
    /// predecessor in the active list, `None` when it is the head.
    pub fn find(&self, no: usize) -> Option<(usize, Option<usize>)> {
        let mut predecessor = None;
        let mut cursor = self.head;
        while let Some(handle) = cursor {
            if self.slots[handle].no == no {
                return Some((handle, predecessor));
            }
            predecessor = cursor;
            cursor = self.slots[handle].next;
        }
        None
    }

    /// Unlinks `handle` from the active list and returns it to the free list.
    ///
    /// # Arguments
    /// * `handle` An active watchpoint
    /// * `predecessor` The watchpoint linking to `handle`, as returned by `find`
    pub fn release(&mut self, handle: usize, predecessor: Option<usize>) {
        debug_assert_eq!(
            Some(handle),
            predecessor.map_or(self.head, |p| self.slots[p].next),
            "predecessor does not link to watchpoint {handle}"
        );
        let next = self.slots[handle].next;
        match predecessor {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        let slot = &mut self.slots[handle];
        slot.expr = None;
        slot.last_value = 0;
        slot.next = self.free;
        self.free = Some(handle);
    }

    pub fn delete(&mut self, no: usize) -> Result<(), WatchpointError> {
        let (handle, predecessor) = self.find(no).ok_or(WatchpointError::NotFound(no))?;
        self.release(handle, predecessor);
        Ok(())
    }

    /// Sets a watchpoint on `expr`, seeded with its current value. Nothing
    /// is allocated if the expression does not evaluate.
    pub fn watch(&mut self, expr: &str, ctx: &dyn EvalContext) -> Result<usize, WatchpointError> {
        let value = evaluate(expr, ctx)?;
        let handle = self.allocate()?;
        let slot = &mut self.slots[handle];
        slot.expr = Some(expr.to_string());
        slot.last_value = value;
        Ok(handle)
    }

    pub fn get(&self, no: usize) -> Option<&Watchpoint> {
        self.find(no).map(|(handle, _)| &self.slots[handle])
    }

    /// Active watchpoints, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Watchpoint> + '_ {
        std::iter::successors(self.head.map(|handle| &self.slots[handle]), |wp| {
            wp.next.map(|handle| &self.slots[handle])
        })
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Re-evaluates every active watchpoint. Each one whose value differs
    /// from the last check is appended to `changes` and takes the new value.
    /// Returns the number of changes appended.
    pub fn detect_changes(
        &mut self,
        ctx: &dyn EvalContext,
        changes: &mut Vec<WatchpointChange>,
    ) -> Result<usize, WatchpointError> {
        let mut count = 0;
        let mut cursor = self.head;
        while let Some(handle) = cursor {
            let slot = &mut self.slots[handle];
            cursor = slot.next;
            let value = evaluate(slot.expr(), ctx).map_err(|source| {
                WatchpointError::Evaluation {
                    no: slot.no,
                    source,
                }
            })?;
            if value != slot.last_value {
                changes.push(WatchpointChange {
                    no: slot.no,
                    expr: slot.expr().to_string(),
                    old_value: slot.last_value,
                    new_value: value,
                });
                slot.last_value = value;
                count += 1;
            }
        }
        Ok(count)
    }
}
