use manos_plate_core::{AbortController, AbortSignal};

/// Derived work the surface defers to the next frame boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    SyncToolbar,
    RepositionMenu,
}

struct PendingTask {
    kind: TaskKind,
    controller: AbortController,
}

/// At most one pending task per kind. Scheduling a kind again aborts the
/// pending one and queues the new one at the back.
#[derive(Default)]
pub struct TaskQueue {
    pending: Vec<PendingTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, kind: TaskKind) -> AbortSignal {
        self.cancel(kind);
        let controller = AbortController::new();
        let signal = controller.signal();
        self.pending.push(PendingTask { kind, controller });
        signal
    }

    pub fn cancel(&mut self, kind: TaskKind) -> bool {
        let Some(index) = self.pending.iter().position(|task| task.kind == kind) else {
            return false;
        };
        let task = self.pending.remove(index);
        task.controller.abort();
        tracing::trace!(?kind, "superseded pending task");
        true
    }

    pub fn cancel_all(&mut self) {
        for task in self.pending.drain(..) {
            task.controller.abort();
        }
    }

    pub fn is_scheduled(&self, kind: TaskKind) -> bool {
        self.pending.iter().any(|task| task.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Takes every live task in scheduling order.
    pub fn drain(&mut self) -> Vec<TaskKind> {
        self.pending
            .drain(..)
            .filter(|task| !task.controller.is_aborted())
            .map(|task| task.kind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescheduling_aborts_the_previous_task() {
        let mut queue = TaskQueue::new();
        let first = queue.schedule(TaskKind::SyncToolbar);
        queue.schedule(TaskKind::RepositionMenu);
        let second = queue.schedule(TaskKind::SyncToolbar);
        assert!(first.is_aborted());
        assert!(!second.is_aborted());
        assert_eq!(queue.drain(), vec![TaskKind::RepositionMenu, TaskKind::SyncToolbar]);
        assert!(queue.is_empty());
    }
}
