use std::cell::Cell;
use std::rc::Rc;

/// Owner side of a cancellation flag. Every [`AbortSignal`] handed out by the
/// same controller observes one `abort` call.
#[derive(Debug, Default)]
pub struct AbortController {
    aborted: Rc<Cell<bool>>,
}

#[derive(Debug, Clone)]
pub struct AbortSignal {
    aborted: Rc<Cell<bool>>,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            aborted: self.aborted.clone(),
        }
    }

    pub fn abort(&self) {
        self.aborted.set(true);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.get()
    }
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.aborted.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_share_the_controller_flag() {
        let controller = AbortController::new();
        let a = controller.signal();
        let b = a.clone();
        assert!(!b.is_aborted());
        controller.abort();
        assert!(a.is_aborted() && b.is_aborted());
    }
}
