//! Per-parse arena with LIFO cleanup (spec §5 "Arena allocator";
//! SPEC_FULL §2 "Arena-style cleanup ordering").
//!
//! Backs transient per-parse allocations and guarantees cleanup
//! callbacks run in the reverse order they were registered, the way
//! `examples/original_source/src/google/protobuf/arena_test_util.h`
//! asserts destruction order for arena-owned objects.

pub struct ParseArena {
    cleanups: Vec<Box<dyn FnOnce() + Send>>,
}

impl Default for ParseArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseArena {
    pub fn new() -> Self {
        ParseArena { cleanups: Vec::new() }
    }

    pub fn on_drop(&mut self, f: impl FnOnce() + Send + 'static) {
        self.cleanups.push(Box::new(f));
    }
}

impl Drop for ParseArena {
    fn drop(&mut self) {
        while let Some(f) = self.cleanups.pop() {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn cleanups_run_in_lifo_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        {
            let mut arena = ParseArena::new();
            for i in 0..3 {
                let order = order.clone();
                arena.on_drop(move || order.lock().unwrap().push(i));
            }
        }
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }
}
