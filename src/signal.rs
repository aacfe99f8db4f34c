//! Event-emitter pattern with subscriber tokens (§9), replacing the C source's intrusive
//! destroy-listener lists. The grab, the shell-surface wrapper, and the lock-surface wrapper
//! each subscribe to surface destruction through this; firing runs every live subscriber once
//! and then clears the list (a destroyed object is destroyed exactly once).

/// A token returned by [`Signal::subscribe`], usable to [`Signal::unsubscribe`] before the
/// signal fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

/// A one-shot-per-firing event emitter. Firing calls every subscriber in subscription order
/// and does not clear itself automatically — callers that only ever fire once (destruction)
/// typically drop the `Signal` right after.
pub struct Signal {
    next_token: u64,
    subscribers: Vec<(u64, Box<dyn FnMut()>)>,
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("subscriber_count", &self.subscribers.len())
            .finish()
    }
}

impl Default for Signal {
    fn default() -> Self {
        Signal {
            next_token: 0,
            subscribers: Vec::new(),
        }
    }
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, callback: impl FnMut() + 'static) -> ListenerToken {
        let token = self.next_token;
        self.next_token += 1;
        self.subscribers.push((token, Box::new(callback)));
        ListenerToken(token)
    }

    pub fn unsubscribe(&mut self, token: ListenerToken) {
        self.subscribers.retain(|(t, _)| *t != token.0);
    }

    /// Run every subscriber, in subscription order, then drop them all. Subsequent handlers
    /// in the same dispatch round that look at a weak reference cleared by an earlier
    /// subscriber observe it as already gone (§7 propagation rule).
    pub fn fire(&mut self) {
        for (_, mut callback) in self.subscribers.drain(..) {
            callback();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn fire_runs_subscribers_in_order_and_only_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut signal = Signal::new();
        {
            let log = log.clone();
            signal.subscribe(move || log.borrow_mut().push(1));
        }
        {
            let log = log.clone();
            signal.subscribe(move || log.borrow_mut().push(2));
        }
        signal.fire();
        assert_eq!(*log.borrow(), vec![1, 2]);
        signal.fire();
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn unsubscribe_before_fire_skips_callback() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut signal = Signal::new();
        let token = {
            let log = log.clone();
            signal.subscribe(move || log.borrow_mut().push(1))
        };
        signal.unsubscribe(token);
        signal.fire();
        assert!(log.borrow().is_empty());
    }
}
