//! Single-threaded change publication.
//!
//! A [`Publisher`] delivers values synchronously to callbacks and enqueues them
//! to [`ChangeStream`]s within the publishing call. Listeners are detached when
//! their [`Subscription`] or stream is dropped.

use std::cell::RefCell;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::{FutureExt, Stream, StreamExt};

type Callback<T> = Rc<dyn Fn(&T)>;

enum Listener<T> {
    Callback(Callback<T>),
    Channel(mpsc::UnboundedSender<T>),
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        match self {
            Listener::Callback(callback) => Listener::Callback(callback.clone()),
            Listener::Channel(sender) => Listener::Channel(sender.clone()),
        }
    }
}

struct Listeners<T> {
    next_id: u64,
    slots: Vec<(u64, Listener<T>)>,
}

/// Cloning shares the listener list.
pub struct Publisher<T> {
    listeners: Rc<RefCell<Listeners<T>>>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
        }
    }
}

impl<T> Default for Publisher<T> {
    fn default() -> Self {
        Self {
            listeners: Rc::new(RefCell::new(Listeners {
                next_id: 0,
                slots: Vec::new(),
            })),
        }
    }
}

impl<T: Clone + 'static> Publisher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `value` to every live listener.
    ///
    /// Listeners may subscribe, unsubscribe or publish again while being notified.
    pub fn publish(&self, value: &T) {
        let snapshot: Vec<(u64, Listener<T>)> = self.listeners.borrow().slots.clone();
        let mut closed = Vec::new();
        for (id, listener) in snapshot {
            match listener {
                Listener::Callback(callback) => callback(value),
                Listener::Channel(sender) => {
                    if sender.unbounded_send(value.clone()).is_err() {
                        closed.push(id);
                    }
                }
            }
        }
        if !closed.is_empty() {
            self.listeners
                .borrow_mut()
                .slots
                .retain(|(id, _)| !closed.contains(id));
        }
    }

    pub fn observe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let id = self.insert(Listener::Callback(Rc::new(callback)));
        let listeners: Weak<RefCell<Listeners<T>>> = Rc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.borrow_mut().slots.retain(|(slot, _)| *slot != id);
            }
        })
    }

    pub fn subscribe(&self) -> ChangeStream<T> {
        let (sender, receiver) = mpsc::unbounded();
        self.insert(Listener::Channel(sender));
        ChangeStream { receiver }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().slots.len()
    }

    fn insert(&self, listener: Listener<T>) -> u64 {
        let mut listeners = self.listeners.borrow_mut();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.slots.push((id, listener));
        id
    }
}

/// Keeps a callback registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Keep the callback registered for as long as its source lives.
    pub fn detach(mut self) {
        self.unsubscribe.take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Stream of values published after the stream was created.
pub struct ChangeStream<T> {
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> ChangeStream<T> {
    /// Next already published change, without waiting.
    pub fn try_next_change(&mut self) -> Option<T> {
        self.receiver.next().now_or_never().flatten()
    }

    /// All changes published so far, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        std::iter::from_fn(|| self.try_next_change()).collect()
    }
}

impl<T> Stream for ChangeStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.receiver.poll_next_unpin(cx)
    }
}
