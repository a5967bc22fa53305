//! In-process publish/subscribe with a bounded replay history.

mod queue;

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;

use gim_slo::Result;

/// Receives events whose subject matches the prefix it was registered with.
pub trait Watcher<T>: Send + Sync + 'static {
    fn notify(&self, subject: &str, event: T);
}

impl<T, F> Watcher<T> for F
where
    F: Fn(&str, T) + Send + Sync + 'static,
{
    fn notify(&self, subject: &str, event: T) {
        (self)(subject, event);
    }
}

/// At-least-once delivery of one event under one subject.
#[async_trait]
pub trait Publisher<T>: Send + Sync {
    async fn publish(&self, subject: &str, event: T) -> Result<()>;
}

struct WatcherInner<T> {
    prefix: String,
    since_modify: usize,
    watcher: Box<dyn Watcher<T>>,
}

#[derive(Clone)]
pub struct WatcherHub<T> {
    inner: Arc<WatcherHubInner<T>>,
}

struct WatcherHubInner<T> {
    watchers: RwLock<Vec<Arc<WatcherInner<T>>>>,
    event_history: RwLock<queue::QueueHistory<T>>,
}

impl<T> fmt::Debug for WatcherHub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherHub").finish()
    }
}

impl<T> Default for WatcherHub<T>
where
    T: Clone + Sync + Send + 'static,
{
    fn default() -> Self {
        Self::new(100)
    }
}

impl<T> WatcherHub<T>
where
    T: Clone + Sync + Send + 'static,
{
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Arc::new(WatcherHubInner {
                watchers: RwLock::new(Vec::new()),
                event_history: RwLock::new(queue::QueueHistory::new(cap)),
            }),
        }
    }

    /// Registers `handler` for subjects starting with `prefix`.
    ///
    /// Retained events newer than `since_modify` are replayed first; the
    /// watcher stays registered until the returned guard is dropped.
    pub fn watch<W: Watcher<T>>(
        &self,
        prefix: &str,
        since_modify: usize,
        handler: W,
    ) -> Box<dyn WatchGuard + Send> {
        let mut watchers_ref = self
            .inner
            .watchers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let last_modify = {
            let event_history_ref = self
                .inner
                .event_history
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            for (subject, event) in event_history_ref.scan(prefix, since_modify)
            {
                handler.notify(subject, event.to_owned());
            }
            event_history_ref.last_modify().max(since_modify)
        };
        let handler_ref = Arc::new(WatcherInner {
            prefix: prefix.to_owned(),
            since_modify: last_modify,
            watcher: Box::new(handler),
        });
        watchers_ref.push(Arc::clone(&handler_ref));
        Box::new(Remove {
            inner: Arc::clone(&self.inner),
            watcher: handler_ref,
        })
    }

    /// Records the event and fans it out. Returns its modify index.
    pub fn notify(&self, subject: &str, event: T) -> usize {
        let modify = {
            let mut event_history_ref = self
                .inner
                .event_history
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            event_history_ref.push(subject, event.clone())
        };
        let watchers_ref = self
            .inner
            .watchers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for watcher in watchers_ref.iter() {
            if watcher.since_modify >= modify
                || !subject.starts_with(&watcher.prefix)
            {
                continue;
            }
            watcher.watcher.notify(subject, event.clone());
        }
        modify
    }

    pub fn last_modify(&self) -> usize {
        self.inner
            .event_history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_modify()
    }
}

#[async_trait]
impl<T> Publisher<T> for WatcherHub<T>
where
    T: Clone + Sync + Send + 'static,
{
    async fn publish(&self, subject: &str, event: T) -> Result<()> {
        self.notify(subject, event);
        Ok(())
    }
}

pub trait WatchGuard {
    fn noop(&self) {}
}

struct Remove<T> {
    inner: Arc<WatcherHubInner<T>>,
    watcher: Arc<WatcherInner<T>>,
}

impl<T> WatchGuard for Remove<T> {}

impl<T> Drop for Remove<T> {
    fn drop(&mut self) {
        let mut watchers_ref = self
            .inner
            .watchers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        watchers_ref.retain(|h| !Arc::ptr_eq(h, &self.watcher));
    }
}
