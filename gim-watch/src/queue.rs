use std::collections::VecDeque;

#[derive(Debug)]
struct QueueEvent<T> {
    modify: usize,
    subject: String,
    value: T,
}

/// Bounded history of published events, oldest evicted first.
#[derive(Debug)]
pub(crate) struct QueueHistory<T> {
    events: VecDeque<QueueEvent<T>>,
    cap: usize,
    last_modify: usize,
}

impl<T> QueueHistory<T> {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(cap),
            cap,
            last_modify: 0,
        }
    }

    pub(crate) fn last_modify(&self) -> usize {
        self.last_modify
    }

    /// Stores the event under the next modify index and returns it.
    pub(crate) fn push(&mut self, subject: &str, value: T) -> usize {
        self.last_modify += 1;
        if self.cap == 0 {
            return self.last_modify;
        }
        if self.events.len() == self.cap {
            self.events.pop_front();
        }
        self.events.push_back(QueueEvent {
            modify: self.last_modify,
            subject: subject.to_owned(),
            value,
        });
        self.last_modify
    }

    /// Retained events newer than `since` whose subject starts with `prefix`.
    pub(crate) fn scan(
        &self,
        prefix: &str,
        since: usize,
    ) -> impl Iterator<Item = (&str, &T)> + '_ {
        let prefix = prefix.to_owned();
        self.events
            .iter()
            .filter(move |item| {
                item.modify > since && item.subject.starts_with(&prefix)
            })
            .map(|item| (item.subject.as_str(), &item.value))
    }
}
