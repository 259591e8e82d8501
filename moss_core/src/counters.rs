use rustc_hash::FxHashMap;
use std::cell::RefCell;

thread_local! {
    static THREAD_COUNTERS: RefCell<FxHashMap<&'static str, u64>> =
        RefCell::new(FxHashMap::default());
}

/// Bump a named counter on the current thread.
pub fn counter_inc(name: &'static str) {
    counter_add(name, 1);
}

pub fn counter_add(name: &'static str, value: u64) {
    THREAD_COUNTERS.with(|counters| {
        *counters.borrow_mut().entry(name).or_insert(0) += value;
    });
}

/// Move the current thread's counters out, leaving it empty. Worker threads
/// call this at the end of a batch so the coordinator can merge.
pub fn take_thread_counters() -> CounterState {
    THREAD_COUNTERS.with(|counters| CounterState {
        counters: std::mem::take(&mut *counters.borrow_mut()),
    })
}

/// A snapshot of counters gathered from one or more threads.
#[derive(Clone, Debug, Default)]
pub struct CounterState {
    counters: FxHashMap<&'static str, u64>,
}

impl CounterState {
    pub fn merge(&mut self, other: CounterState) {
        for (name, value) in other.counters {
            *self.counters.entry(name).or_insert(0) += value;
        }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.counters.iter().map(|(name, value)| (*name, *value))
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

/// Destination for periodic counter flushes. The production sink is wired by
/// the embedder; the default logs through `tracing`.
pub trait MetricSink: Send {
    fn publish(&self, counters: &CounterState);
}

pub struct TracingMetricSink;

impl MetricSink for TracingMetricSink {
    fn publish(&self, counters: &CounterState) {
        for (name, value) in counters.iter() {
            tracing::info!(counter = name, value, "metrics flush");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn take_resets_and_merge_sums() {
        counter_inc("test.messages");
        counter_add("test.messages", 2);

        let first = take_thread_counters();
        assert_eq!(first.get("test.messages"), 3);

        // Taking drained the thread-local store.
        counter_inc("test.messages");
        let second = take_thread_counters();
        assert_eq!(second.get("test.messages"), 1);

        let mut merged = CounterState::default();
        merged.merge(first);
        merged.merge(second);
        assert_eq!(merged.get("test.messages"), 4);
    }
}
