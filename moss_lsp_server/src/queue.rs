use crate::lsp_ext::WatchmanQueryResponse;
use crate::method::LspMethod;
use lsp_server::{Message, Notification, RequestId, Response};
use moss_core::{take_thread_counters, CounterState};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

/// One pre-processed queue entry.
pub(crate) enum Pending {
    Message(Message, Arc<AtomicBool>),
    /// A synthesized reply occupying the slot of a request that was canceled
    /// while still pending, so the response goes out in queue order.
    CanceledResponse(Response),
}

/// Internal queue state, guarded by the mutex in [`MessageQueue`].
struct QueueState {
    pending: VecDeque<Pending>,
    terminate: bool,
    paused: bool,
    request_counter: u64,
    counters: CounterState,
}

pub(crate) enum Next {
    Message(Pending),
    TimedOut,
    Terminated,
}

/// The pending-message queue between the pre-processing thread and the
/// dispatch loop. Pre-processing (pause/resume, cancellation, coalescing,
/// counter collection) happens under the lock on the producer side; the main
/// thread only ever dequeues.
pub(crate) struct MessageQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
    /// The request currently being dispatched, so a late `$/cancelRequest`
    /// can still flag it.
    in_flight: Mutex<Option<(RequestId, Arc<AtomicBool>)>>,
    collect_thread_counters: bool,
}

impl MessageQueue {
    pub(crate) fn new(collect_thread_counters: bool) -> MessageQueue {
        MessageQueue {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                terminate: false,
                paused: false,
                request_counter: 0,
                counters: CounterState::default(),
            }),
            cond: Condvar::new(),
            in_flight: Mutex::new(None),
            collect_thread_counters,
        }
    }

    /// Pre-process `msg` and append it. Applied in order: pause/resume,
    /// cancellation, watchman merging, edit merging, counter collection.
    pub(crate) fn enqueue(&self, msg: Message) {
        let mut state = self.state.lock().unwrap();
        state.request_counter += 1;
        if self.collect_thread_counters {
            let snapshot = take_thread_counters();
            state.counters.merge(snapshot);
        }

        match &msg {
            Message::Notification(not) => match LspMethod::from_name(&not.method) {
                Some(LspMethod::Pause) => {
                    state.paused = true;
                }
                Some(LspMethod::Resume) => {
                    state.paused = false;
                }
                Some(LspMethod::CancelRequest) => {
                    self.cancel_request(&mut state, not);
                }
                Some(LspMethod::WatchmanFileChange) => {
                    if !merge_watchman_changes(&mut state.pending, not) {
                        push(&mut state, msg);
                    }
                }
                Some(LspMethod::DidChange) => {
                    if !merge_document_edits(&mut state.pending, not) {
                        push(&mut state, msg);
                    }
                }
                _ => push(&mut state, msg),
            },
            _ => push(&mut state, msg),
        }

        self.cond.notify_all();
    }

    fn cancel_request(&self, state: &mut QueueState, not: &Notification) {
        let id = match parse_cancel_id(&not.params) {
            Some(id) => id,
            None => {
                tracing::warn!(params = %not.params, "malformed $/cancelRequest");
                return;
            }
        };

        for entry in state.pending.iter_mut() {
            let matches = matches!(
                entry,
                Pending::Message(Message::Request(req), _) if req.id == id
            );
            if matches {
                *entry = Pending::CanceledResponse(Response::new_err(
                    id.clone(),
                    lsp_server::ErrorCode::RequestCanceled as i32,
                    "Request was canceled".to_string(),
                ));
                return;
            }
        }

        // Not pending: it may already be dispatching. Flag it so the handler
        // can short-circuit.
        if let Some((in_flight_id, flag)) = &*self.in_flight.lock().unwrap() {
            if *in_flight_id == id {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Blocking dequeue with a deadline, so the caller can run its periodic
    /// work even while the connection is idle.
    pub(crate) fn next_message(&self, timeout: Duration) -> Next {
        let mut state = self.state.lock().unwrap();
        loop {
            if !state.paused {
                if let Some(pending) = state.pending.pop_front() {
                    return Next::Message(pending);
                }
            }
            if state.terminate && (state.pending.is_empty() || state.paused) {
                return Next::Terminated;
            }

            let (next_state, result) = self.cond.wait_timeout(state, timeout).unwrap();
            state = next_state;
            if result.timed_out() {
                if !state.paused {
                    if let Some(pending) = state.pending.pop_front() {
                        return Next::Message(pending);
                    }
                }
                if state.terminate && (state.pending.is_empty() || state.paused) {
                    return Next::Terminated;
                }
                return Next::TimedOut;
            }
        }
    }

    /// Non-blocking dequeue for the synchronous batch entry point.
    pub(crate) fn try_pop(&self) -> Option<Pending> {
        let mut state = self.state.lock().unwrap();
        if state.paused {
            return None;
        }
        state.pending.pop_front()
    }

    pub(crate) fn terminate(&self) {
        self.state.lock().unwrap().terminate = true;
        self.cond.notify_all();
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    pub(crate) fn set_in_flight(&self, entry: Option<(RequestId, Arc<AtomicBool>)>) {
        *self.in_flight.lock().unwrap() = entry;
    }

    pub(crate) fn take_counters(&self) -> CounterState {
        std::mem::take(&mut self.state.lock().unwrap().counters)
    }

    pub(crate) fn messages_enqueued(&self) -> u64 {
        self.state.lock().unwrap().request_counter
    }
}

fn push(state: &mut QueueState, msg: Message) {
    state
        .pending
        .push_back(Pending::Message(msg, Arc::new(AtomicBool::new(false))));
}

fn parse_cancel_id(params: &serde_json::Value) -> Option<RequestId> {
    let params: lsp_types::CancelParams = serde_json::from_value(params.clone()).ok()?;
    Some(match params.id {
        lsp_types::NumberOrString::Number(n) => RequestId::from(n),
        lsp_types::NumberOrString::String(s) => RequestId::from(s),
    })
}

/// Union a new watchman batch into a trailing one. Merging is purely a
/// coalescing optimization: applying the merged batch must equal applying
/// both in order.
fn merge_watchman_changes(pending: &mut VecDeque<Pending>, incoming: &Notification) -> bool {
    let last = match pending.back_mut() {
        Some(Pending::Message(Message::Notification(last), _))
            if last.method == incoming.method =>
        {
            last
        }
        _ => return false,
    };

    let mut base: WatchmanQueryResponse = match serde_json::from_value(last.params.clone()) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };
    let addition: WatchmanQueryResponse = match serde_json::from_value(incoming.params.clone()) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };

    for file in addition.files {
        if !base.files.contains(&file) {
            base.files.push(file);
        }
    }
    last.params = serde_json::to_value(base).unwrap();
    true
}

/// Concatenate consecutive `textDocument/didChange` batches for the same
/// document. Edits stay in arrival order; a full-replace change simply
/// becomes the new base when applied.
fn merge_document_edits(pending: &mut VecDeque<Pending>, incoming: &Notification) -> bool {
    let last = match pending.back_mut() {
        Some(Pending::Message(Message::Notification(last), _))
            if last.method == incoming.method =>
        {
            last
        }
        _ => return false,
    };

    let mut base: lsp_types::DidChangeTextDocumentParams =
        match serde_json::from_value(last.params.clone()) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };
    let addition: lsp_types::DidChangeTextDocumentParams =
        match serde_json::from_value(incoming.params.clone()) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };

    if base.text_document.uri != addition.text_document.uri {
        return false;
    }

    base.content_changes.extend(addition.content_changes);
    base.text_document.version = addition.text_document.version;
    last.params = serde_json::to_value(base).unwrap();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn notification(method: &str, params: serde_json::Value) -> Message {
        Message::Notification(Notification::new(method.to_string(), params))
    }

    fn request(id: i32, method: &str) -> Message {
        Message::Request(lsp_server::Request::new(
            RequestId::from(id),
            method.to_string(),
            json!({}),
        ))
    }

    fn drain(queue: &MessageQueue) -> Vec<Pending> {
        let mut out = Vec::new();
        while let Some(pending) = queue.try_pop() {
            out.push(pending);
        }
        out
    }

    #[test]
    fn consecutive_watchman_batches_are_unioned() {
        let queue = MessageQueue::new(false);
        queue.enqueue(notification(
            "moss/watchmanFileChange",
            json!({"files": ["a.moss", "b.moss"]}),
        ));
        queue.enqueue(notification(
            "moss/watchmanFileChange",
            json!({"files": ["b.moss", "c.moss"]}),
        ));

        let drained = drain(&queue);
        assert_eq!(drained.len(), 1);
        match &drained[0] {
            Pending::Message(Message::Notification(not), _) => {
                let merged: WatchmanQueryResponse =
                    serde_json::from_value(not.params.clone()).unwrap();
                assert_eq!(merged.files, vec!["a.moss", "b.moss", "c.moss"]);
            }
            _ => panic!("expected the merged watchman notification"),
        }
    }

    #[test]
    fn watchman_batches_do_not_merge_across_other_messages() {
        let queue = MessageQueue::new(false);
        queue.enqueue(notification(
            "moss/watchmanFileChange",
            json!({"files": ["a.moss"]}),
        ));
        queue.enqueue(request(1, "textDocument/hover"));
        queue.enqueue(notification(
            "moss/watchmanFileChange",
            json!({"files": ["b.moss"]}),
        ));

        assert_eq!(drain(&queue).len(), 3);
    }

    #[test]
    fn consecutive_edits_to_one_document_concatenate() {
        let queue = MessageQueue::new(false);
        let make = |version: i32, text: &str| {
            notification(
                "textDocument/didChange",
                json!({
                    "textDocument": {"uri": "file:///w/a.moss", "version": version},
                    "contentChanges": [{"text": text}],
                }),
            )
        };
        queue.enqueue(make(2, "x = 1\n"));
        queue.enqueue(make(3, "x = 2\n"));

        let drained = drain(&queue);
        assert_eq!(drained.len(), 1);
        match &drained[0] {
            Pending::Message(Message::Notification(not), _) => {
                let merged: lsp_types::DidChangeTextDocumentParams =
                    serde_json::from_value(not.params.clone()).unwrap();
                assert_eq!(merged.content_changes.len(), 2);
                assert_eq!(merged.text_document.version, 3);
            }
            _ => panic!("expected the merged didChange notification"),
        }
    }

    #[test]
    fn edits_to_different_documents_stay_separate() {
        let queue = MessageQueue::new(false);
        queue.enqueue(notification(
            "textDocument/didChange",
            json!({
                "textDocument": {"uri": "file:///w/a.moss", "version": 2},
                "contentChanges": [{"text": "x"}],
            }),
        ));
        queue.enqueue(notification(
            "textDocument/didChange",
            json!({
                "textDocument": {"uri": "file:///w/b.moss", "version": 2},
                "contentChanges": [{"text": "y"}],
            }),
        ));

        assert_eq!(drain(&queue).len(), 2);
    }

    #[test]
    fn canceling_a_pending_request_synthesizes_the_error_in_place() {
        let queue = MessageQueue::new(false);
        queue.enqueue(request(7, "textDocument/references"));
        queue.enqueue(notification("$/cancelRequest", json!({"id": 7})));

        let drained = drain(&queue);
        assert_eq!(drained.len(), 1);
        match &drained[0] {
            Pending::CanceledResponse(response) => {
                assert_eq!(response.id, RequestId::from(7));
                let error = response.error.as_ref().unwrap();
                assert_eq!(error.code, lsp_server::ErrorCode::RequestCanceled as i32);
                assert_eq!(error.message, "Request was canceled");
            }
            _ => panic!("expected a synthesized cancellation response"),
        }
    }

    #[test]
    fn canceling_an_in_flight_request_sets_its_flag() {
        let queue = MessageQueue::new(false);
        let flag = Arc::new(AtomicBool::new(false));
        queue.set_in_flight(Some((RequestId::from(9), flag.clone())));

        queue.enqueue(notification("$/cancelRequest", json!({"id": 9})));
        assert!(flag.load(Ordering::SeqCst));

        // An unknown id is ignored.
        queue.enqueue(notification("$/cancelRequest", json!({"id": 10})));
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn pause_blocks_dequeue_until_resume() {
        let queue = MessageQueue::new(false);
        queue.enqueue(notification("__PAUSE__", json!(null)));
        queue.enqueue(request(1, "shutdown"));
        assert!(queue.is_paused());
        assert!(queue.try_pop().is_none());

        queue.enqueue(notification("__RESUME__", json!(null)));
        assert!(!queue.is_paused());
        assert!(queue.try_pop().is_some());
    }
}
