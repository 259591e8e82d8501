use crate::lsp_ext::{OperationStatus, ShowOperationNotification, ShowOperationParams};
use crate::options::LspOptions;
use crate::queue::{MessageQueue, Next, Pending};
use crossbeam_channel::{Receiver, Sender};
use lsp_server::{Message, RequestId, Response};
use lsp_types::notification::Notification as _;
use moss_core::{
    counter_inc, take_thread_counters, CounterState, FileRef, GlobalState, MetricSink,
    TracingMetricSink,
};
use moss_pipeline::ParsedFile;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use threadpool::ThreadPool;

/// Callbacks invoked when the client answers a server-originated request.
/// They reference only the loop, never a GlobalState.
pub(crate) struct ResponseHandler {
    pub(crate) on_result: Box<dyn FnOnce(&mut LspLoop, serde_json::Value)>,
    pub(crate) on_error: Box<dyn FnOnce(&mut LspLoop, lsp_server::ResponseError)>,
}

impl ResponseHandler {
    /// A handler that only cares about failures.
    pub(crate) fn log_errors(what: &'static str) -> ResponseHandler {
        ResponseHandler {
            on_result: Box::new(|_, _| {}),
            on_error: Box::new(move |_, err| {
                tracing::error!(what, code = err.code, err = %err.message, "client rejected request");
            }),
        }
    }
}

/// Counters are forwarded to the metric sink at most this often, checked at
/// the top of the dispatch loop rather than on a timer thread.
const METRICS_FLUSH_INTERVAL: Duration = Duration::from_secs(300);

/// How long one dequeue may block before the loop gets a chance to run its
/// deadline work.
const DISPATCH_TICK: Duration = Duration::from_secs(5);

/// The coordinator: owns the connection's sending half, the typecheck
/// bookkeeping, and the dispatch loop. The canonical GlobalState is not a
/// field; it is threaded through every handler by value so exactly one live
/// state exists at any moment. `initial_gs` is the indexing snapshot that
/// working states are cloned from.
pub(crate) struct LspLoop {
    sender: Sender<Message>,
    pub(crate) options: LspOptions,
    pub(crate) workers: ThreadPool,

    /// Client workspace root as the client spells it.
    pub(crate) root_uri: String,
    /// The same root on the local filesystem.
    pub(crate) root_path: String,

    pub(crate) initialized: bool,
    pub(crate) shutdown_requested: bool,
    pub(crate) exit_requested: bool,

    /// Accumulates names and file entries; never typechecked directly and
    /// never discarded. Working states are cloned from it per run.
    pub(crate) initial_gs: GlobalState,
    /// Cached trees, keyed by the initial state's file table.
    pub(crate) indexed: FxHashMap<FileRef, Arc<ParsedFile>>,
    /// Per-file isolated-resolution digests backing the fast-path check.
    pub(crate) state_hashes: FxHashMap<FileRef, u32>,
    /// Files whose diagnostics were published non-empty in the last run.
    pub(crate) files_that_have_errors: FxHashSet<FileRef>,
    /// Paths the editor currently has open; their contents are
    /// editor-authoritative.
    pub(crate) open_files: FxHashSet<String>,
    /// Watcher updates that arrived before initialization finished.
    pub(crate) deferred_watchman_updates: FxHashSet<String>,

    pub(crate) client_snippet_support: bool,
    pub(crate) enable_operation_notifications: bool,

    pub(crate) awaiting_response: FxHashMap<RequestId, ResponseHandler>,
    next_request_id: i32,

    metric_sink: Box<dyn MetricSink>,
    last_metrics_flush: Instant,
}

impl LspLoop {
    pub(crate) fn new(sender: Sender<Message>, options: LspOptions) -> LspLoop {
        let workers = ThreadPool::new(options.typecheck_threads.max(1));
        LspLoop {
            sender,
            options,
            workers,
            root_uri: String::new(),
            root_path: String::new(),
            initialized: false,
            shutdown_requested: false,
            exit_requested: false,
            initial_gs: GlobalState::new(),
            indexed: FxHashMap::default(),
            state_hashes: FxHashMap::default(),
            files_that_have_errors: FxHashSet::default(),
            open_files: FxHashSet::default(),
            deferred_watchman_updates: FxHashSet::default(),
            client_snippet_support: false,
            enable_operation_notifications: false,
            awaiting_response: FxHashMap::default(),
            next_request_id: 1,
            metric_sink: Box::new(TracingMetricSink),
            last_metrics_flush: Instant::now(),
        }
    }

    pub(crate) fn send(&self, message: Message) {
        match self.sender.send(message) {
            Ok(_) => {}
            Err(err) => {
                tracing::error!(err = %err, "failed to send message")
            }
        }
    }

    pub(crate) fn respond(&self, response: Response) {
        self.send(response.into());
    }

    pub(crate) fn send_error(&self, id: RequestId, code: lsp_server::ErrorCode, message: String) {
        self.respond(Response::new_err(id, code as i32, message));
    }

    pub(crate) fn send_notification<N: lsp_types::notification::Notification>(
        &self,
        params: N::Params,
    ) {
        let not = lsp_server::Notification::new(N::METHOD.to_owned(), params);
        self.send(not.into());
    }

    pub(crate) fn send_request<R: lsp_types::request::Request>(
        &mut self,
        params: R::Params,
        handler: ResponseHandler,
    ) {
        let id = RequestId::from(self.next_request_id);
        self.next_request_id += 1;
        self.awaiting_response.insert(id.clone(), handler);
        self.send(lsp_server::Request::new(id, R::METHOD.to_owned(), params).into());
    }

    pub(crate) fn send_show_message(&self, typ: lsp_types::MessageType, message: &str) {
        self.send_notification::<lsp_types::notification::ShowMessage>(
            lsp_types::ShowMessageParams {
                typ,
                message: message.to_string(),
            },
        );
    }

    /// Announce a slow operation to the client's status line. The returned
    /// guard sends the paired `end` when dropped. No-op unless the client
    /// opted in during `initialize`.
    pub(crate) fn show_operation(&self, name: &str, description: &str) -> ShowOperation {
        let operation = ShowOperation {
            sender: self.enable_operation_notifications.then(|| self.sender.clone()),
            name: name.to_string(),
            description: description.to_string(),
        };
        operation.notify(OperationStatus::Start);
        operation
    }

    /// The dispatch loop. Consumes the loop and the initial canonical state;
    /// returns the final state once the client disconnects or asks to exit.
    pub(crate) fn run(mut self, receiver: Receiver<Message>, mut gs: GlobalState) -> GlobalState {
        let queue = Arc::new(MessageQueue::new(self.options.collect_thread_counters));

        let reader_queue = queue.clone();
        let _reader = thread::Builder::new()
            .name("moss-lsp-preprocessor".to_string())
            .spawn(move || {
                for msg in receiver {
                    reader_queue.enqueue(msg);
                }
                reader_queue.terminate();
            })
            .expect("failed to spawn the pre-processing thread");

        loop {
            self.maybe_flush_counters(&queue);
            match queue.next_message(DISPATCH_TICK) {
                Next::Message(pending) => {
                    gs = self.process_pending(gs, pending, &queue);
                    if self.exit_requested {
                        tracing::info!("exit requested, leaving the dispatch loop");
                        break;
                    }
                }
                Next::TimedOut => continue,
                Next::Terminated => {
                    tracing::info!("input closed, leaving the dispatch loop");
                    break;
                }
            }
        }
        gs
    }

    pub(crate) fn process_pending(
        &mut self,
        gs: GlobalState,
        pending: Pending,
        queue: &MessageQueue,
    ) -> GlobalState {
        match pending {
            Pending::CanceledResponse(response) => {
                counter_inc("lsp.messages.canceled");
                self.respond(response);
                gs
            }
            Pending::Message(msg, canceled) => {
                if let Message::Request(req) = &msg {
                    queue.set_in_flight(Some((req.id.clone(), canceled.clone())));
                }
                let gs = self.process_request(gs, msg, canceled);
                queue.set_in_flight(None);
                gs
            }
        }
    }

    /// Synchronous batch entry point: pre-process and dispatch `messages` in
    /// order on the calling thread. This is how embedders and tests drive the
    /// loop without a connection. `__PAUSE__` cannot be honored here.
    #[allow(dead_code)]
    pub(crate) fn process_messages(
        &mut self,
        mut gs: GlobalState,
        messages: Vec<Message>,
    ) -> GlobalState {
        let queue = MessageQueue::new(self.options.collect_thread_counters);
        for msg in messages {
            queue.enqueue(msg);
        }
        assert!(
            !queue.is_paused(),
            "__PAUSE__ is not supported in single-threaded mode"
        );

        while let Some(pending) = queue.try_pop() {
            gs = self.process_pending(gs, pending, &queue);
            if self.exit_requested {
                break;
            }
        }
        gs
    }

    fn maybe_flush_counters(&mut self, queue: &MessageQueue) {
        if self.last_metrics_flush.elapsed() < METRICS_FLUSH_INTERVAL {
            return;
        }

        let mut snapshot: CounterState = take_thread_counters();
        snapshot.merge(queue.take_counters());
        if !snapshot.is_empty() {
            self.metric_sink.publish(&snapshot);
        }
        tracing::debug!(enqueued = queue.messages_enqueued(), "flushed counters");
        self.last_metrics_flush = Instant::now();
    }
}

/// RAII pair of `moss/showOperation` notifications around a slow operation.
pub(crate) struct ShowOperation {
    sender: Option<Sender<Message>>,
    name: String,
    description: String,
}

impl ShowOperation {
    fn notify(&self, status: OperationStatus) {
        let sender = match &self.sender {
            Some(sender) => sender,
            None => return,
        };
        let not = lsp_server::Notification::new(
            ShowOperationNotification::METHOD.to_owned(),
            ShowOperationParams {
                operation_name: self.name.clone(),
                description: self.description.clone(),
                status,
            },
        );
        if let Err(err) = sender.send(not.into()) {
            tracing::error!(err = %err, "failed to send operation notification");
        }
    }
}

impl Drop for ShowOperation {
    fn drop(&mut self) {
        self.notify(OperationStatus::End);
    }
}
