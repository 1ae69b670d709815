// src/core/capture.rs - Event queue and the single-consumer capture worker
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, TracewrightError};

use super::call_graph::{
    Argument, CallId, FunctionCall, MethodKind, ProgramExecution, SourceLanguage,
};
use super::resolver::DeclarationResolver;
use super::value::CapturedValue;

/// One message on the capture queue. Producers (the instrumented call sites)
/// enqueue these; only the capture worker ever reads them.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    FunctionEntered {
        /// Pairs this event with its matching FunctionExited.
        correlation_id: u64,
        callee: CapturedValue,
        function_name: String,
        method_kind: MethodKind,
        positional_args: Vec<CapturedValue>,
        named_args: Vec<(String, CapturedValue)>,
    },
    FunctionExited {
        correlation_id: u64,
        threw_exception: bool,
        /// The returned value, or the exception being raised.
        returned_value: CapturedValue,
    },
    /// Shutdown sentinel. The worker stops after draining it.
    EndCapture,
}

// Only one capture session may be active per process.
static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Producer-side handle. Cheap to clone and safe to hand to any number of
/// instrumented call sites; all it does is enqueue events.
#[derive(Clone)]
pub struct CaptureHandle {
    sender: mpsc::UnboundedSender<CaptureEvent>,
    next_correlation: Arc<AtomicU64>,
}

impl CaptureHandle {
    /// Announce a function entry. Returns the correlation id the producer
    /// must pass back to `function_ended`.
    pub fn function_started(
        &self,
        callee: CapturedValue,
        function_name: impl Into<String>,
        method_kind: MethodKind,
        positional_args: Vec<CapturedValue>,
        named_args: Vec<(String, CapturedValue)>,
    ) -> u64 {
        let correlation_id = self.next_correlation.fetch_add(1, Ordering::Relaxed);
        self.send(CaptureEvent::FunctionEntered {
            correlation_id,
            callee,
            function_name: function_name.into(),
            method_kind,
            positional_args,
            named_args,
        });
        correlation_id
    }

    /// Announce the matching function exit.
    pub fn function_ended(
        &self,
        correlation_id: u64,
        threw_exception: bool,
        returned_value: CapturedValue,
    ) {
        self.send(CaptureEvent::FunctionExited {
            correlation_id,
            threw_exception,
            returned_value,
        });
    }

    fn send(&self, event: CaptureEvent) {
        if self.sender.send(event).is_err() {
            warn!("capture worker is gone, dropping event");
        }
    }
}

/// One capture session: owns the event queue and the worker draining it.
///
/// Producers enqueue concurrently; the worker processes strictly
/// sequentially, which is what gives LanguageObject and FunctionCall ids a
/// total order without any locking of the graph itself.
#[derive(Debug)]
pub struct CaptureSession {
    sender: mpsc::UnboundedSender<CaptureEvent>,
    next_correlation: Arc<AtomicU64>,
    worker: Option<JoinHandle<Result<ProgramExecution>>>,
}

impl CaptureSession {
    /// Start capturing. Fails if another session is already active in this
    /// process.
    pub fn start(language: SourceLanguage) -> Result<Self> {
        if SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TracewrightError::SessionActive);
        }

        info!(language = language.as_str(), "capture session started");
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(CaptureWorker::new(language).run(receiver));
        Ok(Self {
            sender,
            next_correlation: Arc::new(AtomicU64::new(1)),
            worker: Some(worker),
        })
    }

    /// A producer handle for instrumented call sites.
    pub fn handle(&self) -> CaptureHandle {
        CaptureHandle {
            sender: self.sender.clone(),
            next_correlation: Arc::clone(&self.next_correlation),
        }
    }

    /// End the session: enqueue the sentinel, wait for the worker to drain
    /// every pending event, and hand back the final graph.
    pub async fn finish(mut self) -> Result<ProgramExecution> {
        let _ = self.sender.send(CaptureEvent::EndCapture);
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => return Err(TracewrightError::CaptureAborted),
        };
        let execution = match worker.await {
            Ok(result) => result?,
            Err(_) => return Err(TracewrightError::CaptureAborted),
        };
        info!(
            objects = execution.object_count(),
            calls = execution.call_count(),
            "capture session finished"
        );
        Ok(execution)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        // An unfinished session leaves a partial, discardable graph; the
        // process-wide slot is freed either way.
        if let Some(worker) = self.worker.take() {
            worker.abort();
            debug!("capture session dropped without finish, discarding partial graph");
        }
        SESSION_ACTIVE.store(false, Ordering::SeqCst);
    }
}

struct PendingCall {
    call_index: usize,
    entered_at: Instant,
}

/// The single sequential consumer. All graph mutation happens here.
struct CaptureWorker {
    execution: ProgramExecution,
    resolver: DeclarationResolver,
    pending: HashMap<u64, PendingCall>,
    next_call_id: CallId,
    // One below MIN_LEVEL, so the first enter lands on level 0.
    current_level: i64,
}

impl CaptureWorker {
    fn new(language: SourceLanguage) -> Self {
        Self {
            execution: ProgramExecution::new(language),
            resolver: DeclarationResolver::new(),
            pending: HashMap::new(),
            next_call_id: 1,
            current_level: ProgramExecution::MIN_LEVEL as i64 - 1,
        }
    }

    async fn run(
        mut self,
        mut receiver: mpsc::UnboundedReceiver<CaptureEvent>,
    ) -> Result<ProgramExecution> {
        while let Some(event) = receiver.recv().await {
            match event {
                CaptureEvent::EndCapture => break,
                other => self.process(other)?,
            }
        }
        Ok(self.execution)
    }

    fn process(&mut self, event: CaptureEvent) -> Result<()> {
        match event {
            CaptureEvent::FunctionEntered {
                correlation_id,
                callee,
                function_name,
                method_kind,
                positional_args,
                named_args,
            } => {
                self.current_level += 1;
                let level = self.current_level.max(ProgramExecution::MIN_LEVEL as i64) as u32;

                let callee_id = self.resolver.resolve(&mut self.execution, &callee, true)?;

                let mut arguments = Vec::with_capacity(positional_args.len() + named_args.len());
                for arg in &positional_args {
                    let object = self.resolver.resolve(&mut self.execution, arg, false)?;
                    arguments.push(Argument::positional(object));
                }
                for (name, arg) in &named_args {
                    let object = self.resolver.resolve(&mut self.execution, arg, false)?;
                    arguments.push(Argument::named(object, name.clone()));
                }

                let call_id = self.next_call_id;
                self.next_call_id += 1;
                debug!(call_id, function = %function_name, level, "function entered");

                let call = FunctionCall::new(
                    call_id,
                    callee_id,
                    function_name,
                    method_kind,
                    arguments,
                    level,
                );
                let call_index = self.execution.call_count();
                self.execution.add_call(call);
                self.pending.insert(
                    correlation_id,
                    PendingCall {
                        call_index,
                        entered_at: Instant::now(),
                    },
                );
            }
            CaptureEvent::FunctionExited {
                correlation_id,
                threw_exception,
                returned_value,
            } => {
                let pending = self
                    .pending
                    .remove(&correlation_id)
                    .ok_or(TracewrightError::Desync(correlation_id))?;
                let returned = self
                    .resolver
                    .resolve(&mut self.execution, &returned_value, false)?;
                let total_time = pending.entered_at.elapsed().as_secs_f64();
                self.execution.call_at_mut(pending.call_index).complete(
                    Some(returned),
                    threw_exception,
                    Some(total_time),
                );
                self.current_level -= 1;
            }
            CaptureEvent::EndCapture => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call_graph::{Declaration, LanguageType, LiteralValue};
    use crate::core::value::ClassRef;
    use tokio::sync::Mutex;

    // The process-wide active-session flag makes concurrently running
    // session tests step on each other; serialize them.
    static SESSION_LOCK: Mutex<()> = Mutex::const_new(());

    fn my_functions() -> CapturedValue {
        CapturedValue::module("my_functions")
    }

    #[tokio::test]
    async fn captures_a_module_function_call() {
        let _guard = SESSION_LOCK.lock().await;
        let session = CaptureSession::start(SourceLanguage::Python).unwrap();
        let handle = session.handle();

        let correlation = handle.function_started(
            my_functions(),
            "add",
            MethodKind::Method,
            vec![CapturedValue::Int(4), CapturedValue::Int(5)],
            vec![],
        );
        handle.function_ended(correlation, false, CapturedValue::Int(25));

        let execution = session.finish().await.unwrap();
        assert_eq!(execution.call_count(), 1);

        let call = &execution.calls()[0];
        assert_eq!(call.function_name(), "add");
        assert_eq!(call.level(), 0);
        assert!(!call.threw_exception());
        assert!(call.total_time().is_some());
        assert_eq!(call.arguments().len(), 2);

        let callee = execution.expect_object(call.callee()).unwrap();
        assert_eq!(callee.language_type(), LanguageType::Module);

        let returned = execution
            .expect_object(call.returned_object().unwrap())
            .unwrap();
        assert_eq!(
            returned.declaration(),
            &Declaration::FixedValue(LiteralValue::Int(25))
        );
    }

    #[tokio::test]
    async fn nested_calls_get_increasing_levels() {
        let _guard = SESSION_LOCK.lock().await;
        let session = CaptureSession::start(SourceLanguage::Python).unwrap();
        let handle = session.handle();

        let outer = handle.function_started(my_functions(), "outer", MethodKind::Method, vec![], vec![]);
        let inner = handle.function_started(my_functions(), "inner", MethodKind::Method, vec![], vec![]);
        handle.function_ended(inner, false, CapturedValue::Null);
        handle.function_ended(outer, false, CapturedValue::Null);

        let execution = session.finish().await.unwrap();
        assert_eq!(execution.calls()[0].level(), 0);
        assert_eq!(execution.calls()[1].level(), 1);
    }

    #[tokio::test]
    async fn repeated_arguments_share_one_object() {
        let _guard = SESSION_LOCK.lock().await;
        let session = CaptureSession::start(SourceLanguage::Python).unwrap();
        let handle = session.handle();

        for _ in 0..2 {
            let correlation = handle.function_started(
                my_functions(),
                "add",
                MethodKind::Method,
                vec![CapturedValue::Int(4), CapturedValue::Int(5)],
                vec![],
            );
            handle.function_ended(correlation, false, CapturedValue::Int(9));
        }

        let execution = session.finish().await.unwrap();
        let calls = execution.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].arguments()[0].object(),
            calls[1].arguments()[0].object()
        );
        assert_eq!(calls[0].returned_object(), calls[1].returned_object());
    }

    #[tokio::test]
    async fn exit_without_enter_is_a_desync() {
        let _guard = SESSION_LOCK.lock().await;
        let session = CaptureSession::start(SourceLanguage::Python).unwrap();
        let handle = session.handle();

        handle.function_ended(99, false, CapturedValue::Null);

        let err = session.finish().await.unwrap_err();
        assert!(matches!(err, TracewrightError::Desync(99)));
    }

    #[tokio::test]
    async fn second_session_is_rejected_while_one_is_active() {
        let _guard = SESSION_LOCK.lock().await;
        let session = CaptureSession::start(SourceLanguage::Python).unwrap();
        let err = CaptureSession::start(SourceLanguage::Python).unwrap_err();
        assert!(matches!(err, TracewrightError::SessionActive));

        drop(session);
        // Dropping the first session frees the slot.
        let session = CaptureSession::start(SourceLanguage::Python).unwrap();
        session.finish().await.unwrap();
    }

    #[tokio::test]
    async fn exception_exit_records_the_exception_object() {
        let _guard = SESSION_LOCK.lock().await;
        let session = CaptureSession::start(SourceLanguage::Python).unwrap();
        let handle = session.handle();

        let correlation =
            handle.function_started(my_functions(), "explode", MethodKind::Method, vec![], vec![]);
        handle.function_ended(
            correlation,
            true,
            CapturedValue::instance(ClassRef::new("my_functions", "MyException"), 0xbeef),
        );

        let execution = session.finish().await.unwrap();
        let call = &execution.calls()[0];
        assert!(call.threw_exception());

        let exception = execution
            .expect_object(call.returned_object().unwrap())
            .unwrap();
        assert_eq!(exception.language_type(), LanguageType::Instance);
        let class = execution.expect_object(exception.parent().unwrap()).unwrap();
        assert_eq!(class.language_type(), LanguageType::Class);
    }
}
