//! The single thread every reconciliation pass runs on.

use std::{
    io,
    panic::{self, AssertUnwindSafe},
    thread::{self, ThreadId},
};

use crossbeam_channel::{Receiver, Sender};
use jod_thread::JoinHandle;

use crate::{progress::ProgressSink, ReconcileError};

pub const SYNCHRONIZING_TEXT: &str = "Synchronizing files...";

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Serializes refresh work onto one dedicated thread.
///
/// Every pass that mutates the shared file-state cache must go through the
/// same coordinator; jobs run one at a time in submission order, so two
/// passes never interleave their refreshes. Callers block until their own job
/// has finished, which gives the asynchronous queue a synchronous contract.
pub struct RefreshCoordinator {
    /// Queue of pending jobs.
    ///
    /// SHOULD BE DROPPED FIRST! Dropping the sender closes the queue, which
    /// lets the job thread drain what is left and exit. If the thread were
    /// joined first we would wait forever.
    job_sender: Sender<Job>,

    /// A handle to the job thread. When dropped, we'll block until it's done.
    ///
    /// Allowed to be unused because dropping this value has side effects.
    #[allow(unused)]
    job_thread: JoinHandle<()>,

    thread_id: ThreadId,
}

impl RefreshCoordinator {
    /// Spins up the coordinator thread.
    pub fn start() -> io::Result<Self> {
        let (job_sender, job_receiver) = crossbeam_channel::unbounded::<Job>();
        let (id_sender, id_receiver) = crossbeam_channel::bounded(1);

        let job_thread = jod_thread::Builder::new()
            .name("RefreshCoordinator thread".to_owned())
            .spawn(move || {
                log::trace!("RefreshCoordinator thread started");
                let _ = id_sender.send(thread::current().id());

                for job in job_receiver {
                    job();
                }

                log::trace!("RefreshCoordinator queue closed, shutting down");
            })?;

        let thread_id = id_receiver
            .recv()
            .map_err(|_| io::Error::other("RefreshCoordinator thread exited during startup"))?;

        Ok(Self {
            job_sender,
            job_thread,
            thread_id,
        })
    }

    /// Runs `work` on the coordinator thread as one exclusive, non-cancelable
    /// section and blocks until it is done.
    ///
    /// Before dispatching, the sink is told the section can't be cancelled
    /// and gets the "synchronizing" status. Errors returned by `work` are
    /// passed back unchanged. If `work` panics, the panic resumes on the
    /// calling thread. The caller is released exactly once on every path,
    /// including when the job is thrown away without running.
    pub fn run_exclusive<T, F>(&self, sink: &dyn ProgressSink, work: F) -> Result<T, ReconcileError>
    where
        F: FnOnce() -> Result<T, ReconcileError> + Send + 'static,
        T: Send + 'static,
    {
        if thread::current().id() == self.thread_id {
            return Err(ReconcileError::Reentrant);
        }

        sink.start_non_cancelable_section();
        sink.set_text(SYNCHRONIZING_TEXT);
        sink.set_text2("");

        let (signal, done) = CompletionSignal::new();
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(work));
            signal.complete(outcome);
        });

        // On failure the job comes back inside the error and is dropped here,
        // which releases `done` with `Abandoned`.
        if self.job_sender.send(job).is_err() {
            log::warn!("RefreshCoordinator queue is closed, dropping job");
        }

        match done.recv() {
            Ok(Completion::Finished(Ok(result))) => result,
            Ok(Completion::Finished(Err(payload))) => panic::resume_unwind(payload),
            Ok(Completion::Abandoned) | Err(_) => Err(ReconcileError::CoordinatorShutDown),
        }
    }
}

enum Completion<T> {
    Finished(thread::Result<Result<T, ReconcileError>>),
    Abandoned,
}

/// Releases a blocked caller exactly once: explicitly through `complete`, or
/// with `Abandoned` when dropped without completing.
struct CompletionSignal<T> {
    sender: Option<Sender<Completion<T>>>,
}

impl<T> CompletionSignal<T> {
    fn new() -> (Self, Receiver<Completion<T>>) {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    fn complete(mut self, outcome: thread::Result<Result<T, ReconcileError>>) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Completion::Finished(outcome));
        }
    }
}

impl<T> Drop for CompletionSignal<T> {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Completion::Abandoned);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{
        test_util::{Event, RecordingSink},
        NoProgress,
    };
    use std::{
        io,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    #[test]
    fn runs_work_and_returns_result() {
        let coordinator = RefreshCoordinator::start().unwrap();
        let value = coordinator
            .run_exclusive(&NoProgress, || Ok(thread::current().name().map(str::to_owned)))
            .unwrap();

        assert_eq!(value.as_deref(), Some("RefreshCoordinator thread"));
    }

    #[test]
    fn marks_sink_before_running() {
        let coordinator = RefreshCoordinator::start().unwrap();
        let sink = RecordingSink::default();
        coordinator.run_exclusive(&sink, || Ok(())).unwrap();

        assert_eq!(
            sink.events(),
            vec![
                Event::NonCancelable,
                Event::Text(SYNCHRONIZING_TEXT.to_owned()),
                Event::Text2(String::new()),
            ]
        );
    }

    #[test]
    fn error_releases_caller_and_keeps_thread_alive() {
        let coordinator = RefreshCoordinator::start().unwrap();
        let result: Result<(), _> = coordinator.run_exclusive(&NoProgress, || {
            Err(ReconcileError::Refresh {
                path: "/broken".into(),
                source: io::Error::other("disk on fire"),
            })
        });

        assert!(matches!(result, Err(ReconcileError::Refresh { .. })));
        assert_eq!(coordinator.run_exclusive(&NoProgress, || Ok(7)).unwrap(), 7);
    }

    #[test]
    fn panic_resumes_on_caller_and_keeps_thread_alive() {
        let coordinator = RefreshCoordinator::start().unwrap();
        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            coordinator.run_exclusive::<(), _>(&NoProgress, || panic!("refresh exploded"))
        }));

        let payload = caught.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"refresh exploded"));
        assert_eq!(coordinator.run_exclusive(&NoProgress, || Ok(1)).unwrap(), 1);
    }

    #[test]
    fn reentrant_call_is_rejected() {
        let coordinator = Arc::new(RefreshCoordinator::start().unwrap());
        let inner = Arc::clone(&coordinator);

        let result = coordinator.run_exclusive(&NoProgress, move || {
            let nested = inner.run_exclusive(&NoProgress, || Ok(()));
            Ok(matches!(nested, Err(ReconcileError::Reentrant)))
        });

        assert!(result.unwrap());
    }

    #[test]
    fn passes_never_overlap() {
        let coordinator = Arc::new(RefreshCoordinator::start().unwrap());
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let coordinator = Arc::clone(&coordinator);
                let active = Arc::clone(&active);
                let max_active = Arc::clone(&max_active);
                let finished = Arc::clone(&finished);
                thread::spawn(move || {
                    coordinator
                        .run_exclusive(&NoProgress, move || {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            max_active.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(5));
                            active.fetch_sub(1, Ordering::SeqCst);
                            finished.lock().unwrap().push(i);
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();

        for h in handles {
            h.join().expect("Thread panicked");
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert_eq!(finished.lock().unwrap().len(), 8);
    }

    #[test]
    fn completion_signal_fires_once() {
        let (signal, done) = CompletionSignal::<u8>::new();
        signal.complete(Ok(Ok(3)));

        assert!(matches!(done.recv(), Ok(Completion::Finished(Ok(Ok(3))))));
        assert!(done.try_recv().is_err());
    }

    #[test]
    fn dropped_signal_reports_abandoned() {
        let (signal, done) = CompletionSignal::<u8>::new();
        drop(signal);

        assert!(matches!(done.recv(), Ok(Completion::Abandoned)));
        assert!(done.try_recv().is_err());
    }

    #[test]
    fn dropping_coordinator_drains_queue() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let coordinator = RefreshCoordinator::start().unwrap();
            for _ in 0..3 {
                let counter = Arc::clone(&counter);
                coordinator
                    .run_exclusive(&NoProgress, move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
