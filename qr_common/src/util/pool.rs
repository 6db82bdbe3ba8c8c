use crossbeam_channel::Sender;
use std::thread;

type Task<S> = Box<dyn FnOnce(&S) + Send>;

/// How many tasks may sit queued before `execute` blocks the caller.
const QUEUE_DEPTH: usize = 256;

/// Worker threads for request handling.
///
/// Every worker owns one instance of the state `S`, built once when the pool
/// starts; tasks receive a reference to their worker's copy. Handlers use
/// this for the things they would otherwise clone per request: the shared
/// world arc, the reply channel, a cloned socket.
pub struct ThreadPool<S> {
  tx: Sender<Task<S>>,
}

impl<S: Send + 'static> ThreadPool<S> {
  /// Creates a pool sized for handlers that can stall on another service:
  /// one worker per logical core, with a floor of four. A handler may sit in
  /// a central or peer call for the full deadline, so on small machines the
  /// core count alone is not enough workers to keep serving.
  pub fn auto<F: Fn() -> S>(name: &str, new_state: F) -> Self {
    ThreadPool::new(name, num_cpus::get().max(4) as u32, new_state)
  }

  /// Creates a pool of `workers` threads, named `name-0` through `name-N`
  /// for thread dumps.
  ///
  /// # Panics
  ///
  /// Panics if `workers` is 0, or if the OS refuses to spawn a thread.
  pub fn new<F: Fn() -> S>(name: &str, workers: u32, new_state: F) -> Self {
    assert!(workers > 0, "cannot create a thread pool with no workers");
    let (tx, rx) = crossbeam_channel::bounded::<Task<S>>(QUEUE_DEPTH);
    for i in 0..workers {
      let state = new_state();
      let rx = rx.clone();
      let thread_name = format!("{name}-{i}");
      thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
          while let Ok(task) = rx.recv() {
            task(&state);
          }
        })
        .unwrap_or_else(|e| panic!("could not spawn {thread_name}: {e}"));
    }
    ThreadPool { tx }
  }

  /// Hands the task to the next free worker. The queue is bounded; once
  /// every worker is busy and the queue is full, this blocks the caller
  /// until a slot frees up.
  pub fn execute<F: FnOnce(&S) + Send + 'static>(&self, task: F) {
    self.tx.send(Box::new(task)).expect("worker threads have shut down");
  }
}
