use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::scheduler::queue::BoundedQueue;
use crate::stage::StageEngine;

/// Spawns one worker thread per stage (§4.3 Async mode): pulls `In` from
/// `input`, runs it through `engine`, and forwards `Some(Out)` downstream.
/// Ordering is preserved within one region's queue end-to-end; there is
/// no ordering guarantee across regions sharing a stage. Exits once
/// `input` is closed and drained, and closes `output` in turn so the next
/// stage's worker winds down the same way.
pub fn spawn_stage_worker<In, Out>(
    name: impl Into<String>,
    engine: Arc<StageEngine<In, Out>>,
    input: Arc<BoundedQueue<In>>,
    output: Arc<BoundedQueue<Out>>,
) -> JoinHandle<()>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    std::thread::Builder::new()
        .name(format!("stage-{}", name.into()))
        .spawn(move || {
            while let Some(item) = input.recv_blocking() {
                if let Some(out) = engine.process(item) {
                    if output.send_blocking(out).is_err() {
                        break;
                    }
                }
            }
            output.close();
        })
        .expect("failed to spawn stage worker thread")
}

/// Waits up to `deadline` for all `handles` to finish (§4.3's hard stop
/// deadline, default 5s). Threads still running past the deadline are
/// reported as faulted rather than forcibly killed — Rust has no safe
/// primitive to terminate a running thread, so a faulted stage is
/// surfaced through `Pipeline::health()` instead.
pub fn join_with_deadline(handles: Vec<JoinHandle<()>>, deadline: Duration) -> Vec<String> {
    let start = std::time::Instant::now();
    let poll_interval = Duration::from_millis(10);
    let mut faulted = Vec::new();

    for handle in handles {
        let thread_name = handle.thread().name().unwrap_or("stage").to_string();
        loop {
            if handle.is_finished() {
                let _ = handle.join();
                break;
            }
            if start.elapsed() >= deadline {
                faulted.push(thread_name);
                break;
            }
            std::thread::sleep(poll_interval);
        }
    }
    faulted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::stage::Primary;

    struct Double;
    impl Primary<i32, i32> for Double {
        fn invoke(&self, input: &i32) -> Result<i32, String> {
            Ok(input * 2)
        }
    }

    #[test]
    fn worker_processes_items_until_closed() {
        let input: Arc<BoundedQueue<i32>> = Arc::new(BoundedQueue::new(4));
        let output: Arc<BoundedQueue<i32>> = Arc::new(BoundedQueue::new(4));
        let engine = Arc::new(StageEngine::new(
            "double",
            Arc::new(Double),
            vec![],
            vec![],
            Arc::new(SystemClock::new()),
        ));

        let handle = spawn_stage_worker("double", engine, input.clone(), output.clone());

        input.send_blocking(3).unwrap();
        input.send_blocking(4).unwrap();
        input.close();

        assert_eq!(output.recv_blocking(), Some(6));
        assert_eq!(output.recv_blocking(), Some(8));
        assert_eq!(output.recv_blocking(), None);

        join_with_deadline(vec![handle], Duration::from_secs(1));
    }
}
