//! Small demo: worker threads hammer a shared resource until it is disposed
//! from the main thread.

use std::{
    sync::{
        Arc, Barrier,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use lifecycle_guard::{Disposable, Error, LifecycleGuard};
use log::{info, warn};
use maitake_sync::blocking::DefaultMutex;

const WORKERS: usize = 4;

struct Connection {
    guard: LifecycleGuard,
    requests: AtomicUsize,
}

impl Connection {
    fn request(&self) -> Result<usize, Error> {
        self.guarded(|c| {
            thread::sleep(Duration::from_millis(5));
            c.requests.fetch_add(1, Ordering::Relaxed) + 1
        })
    }
}

impl Disposable for Connection {
    type RawMutex = DefaultMutex;

    fn lifecycle(&self) -> &LifecycleGuard {
        &self.guard
    }

    fn teardown(&self) -> Result<(), Error> {
        info!(
            "closing connection after {} requests",
            self.requests.load(Ordering::Relaxed)
        );
        Ok(())
    }
}

fn main() {
    simple_logger::SimpleLogger::new().init().unwrap();

    let conn = Arc::new(Connection {
        guard: LifecycleGuard::new_unstarted("Connection"),
        requests: AtomicUsize::new(0),
    });
    let ready = Arc::new(Barrier::new(WORKERS + 1));

    let workers: Vec<_> = (0..WORKERS)
        .map(|id| {
            let conn = conn.clone();
            let ready = ready.clone();
            thread::spawn(move || {
                ready.wait();
                let mut served = 0;
                loop {
                    match conn.request() {
                        Ok(_) => served += 1,
                        Err(e) if e.is_disposed() => break,
                        Err(e) => {
                            warn!("worker {}: {}", id, e);
                            break;
                        }
                    }
                }
                info!("worker {} served {} requests", id, served);
            })
        })
        .collect();

    conn.guard.start().unwrap();
    ready.wait();
    thread::sleep(Duration::from_millis(50));

    conn.dispose().unwrap();
    for worker in workers {
        worker.join().unwrap();
    }
    info!("{:?}", conn.guard);
}
