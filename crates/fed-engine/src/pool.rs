// SPDX-License-Identifier: MIT OR Apache-2.0
//! The bounded pool of isolated executors.

use crate::app::{AppFactory, ClientAppCallable, Context};
use anyhow::anyhow;
use fed_task::Message;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Errors from executing one job inside an actor.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The client application returned an error or panicked.
    #[error("client application failed")]
    AppFailed(#[source] anyhow::Error),

    /// Execution exceeded the message's time-to-live.
    #[error("task exceeded its ttl of {ttl:?}")]
    TtlExpired {
        /// The TTL that was exceeded.
        ttl: Duration,
    },
}

/// One unit of work for an actor: the message plus the destination node's
/// context.
pub struct ActorJob {
    /// The message to hand to the client application.
    pub message: Message,
    /// The node's durable context.
    pub context: Context,
}

/// Handle to a job accepted by the pool.
///
/// Fetching the result blocks until the executor completes and returns
/// the actor slot to the free list.
pub struct JobHandle {
    actor_id: usize,
    task: JoinHandle<Result<(Message, Context), PoolError>>,
    free: Arc<Mutex<VecDeque<usize>>>,
}

impl JobHandle {
    /// Await the job's outcome; the actor is available again on return.
    pub async fn fetch(self) -> Result<(Message, Context), PoolError> {
        let outcome = match self.task.await {
            Ok(outcome) => outcome,
            // The wrapper task neither panics nor gets aborted; a join
            // error here means the runtime is tearing down.
            Err(e) => Err(PoolError::AppFailed(anyhow!("executor task lost: {e}"))),
        };
        self.free
            .lock()
            .expect("free list lock poisoned")
            .push_back(self.actor_id);
        outcome
    }
}

/// A fixed-capacity set of isolated executors.
///
/// Every actor builds its own client-application instance from the
/// factory exactly once and never shares it. Application calls run on the
/// blocking thread pool; a panic inside one is caught at the join point
/// and reported as that job's failure, leaving the pool healthy.
pub struct ActorPool {
    factory: AppFactory,
    capacity: usize,
    actors: Mutex<Vec<Arc<dyn ClientAppCallable>>>,
    free: Arc<Mutex<VecDeque<usize>>>,
}

impl ActorPool {
    /// Create an empty pool bounded at `capacity` actors.
    #[must_use]
    pub fn new(factory: AppFactory, capacity: usize) -> Self {
        Self {
            factory,
            capacity,
            actors: Mutex::new(Vec::new()),
            free: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Spawn up to `n` additional actors, bounded by the pool capacity.
    /// Returns how many were actually added.
    pub fn add_actors(&self, n: usize) -> usize {
        let mut actors = self.actors.lock().expect("actor list lock poisoned");
        let mut free = self.free.lock().expect("free list lock poisoned");
        let headroom = self.capacity.saturating_sub(actors.len());
        let to_add = n.min(headroom);
        for _ in 0..to_add {
            let actor_id = actors.len();
            // Load the application once per actor.
            actors.push((self.factory)());
            free.push_back(actor_id);
            debug!(target: "fed.pool", actor_id, "actor added");
        }
        to_add
    }

    /// Number of actors currently in the pool.
    #[must_use]
    pub fn num_actors(&self) -> usize {
        self.actors.lock().expect("actor list lock poisoned").len()
    }

    /// Maximum number of actors this pool may hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` when at least one actor is idle.
    #[must_use]
    pub fn is_actor_available(&self) -> bool {
        !self.free.lock().expect("free list lock poisoned").is_empty()
    }

    /// Hand `job` to an idle actor without blocking.
    ///
    /// # Errors
    ///
    /// Gives the job back when every actor is busy.
    pub fn submit_if_actor_is_free(&self, job: ActorJob) -> Result<JobHandle, ActorJob> {
        let actor_id = {
            let mut free = self.free.lock().expect("free list lock poisoned");
            match free.pop_front() {
                Some(id) => id,
                None => return Err(job),
            }
        };
        let app = {
            let actors = self.actors.lock().expect("actor list lock poisoned");
            Arc::clone(&actors[actor_id])
        };
        let ttl = job.message.metadata.ttl;
        debug!(target: "fed.pool", actor_id, ?ttl, "job submitted");

        let task = tokio::spawn(async move {
            let ActorJob { message, context } = job;
            let work = tokio::task::spawn_blocking(move || {
                let mut context = context;
                app.call(message, &mut context).map(|reply| (reply, context))
            });

            let joined = match ttl {
                Some(ttl) => match tokio::time::timeout(ttl, work).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        // The blocking call cannot be interrupted; it is
                        // abandoned and finishes in the background while
                        // the slot is reclaimed.
                        warn!(target: "fed.pool", actor_id, ?ttl, "job exceeded ttl");
                        return Err(PoolError::TtlExpired { ttl });
                    }
                },
                None => work.await,
            };

            match joined {
                Ok(Ok(pair)) => Ok(pair),
                Ok(Err(e)) => Err(PoolError::AppFailed(e)),
                Err(join_err) if join_err.is_panic() => Err(PoolError::AppFailed(anyhow!(
                    "client application panicked"
                ))),
                Err(join_err) => Err(PoolError::AppFailed(anyhow!(
                    "executor task failed: {join_err}"
                ))),
            }
        });

        Ok(JobHandle {
            actor_id,
            task,
            free: Arc::clone(&self.free),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fed_record::RecordSet;
    use fed_task::{MessageType, Metadata};
    use uuid::Uuid;

    fn echo_factory() -> AppFactory {
        Arc::new(|| {
            Arc::new(
                |msg: Message, _ctx: &mut Context| -> anyhow::Result<Message> {
                    Ok(msg.reply(RecordSet::new()))
                },
            ) as Arc<dyn ClientAppCallable>
        })
    }

    fn job(ttl: Option<Duration>) -> ActorJob {
        ActorJob {
            message: Message::new(
                Metadata {
                    run_id: 1,
                    message_id: Uuid::new_v4(),
                    group_id: "g".into(),
                    src_node_id: 0,
                    dst_node_id: 1,
                    ttl,
                    message_type: MessageType::Fit,
                },
                RecordSet::new(),
            ),
            context: Context::new(1, 1),
        }
    }

    #[test]
    fn add_actors_is_bounded_by_capacity() {
        let pool = ActorPool::new(echo_factory(), 2);
        assert_eq!(pool.add_actors(5), 2);
        assert_eq!(pool.add_actors(1), 0);
        assert_eq!(pool.num_actors(), 2);
    }

    #[tokio::test]
    async fn job_completes_and_frees_the_actor() {
        let pool = ActorPool::new(echo_factory(), 1);
        pool.add_actors(1);
        assert!(pool.is_actor_available());

        let handle = pool.submit_if_actor_is_free(job(None)).ok().unwrap();
        assert!(!pool.is_actor_available());

        let (reply, _ctx) = handle.fetch().await.unwrap();
        assert_eq!(reply.metadata.src_node_id, 1);
        assert!(pool.is_actor_available());
    }

    #[tokio::test]
    async fn busy_pool_returns_the_job() {
        let pool = ActorPool::new(echo_factory(), 1);
        pool.add_actors(1);
        let first = pool.submit_if_actor_is_free(job(None)).ok().unwrap();
        assert!(pool.submit_if_actor_is_free(job(None)).is_err());
        first.fetch().await.unwrap();
    }

    #[tokio::test]
    async fn panic_is_contained_and_slot_reclaimed() {
        let factory: AppFactory = Arc::new(|| {
            Arc::new(|_msg: Message, _ctx: &mut Context| -> anyhow::Result<Message> {
                panic!("boom")
            }) as Arc<dyn ClientAppCallable>
        });
        let pool = ActorPool::new(factory, 1);
        pool.add_actors(1);

        let handle = pool.submit_if_actor_is_free(job(None)).ok().unwrap();
        let err = handle.fetch().await.unwrap_err();
        assert!(matches!(err, PoolError::AppFailed(_)));
        assert!(pool.is_actor_available());
    }

    #[tokio::test]
    async fn ttl_expiry_reclaims_the_slot() {
        let factory: AppFactory = Arc::new(|| {
            Arc::new(
                |msg: Message, _ctx: &mut Context| -> anyhow::Result<Message> {
                    std::thread::sleep(Duration::from_millis(500));
                    Ok(msg)
                },
            ) as Arc<dyn ClientAppCallable>
        });
        let pool = ActorPool::new(factory, 1);
        pool.add_actors(1);

        let started = std::time::Instant::now();
        let handle = pool
            .submit_if_actor_is_free(job(Some(Duration::from_millis(100))))
            .ok()
            .unwrap();
        let err = handle.fetch().await.unwrap_err();
        assert!(matches!(err, PoolError::TtlExpired { .. }));
        assert!(started.elapsed() < Duration::from_millis(450));
        assert!(pool.is_actor_available());
    }
}
