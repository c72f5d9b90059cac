//! Parallel answer producer.
//!
//! Fans out over disjoint partitions of the starting vertex's candidates:
//! each worker runs its own depth-first traversal restricted to one
//! partition, answers merge through a bounded channel with no ordering
//! guarantee. Workers observe the shared cancellation flag, and dropping
//! the receiving iterator hangs up the channel, which stops the workers
//! at their next send.

use super::{Binding, GraphIterator, TraversalContext};
use crate::answer::ConceptMap;
use crate::error::Result;
use crate::procedure::Procedure;
use crossbeam_channel::{bounded, Receiver};
use std::sync::Arc;

/// How many answers may queue per worker before it blocks
const CHANNEL_CAPACITY: usize = 256;

/// Spawn a parallel traversal and return the merged answer stream
pub fn parallel_traverse(
    procedure: Arc<Procedure>,
    ctx: TraversalContext,
    num_threads: usize,
) -> ParallelAnswers {
    let threads = if num_threads == 0 {
        num_cpus::get()
    } else {
        num_threads
    };

    // Partition the start candidates round-robin across workers
    let candidates: Vec<Binding> =
        super::instructions::start_candidates(&ctx, &procedure, procedure.start()).collect();
    let mut partitions: Vec<Vec<Binding>> = vec![Vec::new(); threads.max(1)];
    let partition_count = partitions.len();
    for (i, candidate) in candidates.into_iter().enumerate() {
        partitions[i % partition_count].push(candidate);
    }

    let (sender, receiver) = bounded(CHANNEL_CAPACITY);
    rayon::spawn(move || {
        rayon::scope(|scope| {
            for partition in partitions {
                if partition.is_empty() {
                    continue;
                }
                let sender = sender.clone();
                let procedure = Arc::clone(&procedure);
                let ctx = ctx.clone();
                scope.spawn(move |_| {
                    let iter = GraphIterator::new(procedure, ctx.clone())
                        .with_start_restriction(partition);
                    for answer in iter {
                        if ctx.cancel.is_cancelled() {
                            break;
                        }
                        // Receiver dropped: stop producing
                        if sender.send(answer).is_err() {
                            break;
                        }
                    }
                });
            }
        });
    });

    ParallelAnswers { receiver }
}

/// Merged answer stream of a parallel traversal
pub struct ParallelAnswers {
    receiver: Receiver<Result<ConceptMap>>,
}

impl Iterator for ParallelAnswers {
    type Item = Result<ConceptMap>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}
