//! Index many BAM files concurrently.
//!
//! Architecture:
//! - Main thread: queue one job per input, then collect results
//! - Worker pool: each worker indexes a whole file and writes its `.bai`
//!
//! Files are independent, so parallelism is across files only; a single
//! file is always indexed in one sequential pass.

use std::path::{Path, PathBuf};

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::index::{default_index_path, index_bam_file, write_index_file};
use crate::{IndexConfig, IndexStats};

/// Result of indexing one input
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub stats: IndexStats,
}

struct IndexJob {
    /// Position in the input list, for ordering output
    job_id: usize,
    input: PathBuf,
}

/// Index every input, writing `<input>.bai` next to each.
///
/// The outer error is reserved for pool failures. Per-file failures are
/// reported in the returned list, which follows input order.
pub fn index_files(inputs: &[PathBuf], config: &IndexConfig) -> Result<Vec<Result<BatchOutcome>>> {
    let num_threads = config.effective_threads().min(inputs.len().max(1));
    if num_threads == 1 {
        return Ok(inputs.iter().map(|input| index_one(input, config)).collect());
    }

    let (job_tx, job_rx): (Sender<IndexJob>, Receiver<IndexJob>) = bounded(inputs.len());
    let (result_tx, result_rx): (
        Sender<(usize, Result<BatchOutcome>)>,
        Receiver<(usize, Result<BatchOutcome>)>,
    ) = bounded(inputs.len());

    for (job_id, input) in inputs.iter().enumerate() {
        job_tx
            .send(IndexJob { job_id, input: input.clone() })
            .map_err(|_| Error::Internal("Job queue disconnected".to_string()))?;
    }
    drop(job_tx);

    debug!("indexing {} files on {} threads", inputs.len(), num_threads);

    // Use crossbeam's scoped threads to borrow the config
    let result = crossbeam::scope(|scope| {
        for _ in 0..num_threads {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move |_| worker_thread(job_rx, result_tx, config));
        }
        drop(result_tx);

        let mut slots: Vec<Option<Result<BatchOutcome>>> =
            std::iter::repeat_with(|| None).take(inputs.len()).collect();
        for (job_id, outcome) in result_rx.iter() {
            slots[job_id] = Some(outcome);
        }
        slots
    });

    let slots = result.map_err(|_| Error::Internal("Thread panicked".to_string()))?;
    slots
        .into_iter()
        .map(|slot| slot.ok_or_else(|| Error::Internal("Worker dropped a job".to_string())))
        .collect()
}

fn worker_thread(
    job_rx: Receiver<IndexJob>,
    result_tx: Sender<(usize, Result<BatchOutcome>)>,
    config: &IndexConfig,
) {
    while let Ok(job) = job_rx.recv() {
        let outcome = index_one(&job.input, config);
        if result_tx.send((job.job_id, outcome)).is_err() {
            // Main thread has stopped, exit
            break;
        }
    }
}

fn index_one(input: &Path, config: &IndexConfig) -> Result<BatchOutcome> {
    let output = default_index_path(input);
    let outcome = index_bam_file(input, config).and_then(|(index, stats)| {
        write_index_file(&output, &index, config)?;
        Ok(BatchOutcome { input: input.to_path_buf(), output, stats })
    });
    if let Err(e) = &outcome {
        warn!("{}", e);
    }
    outcome
}
