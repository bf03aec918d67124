// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — Partition Communicator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Collective communication between mesh partitions.
//!
//! Every collective call is tagged with the kind of operation and a
//! per-rank sequence number. All ranks must issue the same collectives in
//! the same order; a message whose tag differs from what the receiver is
//! executing is reported as [`PppmError::CollectiveProtocol`].
//!
//! [`ThreadComm`] runs ranks as threads of one process, which is how the
//! distributed transform is exercised without an external message layer.

use log::{debug, error};
use num_complex::Complex64;
use pppm_types::config::PppmConfig;
use pppm_types::constants::DEFAULT_COMM_TIMEOUT_SECS;
use pppm_types::error::{PppmError, PppmResult};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;

const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(DEFAULT_COMM_TIMEOUT_SECS);

/// Kind of collective currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectiveOp {
    AllReduce,
    GhostReduce { axis: usize },
    GhostFill { axis: usize },
    Transpose { axis: usize },
}

impl fmt::Display for CollectiveOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectiveOp::AllReduce => write!(f, "all-reduce"),
            CollectiveOp::GhostReduce { axis } => write!(f, "ghost-reduce(axis {axis})"),
            CollectiveOp::GhostFill { axis } => write!(f, "ghost-fill(axis {axis})"),
            CollectiveOp::Transpose { axis } => write!(f, "transpose(axis {axis})"),
        }
    }
}

/// Blocking collectives over a fixed set of ranks.
pub trait Communicator: Send {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Send one buffer to each listed destination, then receive one buffer
    /// from each of `sources`. Results are returned in `sources` order.
    /// A rank may list itself on both sides.
    fn exchange(
        &mut self,
        op: CollectiveOp,
        outgoing: Vec<(usize, Vec<Complex64>)>,
        sources: &[usize],
    ) -> PppmResult<Vec<Vec<Complex64>>>;

    /// Element-wise global sum, accumulated in rank order so every rank
    /// ends with bit-identical values.
    fn all_reduce_sum(&mut self, values: &mut [f64]) -> PppmResult<()>;
}

enum Payload {
    Mesh(Vec<Complex64>),
    Scalars(Vec<f64>),
}

struct Envelope {
    source: usize,
    seq: u64,
    op: CollectiveOp,
    payload: Payload,
}

/// In-process communicator endpoint backed by `std::sync::mpsc` channels.
pub struct ThreadComm {
    rank: usize,
    size: usize,
    peers: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    stash: HashMap<usize, VecDeque<Envelope>>,
    to_self: VecDeque<Vec<Complex64>>,
    seq: u64,
    timeout: Duration,
}

impl ThreadComm {
    /// Create `size` connected endpoints, indexed by rank.
    pub fn create(size: usize) -> PppmResult<Vec<ThreadComm>> {
        if size == 0 {
            return Err(PppmError::ConfigError(
                "communicator needs at least one rank".to_string(),
            ));
        }
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| channel()).unzip();
        Ok(receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ThreadComm {
                rank,
                size,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(dest, tx)| (dest != rank).then(|| tx.clone()))
                    .collect(),
                inbox,
                stash: HashMap::new(),
                to_self: VecDeque::new(),
                seq: 0,
                timeout: DEFAULT_RECV_TIMEOUT,
            })
            .collect())
    }

    /// How long a receive may block before the peer is declared lost.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Apply the receive timeout named by `config`.
    pub fn configured(self, config: &PppmConfig) -> PppmResult<Self> {
        Ok(self.with_timeout(config.solver.comm_timeout()?))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Collectives completed so far.
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    fn check_rank(&self, peer: usize) -> PppmResult<()> {
        if peer >= self.size {
            return Err(PppmError::CommFailure(format!(
                "rank {} addressed rank {peer} of {}",
                self.rank, self.size
            )));
        }
        Ok(())
    }

    fn post(&self, dest: usize, op: CollectiveOp, payload: Payload) -> PppmResult<()> {
        self.check_rank(dest)?;
        let tx = self.peers[dest].as_ref().ok_or_else(|| {
            PppmError::CommFailure(format!("rank {} has no channel to itself", self.rank))
        })?;
        tx.send(Envelope {
            source: self.rank,
            seq: self.seq,
            op,
            payload,
        })
        .map_err(|_| {
            PppmError::CommFailure(format!(
                "rank {} could not reach rank {dest} during {op}",
                self.rank
            ))
        })
    }

    fn verify(&self, env: Envelope, op: CollectiveOp) -> PppmResult<Payload> {
        if env.seq != self.seq || env.op != op {
            return Err(PppmError::CollectiveProtocol {
                rank: self.rank,
                expected: format!("{op} #{} from rank {}", self.seq, env.source),
                found: format!("{} #{}", env.op, env.seq),
            });
        }
        Ok(env.payload)
    }

    fn receive_from(&mut self, source: usize, op: CollectiveOp) -> PppmResult<Payload> {
        self.check_rank(source)?;
        if let Some(env) = self.stash.get_mut(&source).and_then(VecDeque::pop_front) {
            return self.verify(env, op);
        }
        loop {
            match self.inbox.recv_timeout(self.timeout) {
                Ok(env) if env.source == source => return self.verify(env, op),
                Ok(env) => self.stash.entry(env.source).or_default().push_back(env),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(PppmError::CommFailure(format!(
                        "rank {} timed out waiting for rank {source} in {op}",
                        self.rank
                    )))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PppmError::CommFailure(format!(
                        "rank {} lost every peer while waiting for rank {source} in {op}",
                        self.rank
                    )))
                }
            }
        }
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn exchange(
        &mut self,
        op: CollectiveOp,
        outgoing: Vec<(usize, Vec<Complex64>)>,
        sources: &[usize],
    ) -> PppmResult<Vec<Vec<Complex64>>> {
        for (dest, data) in outgoing {
            if dest == self.rank {
                self.to_self.push_back(data);
            } else {
                self.post(dest, op, Payload::Mesh(data))?;
            }
        }
        let mut received = Vec::with_capacity(sources.len());
        for &source in sources {
            if source == self.rank {
                let data = self.to_self.pop_front().ok_or_else(|| {
                    PppmError::CollectiveProtocol {
                        rank: self.rank,
                        expected: format!("{op} #{} from itself", self.seq),
                        found: "nothing".to_string(),
                    }
                })?;
                received.push(data);
                continue;
            }
            match self.receive_from(source, op)? {
                Payload::Mesh(data) => received.push(data),
                Payload::Scalars(_) => {
                    return Err(PppmError::CollectiveProtocol {
                        rank: self.rank,
                        expected: format!("{op} mesh payload"),
                        found: "scalar payload".to_string(),
                    })
                }
            }
        }
        self.to_self.clear();
        self.seq += 1;
        Ok(received)
    }

    fn all_reduce_sum(&mut self, values: &mut [f64]) -> PppmResult<()> {
        let op = CollectiveOp::AllReduce;
        for dest in (0..self.size).filter(|&d| d != self.rank) {
            self.post(dest, op, Payload::Scalars(values.to_vec()))?;
        }
        let mut total = vec![0.0; values.len()];
        for source in 0..self.size {
            let contribution = if source == self.rank {
                values.to_vec()
            } else {
                match self.receive_from(source, op)? {
                    Payload::Scalars(v) => v,
                    Payload::Mesh(_) => {
                        return Err(PppmError::CollectiveProtocol {
                            rank: self.rank,
                            expected: format!("{op} scalar payload"),
                            found: "mesh payload".to_string(),
                        })
                    }
                }
            };
            if contribution.len() != total.len() {
                return Err(PppmError::CollectiveProtocol {
                    rank: self.rank,
                    expected: format!("{op} of {} values", total.len()),
                    found: format!("{} values from rank {source}", contribution.len()),
                });
            }
            for (acc, v) in total.iter_mut().zip(&contribution) {
                *acc += v;
            }
        }
        values.copy_from_slice(&total);
        self.seq += 1;
        Ok(())
    }
}

/// Run `job` once per rank on a dedicated rayon pool of `nranks` threads.
///
/// Each invocation owns the [`ThreadComm`] endpoint for its rank. Results
/// come back in rank order; the first failing rank's error is returned.
pub fn run_partitions<T, F>(nranks: usize, job: F) -> PppmResult<Vec<T>>
where
    T: Send,
    F: Fn(ThreadComm) -> PppmResult<T> + Sync,
{
    let slots: Vec<Mutex<Option<ThreadComm>>> = ThreadComm::create(nranks)?
        .into_iter()
        .map(|comm| Mutex::new(Some(comm)))
        .collect();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(nranks)
        .thread_name(|i| format!("pppm-rank-{i}"))
        .build()
        .map_err(|e| PppmError::CommFailure(format!("partition pool: {e}")))?;
    debug!("launching {nranks} in-process partitions");

    let results = pool.broadcast(|ctx| {
        let comm = slots[ctx.index()]
            .lock()
            .map_err(|_| PppmError::CommFailure("partition slot poisoned".to_string()))?
            .take()
            .ok_or_else(|| {
                PppmError::CommFailure(format!("rank {} endpoint already taken", ctx.index()))
            })?;
        let result = job(comm);
        if let Err(e) = &result {
            error!("partition {} failed: {e}", ctx.index());
        }
        result
    });
    results.into_iter().collect()
}
