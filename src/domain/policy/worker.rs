//! Runs policy queries on a helper thread so a slow policy cannot hold a
//! candidate's bar loop past the query deadline.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use super::{FeatureSnapshot, PolicyAction, TradePolicy};
use crate::domain::error::PolicyError;

type Reply = Result<PolicyAction, PolicyError>;

struct Channel {
    requests: Sender<FeatureSnapshot>,
    replies: Receiver<Reply>,
}

/// A candidate run's connection to its policy.
///
/// The helper thread is spawned on the first query. After a timeout the
/// thread is abandoned (it may still be busy with the late query) and the
/// next query starts a fresh one.
pub struct PolicyWorker {
    policy: Arc<dyn TradePolicy>,
    channel: Option<Channel>,
}

impl PolicyWorker {
    pub fn new(policy: Arc<dyn TradePolicy>) -> Self {
        Self {
            policy,
            channel: None,
        }
    }

    /// Asks the policy for an action, waiting at most `limit`.
    pub fn query(&mut self, snapshot: &FeatureSnapshot, limit: Duration) -> Reply {
        let started = Instant::now();
        let channel = match self.channel.take() {
            Some(channel) => channel,
            None => spawn(Arc::clone(&self.policy))?,
        };
        if channel.requests.send(snapshot.clone()).is_err() {
            return Err(worker_gone());
        }

        match channel.replies.recv_timeout(limit) {
            Ok(reply) => {
                self.channel = Some(channel);
                reply
            }
            Err(RecvTimeoutError::Timeout) => Err(PolicyError::Timeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
                limit_ms: limit.as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(worker_gone()),
        }
    }
}

fn spawn(policy: Arc<dyn TradePolicy>) -> Result<Channel, PolicyError> {
    let (request_tx, request_rx) = mpsc::channel::<FeatureSnapshot>();
    let (reply_tx, reply_rx) = mpsc::channel();
    thread::Builder::new()
        .name("policy-query".into())
        .spawn(move || {
            for snapshot in request_rx {
                if reply_tx.send(policy.select_action(&snapshot)).is_err() {
                    break;
                }
            }
        })
        .map_err(|err| PolicyError::Failed {
            reason: format!("cannot start policy thread: {err}"),
        })?;
    Ok(Channel {
        requests: request_tx,
        replies: reply_rx,
    })
}

fn worker_gone() -> PolicyError {
    PolicyError::Failed {
        reason: "policy thread exited without answering".into(),
    }
}
