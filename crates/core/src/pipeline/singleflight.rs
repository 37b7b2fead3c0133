//! Per-key single-flight decision computation.
//!
//! At most one decision computation runs per `(searchee, indexer, guid)`
//! key; concurrent requests for the same key join the in-flight one and
//! receive its outcome.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::{broadcast, Mutex};

use crate::decision::{DecisionKey, StoreError};
use crate::matcher::MatchOutcome;

pub struct SingleFlight {
    inflight: Mutex<HashMap<DecisionKey, broadcast::Sender<MatchOutcome>>>,
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `compute` for the key, or join an in-flight run of it.
    ///
    /// If the leader fails, joiners observe the closed channel and retry,
    /// so one failed computation does not poison followers.
    pub async fn run<F, Fut>(&self, key: DecisionKey, compute: F) -> Result<MatchOutcome, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<MatchOutcome, StoreError>>,
    {
        loop {
            let mut receiver = {
                let mut inflight = self.inflight.lock().await;
                match inflight.get(&key) {
                    Some(sender) => sender.subscribe(),
                    None => {
                        let (tx, _) = broadcast::channel(1);
                        inflight.insert(key.clone(), tx);
                        break;
                    }
                }
            };
            if let Ok(outcome) = receiver.recv().await {
                return Ok(outcome);
            }
            // Leader failed; loop and try to become the leader.
        }

        let result = compute().await;

        let sender = self.inflight.lock().await.remove(&key);
        if let (Ok(outcome), Some(sender)) = (&result, sender) {
            // No receivers is fine; nobody joined.
            let _ = sender.send(outcome.clone());
        }
        result
    }

    /// Number of in-flight computations, for status reporting.
    pub async fn len(&self) -> usize {
        self.inflight.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inflight.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::decision::Decision;

    fn key() -> DecisionKey {
        DecisionKey::new("s", "i", "g")
    }

    #[tokio::test]
    async fn test_single_caller_computes() {
        let sf = SingleFlight::new();
        let outcome = sf
            .run(key(), || async { Ok(MatchOutcome::rejected(Decision::NoMatch)) })
            .await
            .unwrap();
        assert_eq!(outcome.decision, Decision::NoMatch);
        assert!(sf.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_callers_join() {
        let sf = Arc::new(SingleFlight::new());
        let computations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sf = Arc::clone(&sf);
            let computations = Arc::clone(&computations);
            handles.push(tokio::spawn(async move {
                sf.run(key(), || {
                    let computations = Arc::clone(&computations);
                    async move {
                        computations.fetch_add(1, Ordering::SeqCst);
                        // Hold the slot long enough for others to join.
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        Ok(MatchOutcome::rejected(Decision::SizeMismatch))
                    }
                })
                .await
            }));
        }

        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert_eq!(outcome.decision, Decision::SizeMismatch);
        }
        // All eight callers raced the same key: some joined the leader.
        assert!(computations.load(Ordering::SeqCst) < 8);
        assert!(sf.is_empty().await);
    }

    #[tokio::test]
    async fn test_different_keys_run_independently() {
        let sf = Arc::new(SingleFlight::new());
        let a = sf.run(DecisionKey::new("s", "i", "g1"), || async {
            Ok(MatchOutcome::rejected(Decision::NoMatch))
        });
        let b = sf.run(DecisionKey::new("s", "i", "g2"), || async {
            Ok(MatchOutcome::rejected(Decision::SizeMismatch))
        });
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap().decision, Decision::NoMatch);
        assert_eq!(b.unwrap().decision, Decision::SizeMismatch);
    }

    #[tokio::test]
    async fn test_leader_failure_does_not_poison() {
        let sf = Arc::new(SingleFlight::new());
        let result = sf
            .run(key(), || async {
                Err(StoreError::Database("boom".to_string()))
            })
            .await;
        assert!(result.is_err());

        // The key is free again.
        let outcome = sf
            .run(key(), || async { Ok(MatchOutcome::rejected(Decision::NoMatch)) })
            .await
            .unwrap();
        assert_eq!(outcome.decision, Decision::NoMatch);
    }
}
