//! Round-robin target selection.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};

use crate::load_balancer::Target;
use crate::observability::logging;
use crate::transport::{set_target_host, Transport};
use crate::upstream::UpstreamError;

/// Rotates through targets with a shared atomic counter.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
    targets: Vec<Target>,
}

impl RoundRobin {
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            counter: AtomicUsize::new(0),
            targets,
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Next target in rotation, `None` when there are no targets.
    pub fn next_target(&self) -> Option<&Target> {
        if self.targets.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.targets.len();
        self.targets.get(index)
    }
}

#[async_trait]
impl Transport for RoundRobin {
    async fn round_trip(
        &self,
        mut request: Request<Body>,
    ) -> Result<Response<Body>, UpstreamError> {
        let target = self.next_target().ok_or(UpstreamError::Unavailable)?;
        logging::set(&request, "upstream", &target.host);
        set_target_host(&mut request, target.host.clone());
        target.transport.round_trip(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::target_host;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Recording {
        hosts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Recording {
        async fn round_trip(
            &self,
            request: Request<Body>,
        ) -> Result<Response<Body>, UpstreamError> {
            self.hosts.lock().unwrap().push(target_host(&request)?);
            Ok(Response::new(Body::empty()))
        }
    }

    fn request() -> Request<Body> {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn empty_is_unavailable() {
        let lb = RoundRobin::new(Vec::new());
        let err = lb.round_trip(request()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unavailable));
    }

    #[tokio::test]
    async fn single_target_always_chosen() {
        let tr = Arc::new(Recording::default());
        let lb = RoundRobin::new(vec![Target::new("upstream1", tr.clone())]);

        lb.round_trip(request()).await.unwrap();
        lb.round_trip(request()).await.unwrap();
        assert_eq!(*tr.hosts.lock().unwrap(), vec!["upstream1", "upstream1"]);
    }

    #[tokio::test]
    async fn rotates_in_order() {
        let tr0 = Arc::new(Recording::default());
        let tr1 = Arc::new(Recording::default());
        let lb = RoundRobin::new(vec![
            Target::new("upstream0", tr0.clone()),
            Target::new("upstream1", tr1.clone()),
        ]);

        for _ in 0..3 {
            lb.round_trip(request()).await.unwrap();
        }
        assert_eq!(*tr0.hosts.lock().unwrap(), vec!["upstream0", "upstream0"]);
        assert_eq!(*tr1.hosts.lock().unwrap(), vec!["upstream1"]);
    }

    #[test]
    fn concurrent_selection_is_even() {
        let tr = Arc::new(Recording::default());
        let lb = Arc::new(RoundRobin::new(
            (0..4)
                .map(|i| Target::new(format!("h{i}"), tr.clone()))
                .collect(),
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lb = lb.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| lb.next_target().unwrap().host.clone())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts = std::collections::HashMap::new();
        for handle in handles {
            for host in handle.join().unwrap() {
                *counts.entry(host).or_insert(0) += 1;
            }
        }
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&n| n == 100));
    }
}
