//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::future::Future;

use lrsvm_la::{DMat, DVec};
use lrsvm_mesh::{Communicator, Mesh};
use lrsvm_train::{Dataset, Rng};

/// Two well separated Gaussian clusters around (2, 2) and (-2, -2).
/// Even rows are +1, odd rows -1.
pub fn clusters(n: usize, seed: u64) -> Dataset {
    let mut rng = Rng::new(seed);
    let mut labels = Vec::with_capacity(n);
    let mut rows = Vec::with_capacity(n * 2);
    for i in 0..n {
        let label = if i % 2 == 0 { 1.0 } else { -1.0 };
        let center = 2.0 * label;
        rows.push(center + 0.5 * rng.normal());
        rows.push(center + 0.5 * rng.normal());
        labels.push(label);
    }
    Dataset::new(DMat::from_row_slice(n, 2, &rows), DVec::from_vec(labels)).unwrap()
}

/// Run `body` once per rank of a local mesh of `size`, each in its own task,
/// and return the results in rank order. Every communicator is finished
/// after its body returns.
pub async fn on_mesh<T, F, Fut>(size: usize, body: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(Communicator) -> Fut,
    Fut: Future<Output = (Communicator, T)> + Send + 'static,
{
    let handles: Vec<_> = Mesh::local(size)
        .await
        .unwrap()
        .into_iter()
        .map(|comm| {
            let fut = body(comm);
            tokio::spawn(async move {
                let (comm, out) = fut.await;
                comm.finish().await.unwrap();
                out
            })
        })
        .collect();

    let mut results = Vec::with_capacity(size);
    for h in handles {
        results.push(h.await.unwrap());
    }
    results
}
