//! Communicator: one participant's handle on the mesh.
//!
//! Every method is a collective: all ranks must call it, in the same order,
//! with compatible arguments. The coordinator answers locally from its
//! [`RoundTable`]; workers go through a `CollectiveServiceClient`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lrsvm_la::DMat;
use tarpc::{client, context, ClientMessage, Response};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::allreduce::{AllReduce, Reduction};
use crate::error::MeshError;
use crate::hub::RoundTable;
use crate::protocol::{WireMatrix, PROTOCOL_VERSION};
use crate::topology::{Role, Topology, COORDINATOR};
use crate::transport::{
    json_transport, rendezvous_context, spawn_server, CollectiveServiceClient,
    CollectiveServiceRequest, CollectiveServiceResponse,
};

const CONNECT_ATTEMPTS: u32 = 150;
const CONNECT_BACKOFF: Duration = Duration::from_millis(200);

/// Background TCP accept loop, stopped on drop.
struct Listener {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum Endpoint {
    Coordinator {
        table: Arc<RoundTable>,
        listener: Option<Listener>,
    },
    Worker {
        client: CollectiveServiceClient,
    },
}

/// A participant in the mesh.
pub struct Communicator {
    topology: Topology,
    round: AtomicU64,
    endpoint: Endpoint,
}

impl Communicator {
    fn hosting(topology: Topology, table: Arc<RoundTable>, listener: Option<Listener>) -> Self {
        Self {
            topology,
            round: AtomicU64::new(0),
            endpoint: Endpoint::Coordinator { table, listener },
        }
    }

    /// A mesh of one. Every collective returns immediately.
    pub fn single() -> Self {
        Self::hosting(Topology::single(), Arc::new(RoundTable::new(1)), None)
    }

    /// Join as a worker through an already connected client.
    ///
    /// Checks the coordinator's protocol version and mesh size.
    pub async fn attach(
        topology: Topology,
        client: CollectiveServiceClient,
    ) -> Result<Self, MeshError> {
        let hello = client
            .handshake(context::current(), topology.rank() as u32)
            .await?
            .map_err(MeshError::Rejected)?;
        if hello.version != PROTOCOL_VERSION {
            return Err(MeshError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: hello.version,
            });
        }
        if hello.size as usize != topology.size() {
            return Err(MeshError::SizeMismatch {
                expected: topology.size(),
                got: hello.size as usize,
            });
        }
        Ok(Self {
            topology,
            round: AtomicU64::new(0),
            endpoint: Endpoint::Worker { client },
        })
    }

    /// Host the mesh as the coordinator, accepting workers over TCP.
    pub async fn listen_tcp(addr: impl ToSocketAddrs, size: usize) -> Result<Self, MeshError> {
        let topology = Topology::new(COORDINATOR, size)?;
        let table = Arc::new(RoundTable::new(size));
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        info!(%local, size, "coordinator listening");

        let accept_table = table.clone();
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!(%peer, "set_nodelay failed: {e}");
                        }
                        debug!(%peer, "worker connected");
                        let transport = json_transport::<
                            _,
                            ClientMessage<CollectiveServiceRequest>,
                            Response<CollectiveServiceResponse>,
                        >(stream);
                        spawn_server(accept_table.clone(), transport);
                    }
                    Err(e) => {
                        warn!("accept failed: {e}");
                        tokio::time::sleep(CONNECT_BACKOFF).await;
                    }
                }
            }
        });

        Ok(Self::hosting(topology, table, Some(Listener { addr: local, task })))
    }

    /// Join a TCP mesh as worker `rank`, retrying while the coordinator is
    /// not up yet.
    pub async fn connect_tcp(addr: &str, rank: usize, size: usize) -> Result<Self, MeshError> {
        let topology = Topology::new(rank, size)?;
        let stream = connect_with_retry(addr).await?;
        stream.set_nodelay(true)?;
        let client =
            CollectiveServiceClient::new(client::Config::default(), json_transport(stream)).spawn();
        let comm = Self::attach(topology, client).await?;
        info!(%topology, addr, "joined mesh");
        Ok(comm)
    }

    #[inline]
    pub fn topology(&self) -> Topology {
        self.topology
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.topology.rank()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.topology.size()
    }

    #[inline]
    pub fn role(&self) -> Role {
        self.topology.role()
    }

    #[inline]
    pub fn is_coordinator(&self) -> bool {
        self.topology.is_coordinator()
    }

    /// Address the coordinator accepts workers on, when listening on TCP.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.endpoint {
            Endpoint::Coordinator { listener: Some(l), .. } => Some(l.addr),
            _ => None,
        }
    }

    /// Number of collectives this participant has entered.
    pub fn rounds(&self) -> u64 {
        self.round.load(Ordering::Relaxed)
    }

    fn next_round(&self) -> u64 {
        self.round.fetch_add(1, Ordering::Relaxed)
    }

    /// Gather one block per rank at the coordinator.
    ///
    /// Returns the blocks in rank order on the coordinator, `None` elsewhere.
    pub async fn gather(&self, block: &DMat) -> Result<Option<Vec<DMat>>, MeshError> {
        let round = self.next_round();
        match &self.endpoint {
            Endpoint::Coordinator { table, .. } => {
                table.deposit(round, self.rank(), block.clone())?;
                let blocks = table.collect(round).await;
                debug!(round, blocks = blocks.len(), "gathered");
                Ok(Some(blocks))
            }
            Endpoint::Worker { client } => {
                client
                    .contribute(
                        rendezvous_context(),
                        round,
                        self.rank() as u32,
                        WireMatrix::from_dmat(block),
                    )
                    .await?
                    .map_err(MeshError::Rejected)?;
                Ok(None)
            }
        }
    }

    /// Broadcast from the coordinator. The coordinator must pass `Some`;
    /// the argument is ignored on workers.
    pub async fn broadcast(&self, value: Option<&DMat>) -> Result<DMat, MeshError> {
        let round = self.next_round();
        match &self.endpoint {
            Endpoint::Coordinator { table, .. } => {
                let value = value.ok_or(MeshError::NothingToBroadcast)?;
                table.publish(round, value.clone());
                debug!(round, shape = ?value.shape(), "broadcast");
                Ok(value.clone())
            }
            Endpoint::Worker { client } => client.fetch(rendezvous_context(), round).await?.into_dmat(),
        }
    }

    /// Gather and combine at the coordinator. `None` on workers.
    pub async fn reduce(&self, block: &DMat, op: Reduction) -> Result<Option<DMat>, MeshError> {
        match self.gather(block).await? {
            Some(blocks) => AllReduce::new(op).reduce(&blocks).map(Some),
            None => Ok(None),
        }
    }

    /// Element-wise sum of every rank's block, at the coordinator only.
    pub async fn gather_sum(&self, block: &DMat) -> Result<Option<DMat>, MeshError> {
        self.reduce(block, Reduction::Sum).await
    }

    /// Combine at the coordinator, then replicate the result to every rank.
    pub async fn all_reduce(&self, block: &DMat, op: Reduction) -> Result<DMat, MeshError> {
        let combined = self.reduce(block, op).await?;
        self.broadcast(combined.as_ref()).await
    }

    pub async fn all_reduce_sum(&self, block: &DMat) -> Result<DMat, MeshError> {
        self.all_reduce(block, Reduction::Sum).await
    }

    /// Sum of one scalar per rank, replicated.
    pub async fn all_reduce_scalar(&self, value: f64) -> Result<f64, MeshError> {
        Ok(self.all_reduce_sum(&DMat::scalar(value)).await?.get(0, 0))
    }

    /// Scalar broadcast from the coordinator.
    pub async fn broadcast_scalar(&self, value: Option<f64>) -> Result<f64, MeshError> {
        let value = value.map(DMat::scalar);
        Ok(self.broadcast(value.as_ref()).await?.get(0, 0))
    }

    /// Round-trip to the coordinator. Local on the coordinator itself.
    pub async fn ping(&self, seq: u64) -> Result<u64, MeshError> {
        match &self.endpoint {
            Endpoint::Coordinator { .. } => Ok(seq),
            Endpoint::Worker { client } => Ok(client.ping(context::current(), seq).await?),
        }
    }

    /// Leave the mesh.
    ///
    /// A final barrier makes sure every rank has fetched everything it was
    /// sent; the coordinator then waits for all worker connections to close
    /// before tearing down its listener.
    pub async fn finish(self) -> Result<(), MeshError> {
        let barrier = DMat::zeros(0, 0);
        self.gather(&barrier).await?;
        if let Endpoint::Coordinator { table, .. } = &self.endpoint {
            table.until_unlinked().await;
            let (inbox, outbox) = table.pending();
            debug!(inbox, outbox, rounds = self.rounds(), "coordinator finished");
        }
        Ok(())
    }
}

async fn connect_with_retry(addr: &str) -> Result<TcpStream, MeshError> {
    let mut attempt = 0;
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt + 1 < CONNECT_ATTEMPTS => {
                attempt += 1;
                if attempt % 25 == 0 {
                    warn!(addr, attempt, "coordinator not reachable yet: {e}");
                }
                tokio::time::sleep(CONNECT_BACKOFF).await;
            }
            Err(e) => return Err(MeshError::Transport(format!("connect to {addr}: {e}"))),
        }
    }
}

/// A whole mesh living in one process, wired with tarpc channel transports.
///
/// Each member is meant to be moved into its own task.
pub struct Mesh {
    members: Vec<Communicator>,
}

impl Mesh {
    /// Build `size` communicators; member `i` has rank `i`.
    pub async fn local(size: usize) -> Result<Self, MeshError> {
        let coordinator = Topology::new(COORDINATOR, size)?;
        let table = Arc::new(RoundTable::new(size));
        let mut members = Vec::with_capacity(size);
        members.push(Communicator::hosting(coordinator, table.clone(), None));

        for rank in 1..size {
            let (client_transport, server_transport) = tarpc::transport::channel::unbounded();
            spawn_server(table.clone(), server_transport);
            let client =
                CollectiveServiceClient::new(client::Config::default(), client_transport).spawn();
            members.push(Communicator::attach(Topology::new(rank, size)?, client).await?);
        }

        Ok(Self { members })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn into_members(self) -> Vec<Communicator> {
        self.members
    }
}

impl IntoIterator for Mesh {
    type Item = Communicator;
    type IntoIter = std::vec::IntoIter<Communicator>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_rank_collectives_are_local() {
        let comm = Communicator::single();
        let m = DMat::column(&[1.0, 2.0]);
        assert_eq!(comm.all_reduce_sum(&m).await.unwrap(), m);
        assert_eq!(comm.broadcast_scalar(Some(4.0)).await.unwrap(), 4.0);
        assert_eq!(comm.gather(&m).await.unwrap().unwrap().len(), 1);
        assert_eq!(comm.rounds(), 4);
        comm.finish().await.unwrap();
    }

    #[tokio::test]
    async fn coordinator_must_supply_broadcast_value() {
        let comm = Communicator::single();
        assert!(matches!(comm.broadcast(None).await, Err(MeshError::NothingToBroadcast)));
    }
}
