//! Transport layer: the `CollectiveService` RPC interface and its framing.
//!
//! The coordinator serves `CollectiveService`; each worker holds one client.
//! In-process meshes use tarpc's channel transport, multi-process meshes run
//! the same service over TCP with length-delimited JSON frames.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tarpc::context;
use tarpc::server::{BaseChannel, Channel};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::hub::RoundTable;
use crate::protocol::{Handshake, WireMatrix, PROTOCOL_VERSION};

/// Frame limit for TCP transports. A gathered `d × k` block is the largest
/// message and the JSON encoding of a `u64` is at most 20 bytes.
pub const MAX_FRAME_LENGTH: usize = 1 << 30;

/// Collectives block until every rank arrives, which can take as long as the
/// slowest rank's local work. The deadline only has to outlast that.
const RENDEZVOUS_DEADLINE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// RPC service hosted by the coordinator.
#[tarpc::service]
pub trait CollectiveService {
    /// Join the mesh as `rank`. Returns the coordinator's protocol version
    /// and mesh size for the worker to check.
    async fn handshake(rank: u32) -> Result<Handshake, String>;

    /// Deposit this rank's block for a gather round.
    async fn contribute(round: u64, rank: u32, block: WireMatrix) -> Result<(), String>;

    /// Wait for and return the value broadcast in `round`.
    async fn fetch(round: u64) -> WireMatrix;

    /// Health check ping. Returns the same sequence number.
    async fn ping(seq: u64) -> u64;
}

/// RPC context for calls that may wait on a rendezvous.
pub fn rendezvous_context() -> context::Context {
    let mut ctx = context::current();
    ctx.deadline = Instant::now() + RENDEZVOUS_DEADLINE;
    ctx
}

/// Create a tarpc serde transport over any byte stream.
///
/// Uses length-delimited framing + JSON codec for tarpc message exchange.
pub fn json_transport<S, Item, SinkItem>(
    stream: S,
) -> tarpc::serde_transport::Transport<S, Item, SinkItem, tokio_serde::formats::Json<Item, SinkItem>>
where
    S: AsyncRead + AsyncWrite,
    Item: for<'de> serde::Deserialize<'de>,
    SinkItem: serde::Serialize,
{
    tarpc::serde_transport::new(
        tokio_util::codec::length_delimited::Builder::new()
            .max_frame_length(MAX_FRAME_LENGTH)
            .new_framed(stream),
        tokio_serde::formats::Json::default(),
    )
}

/// tarpc service implementation backed by the coordinator's table.
#[derive(Clone)]
pub(crate) struct RoundHandler {
    table: Arc<RoundTable>,
}

impl CollectiveService for RoundHandler {
    async fn handshake(self, _ctx: context::Context, rank: u32) -> Result<Handshake, String> {
        let size = self.table.size();
        if rank == 0 || rank as usize >= size {
            return Err(format!("rank {rank} cannot join as a worker of a mesh of {size}"));
        }
        debug!(rank, "worker joined");
        Ok(Handshake { version: PROTOCOL_VERSION, size: size as u32 })
    }

    async fn contribute(
        self,
        _ctx: context::Context,
        round: u64,
        rank: u32,
        block: WireMatrix,
    ) -> Result<(), String> {
        let block = block.into_dmat().map_err(|e| e.to_string())?;
        self.table
            .deposit(round, rank as usize, block)
            .map_err(|e| e.to_string())
    }

    async fn fetch(self, _ctx: context::Context, round: u64) -> WireMatrix {
        WireMatrix::from_dmat(&self.table.take(round).await)
    }

    async fn ping(self, _ctx: context::Context, seq: u64) -> u64 {
        seq
    }
}

/// Serve one worker connection until it closes.
///
/// The table counts the connection as a link while it is served.
pub(crate) fn spawn_server<T>(table: Arc<RoundTable>, transport: T)
where
    T: tarpc::Transport<
            tarpc::Response<CollectiveServiceResponse>,
            tarpc::ClientMessage<CollectiveServiceRequest>,
        > + Send
        + 'static,
{
    let server = BaseChannel::with_defaults(transport);
    let handler = RoundHandler { table: table.clone() };
    table.link();

    tokio::spawn(async move {
        server
            .execute(handler.serve())
            .for_each(|response| async move {
                tokio::spawn(response);
            })
            .await;
        table.unlink();
        debug!("worker connection closed");
    });
}
