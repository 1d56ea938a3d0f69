//! Shared fixtures for the integration suites: a modeled peer speaking the
//! batch wire format and simple recording/failing handlers.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use batchwire::{
    Disposition, HandlerId, PacketContext, PacketHandler, PacketRegistry,
    compress::{BatchCompressor, BatchDecompressor},
    frame::{FrameHeader, HEADER_SIZE},
    packet::Packet,
    wire::{Wire, WireReader, WireWriter},
};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Placeholder peer address for in-memory transports.
pub fn peer_addr() -> std::net::SocketAddr { "127.0.0.1:19132".parse().unwrap() }

/// Route connection logs to the test harness; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A test double for the remote endpoint, carrying its own persistent
/// per-direction compression streams.
pub struct ModeledPeer {
    compressor: BatchCompressor,
    decompressor: BatchDecompressor,
}

impl ModeledPeer {
    pub fn new() -> Self {
        Self {
            compressor: BatchCompressor::new(7),
            decompressor: BatchDecompressor::new(),
        }
    }

    /// Frame, compress, and send `packets` as one batch.
    pub async fn write_batch(
        &mut self,
        io: &mut (impl AsyncWrite + Unpin),
        packets: Vec<Box<dyn Packet>>,
    ) {
        let mut decoded = BytesMut::new();
        let count = packets.len() as u64;
        for mut packet in packets {
            let mut writer = WireWriter::new(&mut decoded);
            let mut id = packet.id();
            writer.u32(&mut id).unwrap();
            packet.marshal(&mut writer).unwrap();
        }

        let mut compressed = Vec::new();
        self.compressor.compress(&decoded, &mut compressed).unwrap();
        let header = FrameHeader::new(u32::try_from(compressed.len()).unwrap(), count).encode();
        io.write_all(&header).await.unwrap();
        io.write_all(&compressed).await.unwrap();
        io.flush().await.unwrap();
    }

    /// Receive one batch and decode every packet in it.
    pub async fn read_batch(
        &mut self,
        io: &mut (impl AsyncRead + Unpin),
        registry: &PacketRegistry,
    ) -> Vec<Box<dyn Packet>> {
        let mut header = [0u8; HEADER_SIZE];
        io.read_exact(&mut header).await.unwrap();
        let header = FrameHeader::decode(&header, usize::MAX).unwrap();

        let mut compressed = vec![0u8; header.length as usize];
        io.read_exact(&mut compressed).await.unwrap();
        let mut decoded = Vec::new();
        self.decompressor
            .decompress(&compressed, &mut decoded, 16 * 1024 * 1024)
            .unwrap();

        let mut reader = WireReader::new(&decoded);
        let mut packets = Vec::new();
        for _ in 0..header.count {
            let mut id = 0u32;
            reader.u32(&mut id).unwrap();
            let mut packet = registry.find(id).expect("peer knows the packet type");
            packet.marshal(&mut reader).unwrap();
            packets.push(packet);
        }
        assert_eq!(reader.remaining(), 0, "batch had trailing bytes");
        packets
    }
}

/// Handler recording the debug form of every packet it receives.
pub struct RecordingHandler {
    pub seen: Arc<Mutex<Vec<String>>>,
    pub closes: Arc<AtomicUsize>,
}

impl RecordingHandler {
    pub fn new() -> (Self, Arc<Mutex<Vec<String>>>, Arc<AtomicUsize>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let closes = Arc::new(AtomicUsize::new(0));
        (
            Self {
                seen: Arc::clone(&seen),
                closes: Arc::clone(&closes),
            },
            seen,
            closes,
        )
    }
}

#[async_trait]
impl PacketHandler for RecordingHandler {
    fn set_id(&mut self, _id: HandlerId) {}

    async fn receive(&self, ctx: &mut PacketContext) -> Disposition {
        let rendered = format!("{:?}", ctx.packet().unwrap());
        self.seen.lock().unwrap().push(rendered);
        Disposition::Continue
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handler that records a context error for every packet.
pub struct FailingHandler(pub &'static str);

#[async_trait]
impl PacketHandler for FailingHandler {
    fn set_id(&mut self, _id: HandlerId) {}

    async fn receive(&self, ctx: &mut PacketContext) -> Disposition {
        let _ = ctx.set_error(self.0);
        Disposition::Continue
    }

    async fn close(&self) {}
}

/// Render a packet the way [`RecordingHandler`] does, for comparisons.
pub fn rendered(packet: &dyn Packet) -> String { format!("{packet:?}") }

/// Poll `condition` until it holds or two seconds elapse.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within two seconds");
}
