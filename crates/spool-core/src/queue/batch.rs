use crate::domain::{BatchId, DataPacket, QueuedRecord, Sequence};

/// An ordered group of packets selected for one transmission attempt.
///
/// `sequences[i]` is the store record that `packets[i]` came from.
#[derive(Debug, Clone)]
pub struct Batch {
    id: BatchId,
    sequences: Vec<Sequence>,
    packets: Vec<DataPacket>,
    byte_count: u64,
}

impl Batch {
    /// Build from records already in transmission order.
    pub fn from_records(id: BatchId, records: Vec<QueuedRecord>) -> Self {
        let mut sequences = Vec::with_capacity(records.len());
        let mut packets = Vec::with_capacity(records.len());
        let mut byte_count = 0;
        for record in records {
            sequences.push(record.sequence);
            byte_count += record.size_bytes;
            packets.push(record.packet);
        }
        Self {
            id,
            sequences,
            packets,
            byte_count,
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn packets(&self) -> &[DataPacket] {
        &self.packets
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }
}
