//! Channels route I/O packets to the devices attached to them.
//!
//! A channel serves a single node type and holds no locks of its
//! own; each device serializes its own operations.
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use tracing::{event, Level};

use base::prelude::*;

use super::device::Device;
use super::geometry::{PackGeometry, WORDS_PER_TRACK};
use super::packet::{IoPacket, IoStatus, NodeId, NodeType};
use super::types::{BlockId, TrackId};

pub struct Channel {
    node_type: NodeType,
    devices: BTreeMap<NodeId, Arc<dyn Device>>,
}

impl Debug for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Channel")
            .field("node_type", &self.node_type)
            .field(
                "devices",
                &self
                    .devices
                    .iter()
                    .map(|(id, dev)| (*id, dev.name().to_string()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Channel {
    pub fn new(node_type: NodeType) -> Channel {
        Channel {
            node_type,
            devices: BTreeMap::new(),
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Attaches a device.  Devices of the wrong type are rejected.
    pub fn attach(&mut self, node_id: NodeId, device: Arc<dyn Device>) -> Result<(), IoStatus> {
        if device.node_type() != self.node_type {
            return Err(IoStatus::InvalidNodeType);
        }
        event!(
            Level::DEBUG,
            "attaching {} as {node_id} on the {} channel",
            device.name(),
            self.node_type
        );
        self.devices.insert(node_id, device);
        Ok(())
    }

    pub fn device(&self, node_id: NodeId) -> Option<&Arc<dyn Device>> {
        self.devices.get(&node_id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.devices.keys().copied()
    }

    /// Hands the packet to its device.  The packet's status says how
    /// it went.
    pub fn route(&self, packet: &mut IoPacket) {
        if packet.node_type != self.node_type {
            packet.status = IoStatus::InvalidNodeType;
        } else {
            match self.devices.get(&packet.node_id) {
                Some(device) => device.start_io(packet),
                None => packet.status = IoStatus::DeviceDoesNotExist,
            }
        }
        event!(Level::TRACE, "routed {packet}");
    }

    pub fn read_block(
        &self,
        node_id: NodeId,
        geometry: &PackGeometry,
        block_id: BlockId,
    ) -> Result<Vec<Word36>, IoStatus> {
        let mut packet = IoPacket::read(node_id, block_id, geometry.words_per_block() as usize);
        self.route(&mut packet);
        packet.check()?;
        packet.into_buffer().ok_or(IoStatus::InternalError)
    }

    pub fn write_block(
        &self,
        node_id: NodeId,
        block_id: BlockId,
        buffer: Vec<Word36>,
    ) -> Result<(), IoStatus> {
        let mut packet = IoPacket::write(node_id, block_id, buffer);
        self.route(&mut packet);
        packet.check()
    }

    /// Reads every block of a device-relative track.
    pub fn read_track(
        &self,
        node_id: NodeId,
        geometry: &PackGeometry,
        track_id: TrackId,
    ) -> Result<Vec<Word36>, IoStatus> {
        let first = geometry.first_block_of_track(track_id);
        let mut words = Vec::new();
        for block_id in first..first + geometry.blocks_per_track() {
            words.extend(self.read_block(node_id, geometry, block_id)?);
        }
        Ok(words)
    }

    /// Writes a whole device-relative track, one block at a time.
    /// `words` must hold exactly one track.
    pub fn write_track(
        &self,
        node_id: NodeId,
        geometry: &PackGeometry,
        track_id: TrackId,
        words: &[Word36],
    ) -> Result<(), IoStatus> {
        if words.len() as u64 != WORDS_PER_TRACK {
            return Err(IoStatus::InvalidBufferSize);
        }
        let first = geometry.first_block_of_track(track_id);
        for (block_id, block) in
            (first..).zip(words.chunks(geometry.words_per_block() as usize))
        {
            self.write_block(node_id, block_id, block.to_vec())?;
        }
        Ok(())
    }

    pub fn read_label(&self, node_id: NodeId) -> Result<Vec<Word36>, IoStatus> {
        let mut packet = IoPacket::read_label(node_id);
        self.route(&mut packet);
        packet.check()?;
        packet.into_buffer().ok_or(IoStatus::InternalError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DiskDevice;

    struct TapeStub;

    impl Device for TapeStub {
        fn node_type(&self) -> NodeType {
            NodeType::Tape
        }

        fn name(&self) -> &str {
            "TAPE0"
        }

        fn start_io(&self, packet: &mut IoPacket) {
            packet.status = IoStatus::Complete;
        }
    }

    #[test]
    fn test_unknown_node() {
        let mut channel = Channel::new(NodeType::Disk);
        channel
            .attach(NodeId(1), Arc::new(DiskDevice::new("DISK1", false)))
            .expect("disk attaches to a disk channel");
        let mut packet = IoPacket::reset(NodeId(2));
        channel.route(&mut packet);
        assert_eq!(packet.status, IoStatus::DeviceDoesNotExist);

        let mut packet = IoPacket::reset(NodeId(1));
        channel.route(&mut packet);
        assert_eq!(packet.status, IoStatus::Complete);
        assert_eq!(channel.node_ids().collect::<Vec<_>>(), vec![NodeId(1)]);
    }

    #[test]
    fn test_wrong_node_type() {
        let mut channel = Channel::new(NodeType::Disk);
        assert_eq!(
            channel.attach(NodeId(0), Arc::new(TapeStub)),
            Err(IoStatus::InvalidNodeType)
        );
        let mut packet = IoPacket::reset(NodeId(0));
        packet.node_type = NodeType::Tape;
        channel.route(&mut packet);
        assert_eq!(packet.status, IoStatus::InvalidNodeType);
    }
}
