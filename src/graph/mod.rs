//! The signal-graph collaborator interface.
//!
//! BloomSonic does not execute a processing graph itself; it issues node,
//! port and connection operations against an opaque backend supplied by the
//! host. The engine only specifies *which* operations are issued and in what
//! order. [`builder`] contains the per-listener graph construction logic.

mod builder;

pub use builder::{GraphState, ListenerGraphBuilder};

use crate::listener::FilterParams;
use crate::readback::ReadbackDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// Node types the engine asks the backend to create.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Per-listener summing node; inlets are split into left and right
    /// groups via [`NodeUpdate::ChannelSplit`].
    ChannelMixer,
    /// One stage of an ILD filter chain.
    Filter(FilterParams),
    /// The global final-mix node every listener feeds.
    FinalMix,
    /// The shared fan-out node whose outlets carry per-listener ILD
    /// channels.
    IldFanout,
    /// The audio-thread-side node that reads the packed output buffers.
    BufferReader,
}

/// Parameter pushes into backend nodes.
#[derive(Debug, Clone)]
pub enum NodeUpdate {
    /// How many of a channel mixer's inlets belong to the left vs. right
    /// group, for its internal summation.
    ChannelSplit { left_inlets: u32, right_inlets: u32 },
    /// The per-tick PCM read-back descriptor for the buffer-reader node.
    Readback(ReadbackDescriptor),
}

/// Graph operations issued by the engine, in submission order. The backend
/// is not reentrant: all mutation for a tick is submitted from one thread
/// before any rendering happens.
pub trait SignalGraph {
    fn create_node(&mut self, kind: NodeKind) -> NodeId;
    fn add_inlet(&mut self, node: NodeId) -> PortId;
    fn add_outlet(&mut self, node: NodeId) -> PortId;
    fn connect(
        &mut self,
        from_node: NodeId,
        from_port: PortId,
        to_node: NodeId,
        to_port: PortId,
    ) -> ConnectionId;
    fn disconnect(&mut self, connection: ConnectionId);
    fn set_attenuation(&mut self, connection: ConnectionId, gain: f32);
    fn update_node(&mut self, node: NodeId, update: NodeUpdate);
    fn release_node(&mut self, node: NodeId);
}

/// A backend that accepts every operation and does nothing. Useful for
/// headless hosts that only consume the packed output buffers.
#[derive(Debug, Default)]
pub struct NullGraph {
    next_node: u64,
    next_port: u32,
    next_connection: u64,
}

impl NullGraph {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalGraph for NullGraph {
    fn create_node(&mut self, _kind: NodeKind) -> NodeId {
        self.next_node += 1;
        NodeId(self.next_node)
    }

    fn add_inlet(&mut self, _node: NodeId) -> PortId {
        self.next_port += 1;
        PortId(self.next_port)
    }

    fn add_outlet(&mut self, _node: NodeId) -> PortId {
        self.next_port += 1;
        PortId(self.next_port)
    }

    fn connect(
        &mut self,
        _from_node: NodeId,
        _from_port: PortId,
        _to_node: NodeId,
        _to_port: PortId,
    ) -> ConnectionId {
        self.next_connection += 1;
        ConnectionId(self.next_connection)
    }

    fn disconnect(&mut self, _connection: ConnectionId) {}

    fn set_attenuation(&mut self, _connection: ConnectionId, _gain: f32) {}

    fn update_node(&mut self, _node: NodeId, _update: NodeUpdate) {}

    fn release_node(&mut self, _node: NodeId) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Every operation a backend can receive, recorded verbatim.
    #[derive(Debug, Clone, PartialEq)]
    pub enum GraphOp {
        CreateNode(NodeId, NodeKind),
        AddInlet(NodeId, PortId),
        AddOutlet(NodeId, PortId),
        Connect(ConnectionId, NodeId, PortId, NodeId, PortId),
        Disconnect(ConnectionId),
        SetAttenuation(ConnectionId, f32),
        UpdateNode(NodeId, String),
        ReleaseNode(NodeId),
    }

    /// Backend that records the operation stream for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingGraph {
        pub ops: Vec<GraphOp>,
        next_node: u64,
        next_port: u32,
        next_connection: u64,
    }

    impl RecordingGraph {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn op_count(&self) -> usize {
            self.ops.len()
        }

        pub fn released_nodes(&self) -> Vec<NodeId> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    GraphOp::ReleaseNode(n) => Some(*n),
                    _ => None,
                })
                .collect()
        }
    }

    impl SignalGraph for RecordingGraph {
        fn create_node(&mut self, kind: NodeKind) -> NodeId {
            self.next_node += 1;
            let id = NodeId(self.next_node);
            self.ops.push(GraphOp::CreateNode(id, kind));
            id
        }

        fn add_inlet(&mut self, node: NodeId) -> PortId {
            self.next_port += 1;
            let id = PortId(self.next_port);
            self.ops.push(GraphOp::AddInlet(node, id));
            id
        }

        fn add_outlet(&mut self, node: NodeId) -> PortId {
            self.next_port += 1;
            let id = PortId(self.next_port);
            self.ops.push(GraphOp::AddOutlet(node, id));
            id
        }

        fn connect(
            &mut self,
            from_node: NodeId,
            from_port: PortId,
            to_node: NodeId,
            to_port: PortId,
        ) -> ConnectionId {
            self.next_connection += 1;
            let id = ConnectionId(self.next_connection);
            self.ops
                .push(GraphOp::Connect(id, from_node, from_port, to_node, to_port));
            id
        }

        fn disconnect(&mut self, connection: ConnectionId) {
            self.ops.push(GraphOp::Disconnect(connection));
        }

        fn set_attenuation(&mut self, connection: ConnectionId, gain: f32) {
            self.ops.push(GraphOp::SetAttenuation(connection, gain));
        }

        fn update_node(&mut self, node: NodeId, update: NodeUpdate) {
            self.ops
                .push(GraphOp::UpdateNode(node, format!("{:?}", update)));
        }

        fn release_node(&mut self, node: NodeId) {
            self.ops.push(GraphOp::ReleaseNode(node));
        }
    }
}
