//! Per-listener construction and maintenance of the processing graph.
//!
//! Graph mutation is expensive, so the builder is strictly dirty-tracked:
//! a listener's subgraph is touched only on first sight, on an ILD profile
//! reference change (full rebuild), or on removal (full teardown). The
//! virtual-to-real wiring of ILD outputs is redone for all listeners
//! whenever any listener was added or rebuilt.

use super::{ConnectionId, NodeId, NodeKind, NodeUpdate, PortId, SignalGraph};
use crate::listener::{IldProfile, Listener};
use std::collections::HashMap;
use std::sync::Arc;

/// Wiring state of one ILD output binding. A `Pending` binding is logically
/// recorded but not physically connected yet; the re-wiring pass turns it
/// into `Bound` once a real fan-out outlet is claimed for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IldBinding {
    Pending,
    Bound {
        outlet: PortId,
        connection: ConnectionId,
    },
}

#[derive(Debug)]
pub(crate) struct IldConnection {
    pub(crate) virtual_channel: u32,
    pub(crate) target_node: NodeId,
    pub(crate) target_port: PortId,
    pub(crate) attenuation: f32,
    pub(crate) binding: IldBinding,
}

/// Everything the builder allocated in the graph for one listener.
#[derive(Debug)]
pub struct GraphState {
    pub(crate) profile: Arc<IldProfile>,
    pub(crate) mixer_node: NodeId,
    pub(crate) mix_inlet: PortId,
    pub(crate) output_connection: ConnectionId,
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) connections: Vec<ConnectionId>,
    pub(crate) ild_connections: Vec<IldConnection>,
}

pub struct ListenerGraphBuilder {
    final_mix: NodeId,
    fanout: NodeId,
    /// Final-mix inlets released by removed listeners, reused before the
    /// node grows new ones.
    free_mix_inlets: Vec<PortId>,
    /// Outlets allocated on the fan-out node so far; grows, never shrinks.
    fanout_outlets: Vec<PortId>,
    states: HashMap<u64, GraphState>,
    dirty: bool,
}

impl ListenerGraphBuilder {
    pub fn new(graph: &mut dyn SignalGraph) -> Self {
        let final_mix = graph.create_node(NodeKind::FinalMix);
        let fanout = graph.create_node(NodeKind::IldFanout);
        Self {
            final_mix,
            fanout,
            free_mix_inlets: Vec::new(),
            fanout_outlets: Vec::new(),
            states: HashMap::new(),
            dirty: false,
        }
    }

    pub fn final_mix(&self) -> NodeId {
        self.final_mix
    }

    pub fn fanout(&self) -> NodeId {
        self.fanout
    }

    pub fn state(&self, listener_id: u64) -> Option<&GraphState> {
        self.states.get(&listener_id)
    }

    /// Reconcile the graph with this tick's listener set. Issues zero graph
    /// operations when nothing was added, removed or re-profiled.
    pub fn sync_listeners(&mut self, graph: &mut dyn SignalGraph, listeners: &[Listener]) {
        let removed: Vec<u64> = self
            .states
            .keys()
            .filter(|id| !listeners.iter().any(|l| l.id == **id))
            .copied()
            .collect();
        for id in removed {
            if let Some(state) = self.states.remove(&id) {
                log::debug!("listener {} removed, tearing down graph state", id);
                self.teardown(graph, state);
            }
        }

        for listener in listeners {
            let rebuild = match self.states.get(&listener.id) {
                None => true,
                Some(state) => !Arc::ptr_eq(&state.profile, &listener.profile),
            };
            if !rebuild {
                continue;
            }
            if let Some(old) = self.states.remove(&listener.id) {
                log::debug!("listener {} changed ILD profile, rebuilding", listener.id);
                self.teardown(graph, old);
            }
            let state = self.build_state(graph, listener);
            self.states.insert(listener.id, state);
            self.dirty = true;
        }

        if self.dirty {
            self.rewire(graph, listeners);
            self.dirty = false;
        }
    }

    fn build_state(&mut self, graph: &mut dyn SignalGraph, listener: &Listener) -> GraphState {
        let profile = listener.profile.clone();
        let mixer_node = graph.create_node(NodeKind::ChannelMixer);
        let mixer_outlet = graph.add_outlet(mixer_node);
        let mix_inlet = self
            .free_mix_inlets
            .pop()
            .unwrap_or_else(|| graph.add_inlet(self.final_mix));
        let output_connection = graph.connect(mixer_node, mixer_outlet, self.final_mix, mix_inlet);

        let mut nodes = Vec::new();
        let mut connections = Vec::new();
        let mut ild_connections = Vec::new();
        let mut left_inlets = 0u32;
        let mut right_inlets = 0u32;

        for (virtual_channel, channel) in profile.ordered_channels() {
            let net_filter = channel.net_filter_volume();
            if net_filter != 0.0 {
                let inlet = graph.add_inlet(mixer_node);
                if channel.is_right {
                    right_inlets += 1;
                } else {
                    left_inlets += 1;
                }

                // Chain filters back-to-front so the last-listed filter sits
                // nearest the mixer; the filter volume scales only the final
                // link into the mixer.
                let mut next_node = mixer_node;
                let mut next_port = inlet;
                let mut pending_gain = net_filter;
                for params in channel.filters.iter().rev() {
                    let node = graph.create_node(NodeKind::Filter(params.clone()));
                    let outlet = graph.add_outlet(node);
                    let connection = graph.connect(node, outlet, next_node, next_port);
                    if pending_gain != 1.0 {
                        graph.set_attenuation(connection, pending_gain);
                    }
                    pending_gain = 1.0;
                    nodes.push(node);
                    connections.push(connection);
                    next_port = graph.add_inlet(node);
                    next_node = node;
                }
                ild_connections.push(IldConnection {
                    virtual_channel,
                    target_node: next_node,
                    target_port: next_port,
                    attenuation: pending_gain,
                    binding: IldBinding::Pending,
                });
            }

            let net_passthrough = channel.net_passthrough_volume();
            if net_passthrough != 0.0 {
                // A passthrough-only channel gets exactly one inlet; a
                // second one exists only when a filter path was also added.
                let inlet = graph.add_inlet(mixer_node);
                if channel.is_right {
                    right_inlets += 1;
                } else {
                    left_inlets += 1;
                }
                ild_connections.push(IldConnection {
                    virtual_channel,
                    target_node: mixer_node,
                    target_port: inlet,
                    attenuation: net_passthrough,
                    binding: IldBinding::Pending,
                });
            }
        }

        graph.update_node(
            mixer_node,
            NodeUpdate::ChannelSplit {
                left_inlets,
                right_inlets,
            },
        );

        GraphState {
            profile,
            mixer_node,
            mix_inlet,
            output_connection,
            nodes,
            connections,
            ild_connections,
        }
    }

    /// Re-map every listener's virtual ILD channels onto real fan-out
    /// outlets. Previously wired connections are broken and re-encoded as
    /// pending first, then each unique virtual channel per listener claims
    /// one outlet, growing the fan-out node as needed.
    fn rewire(&mut self, graph: &mut dyn SignalGraph, listeners: &[Listener]) {
        for state in self.states.values_mut() {
            for conn in &mut state.ild_connections {
                if let IldBinding::Bound { connection, .. } = conn.binding {
                    graph.disconnect(connection);
                    conn.binding = IldBinding::Pending;
                }
            }
        }

        let mut claimed = 0usize;
        for listener in listeners {
            let Some(state) = self.states.get_mut(&listener.id) else {
                continue;
            };
            let mut mapping: HashMap<u32, PortId> = HashMap::new();
            for conn in &mut state.ild_connections {
                let outlet = match mapping.get(&conn.virtual_channel) {
                    Some(&port) => port,
                    None => {
                        if claimed == self.fanout_outlets.len() {
                            let port = graph.add_outlet(self.fanout);
                            self.fanout_outlets.push(port);
                        }
                        let port = self.fanout_outlets[claimed];
                        claimed += 1;
                        mapping.insert(conn.virtual_channel, port);
                        port
                    }
                };
                let connection = graph.connect(self.fanout, outlet, conn.target_node, conn.target_port);
                if conn.attenuation != 1.0 {
                    graph.set_attenuation(connection, conn.attenuation);
                }
                conn.binding = IldBinding::Bound { outlet, connection };
            }
        }
    }

    fn teardown(&mut self, graph: &mut dyn SignalGraph, state: GraphState) {
        graph.disconnect(state.output_connection);
        self.free_mix_inlets.push(state.mix_inlet);
        for conn in &state.ild_connections {
            if let IldBinding::Bound { connection, .. } = conn.binding {
                graph.disconnect(connection);
            }
        }
        for connection in &state.connections {
            graph.disconnect(*connection);
        }
        for node in &state.nodes {
            graph.release_node(*node);
        }
        graph.release_node(state.mixer_node);
    }
}
