//! The constraint graph: pending actions and the ordering edges between
//! them.
//!
//! Nodes are [`Action`]s held in a generational-index arena; edges are
//! adjacency lists of `(target, EdgeType)` stored on the source slot. An
//! edge X→Y means X must wait for Y, so an action is runnable exactly
//! when its out-degree is zero and its state is
//! [`Ready`](ActionState::Ready).
//!
//! Three rules derive edges when an action is inserted (all of them
//! point from the new action to pre-existing ones, which keeps the graph
//! acyclic by construction):
//!
//! 1. same-node — the new action waits for every action already pending
//!    at its node;
//! 2. causality — the new action waits for the publishing action that
//!    will produce its input;
//! 3. same-topic — an action that will publish topic T waits for every
//!    rx action already pending on T.
//!
//! Removal is explicit and driven solely by completion events; it strips
//! all incident edges, which is what releases dependents.

use std::fmt;

use crate::action::{Action, ActionState, EdgeType};
use crate::types::TopicName;

/// Stable handle to an action in the graph.
///
/// Generational: removing an action invalidates its id even if the slot
/// is later reused, so a stale handle can never alias a new action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ActionId {
    index: u32,
    generation: u32,
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}g{}", self.index, self.generation)
    }
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

struct Entry {
    action: Action,
    /// Outgoing ordering constraints: this action waits for each target.
    edges: Vec<(ActionId, EdgeType)>,
}

/// Directed graph of pending actions with ordering edges.
#[derive(Default)]
pub struct ConstraintGraph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl ConstraintGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `action`, deriving ordering edges against everything
    /// already pending.
    ///
    /// `publishes` lists the topics the action's callback will publish
    /// (the caller reads them off the node model); `parent` is the
    /// publishing action that produces this action's input, present for
    /// every rx action that is not a graph input. The parent must be
    /// live.
    pub fn insert(
        &mut self,
        action: Action,
        publishes: &[TopicName],
        parent: Option<ActionId>,
    ) -> ActionId {
        debug_assert!(parent.is_none_or(|p| self.contains(p)));

        let mut edges: Vec<(ActionId, EdgeType)> = Vec::new();

        for (other_id, other) in self.iter() {
            if other.node() == action.node() {
                edges.push((other_id, EdgeType::SameNode));
            }
        }

        if let Some(parent_id) = parent {
            edges.push((parent_id, EdgeType::Causality));
        }

        // Concurrent publishing on one topic would make receive order
        // nondeterministic, so a publisher waits for every pending rx
        // on each topic it will publish.
        for topic in publishes {
            for (other_id, other) in self.iter() {
                if other.is_rx_on(topic) {
                    edges.push((other_id, EdgeType::SameTopic));
                }
            }
        }

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(Entry { action, edges });
                ActionId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(Entry { action, edges }),
                });
                ActionId {
                    index,
                    generation: 0,
                }
            }
        };
        self.live += 1;
        tracing::trace!(action_id = %id, out_degree = self.out_degree(id), "inserted action");
        id
    }

    /// Remove an action and every edge incident on it, returning the
    /// action. Dependents whose last constraint this was become
    /// eligible to run.
    pub fn remove(&mut self, id: ActionId) -> Option<Action> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;

        for slot in &mut self.slots {
            if let Some(entry) = slot.entry.as_mut() {
                entry.edges.retain(|(target, _)| *target != id);
            }
        }
        Some(entry.action)
    }

    #[must_use]
    pub fn contains(&self, id: ActionId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.generation == id.generation && slot.entry.is_some())
    }

    #[must_use]
    pub fn get(&self, id: ActionId) -> Option<&Action> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref().map(|entry| &entry.action)
    }

    pub fn get_mut(&mut self, id: ActionId) -> Option<&mut Action> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut().map(|entry| &mut entry.action)
    }

    /// Number of outgoing (blocking) edges.
    #[must_use]
    pub fn out_degree(&self, id: ActionId) -> usize {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
            .map_or(0, |entry| entry.edges.len())
    }

    /// Whether the edge `from → to` of the given type exists.
    #[must_use]
    pub fn has_edge(&self, from: ActionId, to: ActionId, edge_type: EdgeType) -> bool {
        self.slots
            .get(from.index as usize)
            .filter(|slot| slot.generation == from.generation)
            .and_then(|slot| slot.entry.as_ref())
            .is_some_and(|entry| entry.edges.contains(&(to, edge_type)))
    }

    /// All live actions, in insertion (slot) order.
    pub fn iter(&self) -> impl Iterator<Item = (ActionId, &Action)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|entry| {
                (
                    ActionId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    &entry.action,
                )
            })
        })
    }

    /// Ids of actions eligible to run: out-degree zero and `Ready`.
    /// Deterministic slot order; the scheduler's pick order inherits it.
    #[must_use]
    pub fn runnable(&self) -> Vec<ActionId> {
        self.iter()
            .filter(|(id, action)| {
                action.state() == ActionState::Ready && self.out_degree(*id) == 0
            })
            .map(|(id, _)| id)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Whether any action is `Waiting` or `Running` — the busy test the
    /// admission gate uses before granting an offer immediately.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.iter().any(|(_, action)| {
            matches!(action.state(), ActionState::Waiting | ActionState::Running)
        })
    }

    /// Whether any `Waiting` or `Ready` rx action exists on `topic`.
    /// True means an earlier message on that topic is still in flight,
    /// so a new offer for it cannot be granted yet.
    #[must_use]
    pub fn has_pending_rx_on(&self, topic: &str) -> bool {
        self.iter().any(|(_, action)| {
            matches!(action.state(), ActionState::Waiting | ActionState::Ready)
                && action.is_rx_on(topic)
        })
    }

    /// Cycle check. Insertion only ever adds edges toward pre-existing
    /// actions, so this holds structurally; the property tests assert it
    /// anyway.
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        // Iterative DFS with tri-color marking over live slots.
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Grey,
            Black,
        }
        let mut marks = vec![Mark::White; self.slots.len()];
        for (start, _) in self.iter() {
            if marks[start.index as usize] != Mark::White {
                continue;
            }
            let mut stack = vec![(start, 0usize)];
            marks[start.index as usize] = Mark::Grey;
            while let Some((id, edge_pos)) = stack.pop() {
                let entry = self.slots[id.index as usize].entry.as_ref();
                let edges = entry.map_or(&[][..], |e| e.edges.as_slice());
                if edge_pos < edges.len() {
                    stack.push((id, edge_pos + 1));
                    let (target, _) = edges[edge_pos];
                    if !self.contains(target) {
                        continue;
                    }
                    match marks[target.index as usize] {
                        Mark::Grey => return false,
                        Mark::White => {
                            marks[target.index as usize] = Mark::Grey;
                            stack.push((target, 0));
                        }
                        Mark::Black => {}
                    }
                } else {
                    marks[id.index as usize] = Mark::Black;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{RxAction, TimerAction};
    use crate::types::LogicalTime;

    fn rx(node: &str, topic: &str) -> Action {
        Action::Rx(RxAction::waiting(node, topic, LogicalTime::ZERO))
    }

    #[test]
    fn same_node_edges_serialize_one_node() {
        let mut graph = ConstraintGraph::new();
        let first = graph.insert(rx("n", "/a"), &[], None);
        let second = graph.insert(rx("n", "/b"), &[], None);
        let other = graph.insert(rx("m", "/a"), &[], None);

        assert!(graph.has_edge(second, first, EdgeType::SameNode));
        assert!(!graph.has_edge(first, second, EdgeType::SameNode));
        assert_eq!(graph.out_degree(other), 0);
    }

    #[test]
    fn same_topic_edges_block_concurrent_publishers() {
        let mut graph = ConstraintGraph::new();
        let consumer = graph.insert(rx("s", "/t"), &[], None);
        let publisher = graph.insert(rx("p", "/in"), &["/t".to_string()], None);

        assert!(graph.has_edge(publisher, consumer, EdgeType::SameTopic));
        assert_eq!(graph.out_degree(publisher), 1);
    }

    #[test]
    fn causality_edge_points_at_parent() {
        let mut graph = ConstraintGraph::new();
        let parent = graph.insert(rx("p", "/in"), &["/t".to_string()], None);
        let child = graph.insert(rx("s", "/t"), &[], Some(parent));

        assert!(graph.has_edge(child, parent, EdgeType::Causality));
    }

    #[test]
    fn removal_strips_incident_edges_and_invalidates_id() {
        let mut graph = ConstraintGraph::new();
        let parent = graph.insert(rx("p", "/in"), &["/t".to_string()], None);
        let child = graph.insert(rx("s", "/t"), &[], Some(parent));
        assert_eq!(graph.out_degree(child), 1);

        assert!(graph.remove(parent).is_some());
        assert_eq!(graph.out_degree(child), 0);
        assert!(!graph.contains(parent));
        assert!(graph.remove(parent).is_none());

        // Reusing the freed slot mints a new generation.
        let reused = graph.insert(rx("q", "/u"), &[], None);
        assert!(graph.contains(reused));
        assert!(graph.get(parent).is_none());
    }

    #[test]
    fn runnable_requires_ready_and_no_constraints() {
        let mut graph = ConstraintGraph::new();
        let waiting = graph.insert(rx("n", "/a"), &[], None);
        let timer = graph.insert(
            Action::Timer(TimerAction::ready("m", 100, LogicalTime::ZERO)),
            &[],
            None,
        );
        let blocked_timer = graph.insert(
            Action::Timer(TimerAction::ready("m", 200, LogicalTime::ZERO)),
            &[],
            None,
        );

        // Only the first timer: the rx is still waiting, the second
        // timer has a same-node edge to the first.
        assert_eq!(graph.runnable(), vec![timer]);

        graph.get_mut(waiting).unwrap().set_state(ActionState::Ready);
        assert_eq!(graph.runnable(), vec![waiting, timer]);
        assert_eq!(graph.out_degree(blocked_timer), 1);
    }

    #[test]
    fn busy_and_pending_queries_track_states() {
        let mut graph = ConstraintGraph::new();
        assert!(!graph.is_busy());

        let id = graph.insert(rx("n", "/a"), &[], None);
        assert!(graph.is_busy());
        assert!(graph.has_pending_rx_on("/a"));
        assert!(!graph.has_pending_rx_on("/b"));

        graph.get_mut(id).unwrap().set_state(ActionState::Ready);
        assert!(!graph.is_busy());
        assert!(graph.has_pending_rx_on("/a"));

        graph.get_mut(id).unwrap().set_state(ActionState::Running);
        assert!(graph.is_busy());
        assert!(!graph.has_pending_rx_on("/a"));

        graph.remove(id);
        assert!(graph.is_empty());
        assert!(graph.is_acyclic());
    }
}
