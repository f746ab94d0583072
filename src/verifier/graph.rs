use crate::shared::dns;
use crate::shared::log;
use crate::verifier::conf::VerifierConf;
use crate::verifier::config::Config;
use crate::verifier::ecs::EquivalenceClass;
use crate::verifier::lookup::*;
use std::collections::{HashMap, HashSet, VecDeque};

pub type NodeIdx = usize;

/// The identity of a resolution state: which server is asked what, for
/// which (bundled) query types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub server: dns::Name,
    pub query: dns::Name,
    pub types: Vec<dns::RecordType>,
}

/// How an edge was produced: a referral keeps the query name and moves
/// to another server, a rewrite changes the query name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    Referral,
    Rewrite,
}

/// One resolved state of the interpretation graph.
#[derive(Debug, Clone)]
pub struct IGNode {
    pub key: NodeKey,
    pub tag: AnswerTag,
    pub records: Vec<dns::Record>,
    pub rewrite_to: Option<dns::Name>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IGEdge {
    pub from: NodeIdx,
    pub to: NodeIdx,
    pub kind: EdgeKind,
}

/// The interpretation graph of one equivalence class: every resolution
/// state reachable from the root servers, with referral and rewrite
/// edges between them. Cycles are legal; nodes are unique per key and
/// live in an arena indexed by [`NodeIdx`].
#[derive(Debug)]
pub struct InterpGraph {
    nodes: Vec<IGNode>,
    edges: Vec<IGEdge>,
    entries: Vec<NodeIdx>,
    successors: Vec<Vec<(NodeIdx, EdgeKind)>>,
}

impl InterpGraph {
    pub fn nodes(&self) -> &[IGNode] {
        &self.nodes
    }

    pub fn node(&self, idx: NodeIdx) -> &IGNode {
        &self.nodes[idx]
    }

    pub fn edges(&self) -> &[IGEdge] {
        &self.edges
    }

    pub fn entries(&self) -> &[NodeIdx] {
        &self.entries
    }

    pub fn successors(&self, idx: NodeIdx) -> &[(NodeIdx, EdgeKind)] {
        &self.successors[idx]
    }

    /// Reports if the node has no outgoing edge.
    pub fn is_sink(&self, idx: NodeIdx) -> bool {
        self.successors[idx].is_empty()
    }

    /// The indices of all sink nodes.
    pub fn sinks(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        (0..self.nodes.len()).filter(move |&idx| self.is_sink(idx))
    }
}

// One pending worklist state: where to resolve next and which edge led
// there.
struct Pending {
    server: dns::Name,
    query: dns::Name,
    types: Vec<dns::RecordType>,
    parent: Option<(NodeIdx, EdgeKind)>,
    depth: usize,
}

/// Build the interpretation graph of one equivalence class. The
/// worklist is FIFO and every state is memoized on its key, so cycles
/// produce back-edges instead of new subtrees. Path depth is bounded by
/// the fuel: deeper states terminate in a DepthExceeded node. A global
/// step bound caps the whole construction.
pub fn build_graph(config: &Config, ec: &EquivalenceClass, conf: &VerifierConf) -> InterpGraph {
    let mut builder = Builder {
        config,
        conf,
        nodes: vec![],
        edges: vec![],
        entries: vec![],
        edge_set: HashSet::new(),
        memo: HashMap::new(),
        worklist: VecDeque::new(),
    };

    let mut types = ec.types.clone();
    types.sort();
    types.dedup();
    for root in config.roots() {
        builder.worklist.push_back(Pending {
            server: root.clone(),
            query: ec.domain.clone(),
            types: types.clone(),
            parent: None,
            depth: 0,
        });
    }

    let mut steps = 0;
    while let Some(pending) = builder.worklist.pop_front() {
        steps += 1;
        if steps > conf.max_steps {
            log::warn!(
                "Interpretation graph of '{}' truncated after {} worklist steps",
                ec.domain,
                conf.max_steps
            );
            break;
        }
        builder.process(pending);
    }

    let mut successors = vec![vec![]; builder.nodes.len()];
    for edge in &builder.edges {
        successors[edge.from].push((edge.to, edge.kind));
    }
    InterpGraph {
        nodes: builder.nodes,
        edges: builder.edges,
        entries: builder.entries,
        successors,
    }
}

struct Builder<'a> {
    config: &'a Config,
    conf: &'a VerifierConf,
    nodes: Vec<IGNode>,
    edges: Vec<IGEdge>,
    entries: Vec<NodeIdx>,
    edge_set: HashSet<IGEdge>,
    memo: HashMap<NodeKey, Vec<NodeIdx>>,
    worklist: VecDeque<Pending>,
}

impl<'a> Builder<'a> {
    fn process(&mut self, pending: Pending) {
        let key = NodeKey {
            server: pending.server.clone(),
            query: pending.query.clone(),
            types: pending.types.clone(),
        };

        // A known state only contributes a new incoming edge.
        if let Some(known) = self.memo.get(&key).cloned() {
            for idx in known {
                self.attach(pending.parent, idx);
            }
            return;
        }

        if pending.depth > self.conf.max_depth {
            let idx = self.add_node(key.clone(), AnswerTag::DepthExceeded, vec![], None);
            self.memo.insert(key, vec![idx]);
            self.attach(pending.parent, idx);
            return;
        }

        let zone = match self.config.find_zone(&pending.server, &pending.query) {
            Some(zone) => zone,
            None => {
                let idx = self.add_node(key.clone(), AnswerTag::Refused, vec![], None);
                self.memo.insert(key, vec![idx]);
                self.attach(pending.parent, idx);
                return;
            }
        };

        let groups = lookup(self.config, zone, &pending.query, &pending.types);
        let mut created = vec![];
        for (group_types, outcome) in groups {
            let group_key = NodeKey {
                server: pending.server.clone(),
                query: pending.query.clone(),
                types: group_types.clone(),
            };
            // The split type set may already be a resolved state of its
            // own; attach to it instead of duplicating the node key.
            if group_key != key {
                if let Some(known) = self.memo.get(&group_key).cloned() {
                    for &idx in &known {
                        self.attach(pending.parent, idx);
                    }
                    created.extend(known);
                    continue;
                }
            }
            let tag = outcome.tag();
            let (records, rewrite_to) = match outcome {
                ServerOutcome::Ans(records) => (records, None),
                ServerOutcome::Ref(records) => (records, None),
                ServerOutcome::Nx(records) => (records, None),
                ServerOutcome::AnsQ { records, new_query } => (records, Some(new_query)),
                ServerOutcome::Refused => (vec![], None),
            };
            let idx = self.add_node(group_key.clone(), tag, records, rewrite_to);
            created.push(idx);
            // A later referral may land directly on a split type set:
            // register the group under its own key as well.
            if group_key != key {
                self.memo.insert(group_key, vec![idx]);
            }
            self.attach(pending.parent, idx);
            self.enqueue_successors(idx, &pending, group_types);
        }
        self.memo.insert(key, created);
    }

    // Queue the successor states implied by the freshly created node.
    fn enqueue_successors(&mut self, idx: NodeIdx, pending: &Pending, group_types: Vec<dns::RecordType>) {
        match self.nodes[idx].tag {
            AnswerTag::Ref => {
                let mut targets: Vec<dns::Name> = self.nodes[idx]
                    .records
                    .iter()
                    .filter(|r| r.rtype == dns::RecordType::NS)
                    .map(|r| r.name_data().clone())
                    .collect();
                targets.sort();
                targets.dedup();
                for target in targets {
                    self.worklist.push_back(Pending {
                        server: target,
                        query: pending.query.clone(),
                        types: group_types.clone(),
                        parent: Some((idx, EdgeKind::Referral)),
                        depth: pending.depth + 1,
                    });
                }
            }
            AnswerTag::AnsQ => {
                let new_query = self.nodes[idx].rewrite_to.clone().unwrap();
                // Locality: a server authoritative for the rewritten
                // name keeps the resolution, otherwise it restarts at
                // the root servers.
                let targets = if self.config.find_zone(&pending.server, &new_query).is_some() {
                    vec![pending.server.clone()]
                } else {
                    self.config.roots().to_vec()
                };
                for target in targets {
                    self.worklist.push_back(Pending {
                        server: target,
                        query: new_query.clone(),
                        types: group_types.clone(),
                        parent: Some((idx, EdgeKind::Rewrite)),
                        depth: pending.depth + 1,
                    });
                }
            }
            _ => {}
        }
    }

    fn add_node(
        &mut self,
        key: NodeKey,
        tag: AnswerTag,
        records: Vec<dns::Record>,
        rewrite_to: Option<dns::Name>,
    ) -> NodeIdx {
        let idx = self.nodes.len();
        self.nodes.push(IGNode { key, tag, records, rewrite_to });
        idx
    }

    fn attach(&mut self, parent: Option<(NodeIdx, EdgeKind)>, to: NodeIdx) {
        match parent {
            Some((from, kind)) => {
                let edge = IGEdge { from, to, kind };
                if self.edge_set.insert(edge) {
                    self.edges.push(edge);
                }
            }
            None => {
                if !self.entries.contains(&to) {
                    self.entries.push(to);
                }
            }
        }
    }
}
