use crate::shared::dns;
use crate::verifier::config::Config;
use std::collections::{BTreeMap, BTreeSet};

/// The label trie built over every record owner name of the
/// configuration. Nodes live in an arena and reference each other by
/// index, so the DNAME cross-edges can form cycles without ownership
/// trouble. Children are kept sorted by label: every traversal of the
/// trie is deterministic.
#[derive(Debug)]
pub struct LabelTrie {
    nodes: Vec<TrieNode>,
}

/// One node of the [`LabelTrie`]: a label, its children, whether some
/// record owns the path ending here, and the optional DNAME cross-edge.
#[derive(Debug)]
pub struct TrieNode {
    pub label: String,
    pub children: BTreeMap<String, usize>,
    pub is_record_owner: bool,
    pub dname_target: Option<usize>,
}

impl TrieNode {
    fn new(label: &str) -> Self {
        TrieNode {
            label: label.to_string(),
            children: BTreeMap::new(),
            is_record_owner: false,
            dname_target: None,
        }
    }
}

impl LabelTrie {
    /// Build the [`LabelTrie`] for a whole configuration: one insertion
    /// per record owner, plus the DNAME target names and cross-edges.
    /// When an owner holds several DNAME records the lexicographically
    /// smallest target is the one linked.
    pub fn build(config: &Config) -> Self {
        let mut trie = LabelTrie { nodes: vec![TrieNode::new("")] };

        let mut dnames: BTreeMap<dns::Name, BTreeSet<dns::Name>> = BTreeMap::new();
        for zone in config.zones() {
            for record in zone.records() {
                let node = trie.insert(&record.node);
                trie.nodes[node].is_record_owner = true;
                if record.rtype == dns::RecordType::DNAME {
                    dnames
                        .entry(record.node.clone())
                        .or_default()
                        .insert(record.name_data().clone());
                }
            }
        }

        for (owner, targets) in dnames {
            let target = targets.iter().next().unwrap();
            let target_idx = trie.insert(target);
            let owner_idx = trie.insert(&owner);
            trie.nodes[owner_idx].dname_target = Some(target_idx);
        }

        trie
    }

    /// The index of the root node.
    pub fn root(&self) -> usize {
        0
    }

    pub fn node(&self, idx: usize) -> &TrieNode {
        &self.nodes[idx]
    }

    /// The number of nodes in the trie.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    // Insert the label path of a (concrete) name, creating the missing
    // nodes, and return the index of the final node. Inserting the same
    // name twice leaves the trie unchanged.
    fn insert(&mut self, name: &dns::Name) -> usize {
        let mut current = 0;
        for label in name.labels() {
            let label = match label {
                dns::Label::Name(s) => s,
                // Symbolic labels never reach the trie: it indexes
                // record owners, which are concrete by construction.
                dns::Label::Alpha(_) => unreachable!("alpha label in record owner"),
            };
            let known = self.nodes[current].children.get(label).copied();
            current = match known {
                Some(child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(TrieNode::new(label));
                    self.nodes[current].children.insert(label.clone(), child);
                    child
                }
            };
        }
        current
    }
}
