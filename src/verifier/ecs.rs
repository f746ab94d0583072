use crate::shared::dns;
use crate::verifier::conf::VerifierConf;
use crate::verifier::trie::LabelTrie;
use std::collections::HashSet;

/// An equivalence class of queries: all the concrete queries whose name
/// falls in `domain` resolve along the same trace, so verifying one
/// exemplar verifies them all. The domain may end with the symbolic α
/// label, covering every name whose leftmost label matches none of the
/// named siblings at that level.
#[derive(Debug, Clone)]
pub struct EquivalenceClass {
    pub id: usize,
    pub domain: dns::Name,
    pub types: Vec<dns::RecordType>,
}

/// Enumerate the equivalence classes of a configuration by walking the
/// label trie. For every node reached by a path `p` two classes come
/// out: the concrete `p` and the symbolic `α.p`. DNAME cross-edges are
/// traversed with the path prefix unchanged, guarded against loops by
/// refusing to revisit a trie node at the same path length within one
/// branch and by the overall length bound.
pub fn generate_ecs(trie: &LabelTrie, conf: &VerifierConf) -> Vec<EquivalenceClass> {
    let mut classes = vec![];
    let mut path = vec![];
    let mut branch = vec![];
    let mut seen = HashSet::new();
    visit(trie, trie.root(), &mut path, &mut branch, &mut seen, conf, &mut classes);
    for (id, class) in classes.iter_mut().enumerate() {
        class.id = id;
    }
    classes
}

fn visit(
    trie: &LabelTrie,
    node: usize,
    path: &mut Vec<dns::Label>,
    branch: &mut Vec<(usize, usize)>,
    seen: &mut HashSet<dns::Name>,
    conf: &VerifierConf,
    out: &mut Vec<EquivalenceClass>,
) {
    // Loop guards: a DNAME cycle brings the traversal back to a node
    // already on this branch with the same path length; anything longer
    // than the length bound is cut unconditionally.
    if branch.contains(&(node, path.len())) {
        return;
    }
    if path.len() > conf.max_query_length {
        return;
    }
    branch.push((node, path.len()));

    // A DNAME edge can revisit a path already enumerated from another
    // node: only the first occurrence of a domain produces a class.
    let domain = dns::Name::from_labels(path.clone());
    if seen.insert(domain.clone()) {
        out.push(EquivalenceClass {
            id: 0,
            domain: domain.clone(),
            types: dns::QUERY_TYPES.to_vec(),
        });
    }

    // The α class stands for every label not naming a child here.
    let siblings: Vec<String> = trie.node(node).children.keys().cloned().collect();
    if path.len() < conf.max_query_length {
        let alpha = domain.child(dns::Label::alpha(siblings));
        if seen.insert(alpha.clone()) {
            out.push(EquivalenceClass {
                id: 0,
                domain: alpha,
                types: dns::QUERY_TYPES.to_vec(),
            });
        }
    }

    let children: Vec<(String, usize)> = trie
        .node(node)
        .children
        .iter()
        .map(|(label, &child)| (label.clone(), child))
        .collect();
    for (label, child) in children {
        path.push(dns::Label::Name(label));
        visit(trie, child, path, branch, seen, conf, out);
        path.pop();
    }

    if let Some(target) = trie.node(node).dname_target {
        visit(trie, target, path, branch, seen, conf, out);
    }

    branch.pop();
}
