use crate::shared::dns;
use crate::verifier::conf::{PropertyConf, PropertyValue};
use crate::verifier::config::Config;
use crate::verifier::ecs::EquivalenceClass;
use crate::verifier::graph::*;
use crate::verifier::lookup::AnswerTag;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// A property violation: which property failed, on which query or
/// domain, and why. Violations are deduplicated and ordered on the
/// whole tuple, so reports are stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Violation {
    pub property: String,
    pub subject: String,
    pub reason: String,
}

/// The declarative properties the checker understands. Per-EC
/// properties evaluate one interpretation graph; the delegation
/// consistency check is structural and runs once over the zones.
#[derive(Debug, Clone)]
pub enum Property {
    ResponseValue { types: Vec<dns::RecordType>, values: Vec<String> },
    Rewrites { max: usize },
    RewriteBlackholing,
    QueryRewrite { suffixes: Vec<dns::Name> },
    NameserverContact { suffixes: Vec<dns::Name> },
    ResponseConsistency,
    ResponseReturned,
    LameDelegation,
    DelegationConsistency,
}

impl Property {
    /// Instantiate a [`Property`] from its job configuration entry,
    /// validating the attached types and values.
    pub fn from_conf(conf: &PropertyConf) -> Result<Property, String> {
        match conf.name.as_str() {
            "ResponseValue" => Ok(Property::ResponseValue {
                types: parse_types(conf)?,
                values: take_list(conf)?,
            }),
            "Rewrites" => match &conf.value {
                Some(PropertyValue::Count(max)) => Ok(Property::Rewrites { max: *max as usize }),
                _ => Err(format!("property '{}' wants a numeric Value", conf.name)),
            },
            "RewriteBlackholing" => Ok(Property::RewriteBlackholing),
            "QueryRewrite" => Ok(Property::QueryRewrite { suffixes: parse_names(take_list(conf)?)? }),
            "NameserverContact" => {
                Ok(Property::NameserverContact { suffixes: parse_names(take_list(conf)?)? })
            }
            "ResponseConsistency" => Ok(Property::ResponseConsistency),
            "ResponseReturned" => Ok(Property::ResponseReturned),
            "LameDelegation" => Ok(Property::LameDelegation),
            // The structural check answers both names: it subsumes the
            // per-graph variant.
            "DelegationConsistency" => Ok(Property::DelegationConsistency),
            "StructuralDelegationConsistency" => Ok(Property::DelegationConsistency),
            name => Err(format!("unknown property '{}'", name)),
        }
    }

    /// The human-readable name used in reports.
    pub fn human_name(&self) -> &'static str {
        match self {
            Property::ResponseValue { .. } => "Response Value",
            Property::Rewrites { .. } => "Rewrites",
            Property::RewriteBlackholing => "Rewrite Blackholing",
            Property::QueryRewrite { .. } => "Query Rewrite",
            Property::NameserverContact { .. } => "Nameserver Contact",
            Property::ResponseConsistency => "Response Consistency",
            Property::ResponseReturned => "Response Returned",
            Property::LameDelegation => "Lame Delegation",
            Property::DelegationConsistency => "Delegation Consistency",
        }
    }

    /// Reports if the property runs over the zones instead of per-EC
    /// interpretation graphs.
    pub fn is_structural(&self) -> bool {
        matches!(self, Property::DelegationConsistency)
    }
}

fn parse_types(conf: &PropertyConf) -> Result<Vec<dns::RecordType>, String> {
    let names = match &conf.types {
        None => return Ok(vec![dns::RecordType::A]),
        Some(names) => names,
    };
    let mut types = vec![];
    for name in names {
        match dns::RecordType::from_str(&name.to_uppercase()) {
            Ok(rtype) => types.push(rtype),
            Err(_) => return Err(format!("unknown record type '{}'", name)),
        }
    }
    Ok(types)
}

fn take_list(conf: &PropertyConf) -> Result<Vec<String>, String> {
    match &conf.value {
        Some(PropertyValue::List(values)) => Ok(values.clone()),
        _ => Err(format!("property '{}' wants a list Value", conf.name)),
    }
}

fn parse_names(values: Vec<String>) -> Result<Vec<dns::Name>, String> {
    values
        .iter()
        .map(|v| dns::Name::from_string(v).map_err(|err| format!("name '{}' invalid: {:?}", v, err)))
        .collect()
}

/// Evaluate one per-EC property against the interpretation graph of an
/// equivalence class, appending any violation found.
pub fn check_graph(
    property: &Property,
    ec: &EquivalenceClass,
    graph: &InterpGraph,
    out: &mut Vec<Violation>,
) {
    let subject = ec.domain.to_string();
    let fail = |out: &mut Vec<Violation>, reason: String| {
        out.push(Violation {
            property: property.human_name().to_string(),
            subject: subject.clone(),
            reason,
        });
    };

    match property {
        Property::ResponseValue { types, values } => {
            for idx in graph.sinks() {
                let node = graph.node(idx);
                if node.tag != AnswerTag::Ans {
                    continue;
                }
                for record in &node.records {
                    if !types.contains(&record.rtype) {
                        continue;
                    }
                    let found = record.rdata.to_string();
                    if !values.contains(&found) {
                        fail(
                            out,
                            format!(
                                "Expected response \"{}\", but found \"{}\" at nameserver \"{}\".",
                                values.join("\", \""),
                                found,
                                node.key.server
                            ),
                        );
                    }
                }
            }
        }
        Property::Rewrites { max } => {
            let actual = max_rewrites(graph);
            if actual > *max {
                fail(
                    out,
                    format!("Actual rewrites ({}) exceeded maximum allowed ({}).", actual, max),
                );
            }
        }
        Property::RewriteBlackholing => {
            if let Some(idx) = blackhole_witness(graph) {
                let node = graph.node(idx);
                fail(
                    out,
                    format!(
                        "Query rewritten to \"{}\" ends in NXDOMAIN at nameserver \"{}\".",
                        node.key.query, node.key.server
                    ),
                );
            }
        }
        Property::QueryRewrite { suffixes } => {
            for edge in graph.edges() {
                if edge.kind != EdgeKind::Rewrite {
                    continue;
                }
                let target = &graph.node(edge.to).key.query;
                if !suffixes.iter().any(|s| target.is_in_zone(s)) {
                    fail(
                        out,
                        format!(
                            "Query rewritten to \"{}\" which is outside the expected hierarchy.",
                            target
                        ),
                    );
                }
            }
        }
        Property::NameserverContact { suffixes } => {
            for node in graph.nodes() {
                let server = &node.key.server;
                if !suffixes.iter().any(|s| server.is_in_zone(s)) {
                    fail(
                        out,
                        format!(
                            "Resolution contacts external nameserver \"{}\" which is not in the allowed domains list.",
                            server
                        ),
                    );
                }
            }
        }
        Property::ResponseConsistency => {
            // Distinct answer signatures of the data-bearing sinks,
            // each with the first server exhibiting it.
            let mut signatures: BTreeMap<String, String> = BTreeMap::new();
            for idx in graph.sinks() {
                let node = graph.node(idx);
                let signature = match node.tag {
                    AnswerTag::Ans | AnswerTag::NoData => answer_signature(node),
                    AnswerTag::Nx => "NXDOMAIN".to_string(),
                    _ => continue,
                };
                signatures
                    .entry(signature)
                    .or_insert_with(|| node.key.server.to_string());
            }
            if signatures.len() > 1 {
                let mut servers: Vec<&String> = signatures.values().collect();
                servers.sort();
                fail(
                    out,
                    format!(
                        "Nameservers \"{}\" and \"{}\" return different answers for the query.",
                        servers[0], servers[1]
                    ),
                );
            }
        }
        Property::ResponseReturned => {
            let answered = graph
                .sinks()
                .any(|idx| graph.node(idx).tag == AnswerTag::Ans);
            if !answered {
                fail(out, "No authoritative answer is returned for the query.".to_string());
            }
        }
        Property::LameDelegation => {
            for node in graph.nodes() {
                if node.tag == AnswerTag::Refused {
                    fail(
                        out,
                        format!(
                            "Nameserver \"{}\" refused the query, no hosted zone covers it.",
                            node.key.server
                        ),
                    );
                }
            }
        }
        Property::DelegationConsistency => {
            // Structural property, checked over zones in its own pass.
        }
    }
}

// The answer set of a sink, normalized for comparison across servers.
fn answer_signature(node: &IGNode) -> String {
    let mut parts: Vec<String> = node
        .records
        .iter()
        .map(|r| format!("{} {}", r.rtype.to_str(), r.rdata))
        .collect();
    parts.sort();
    if parts.is_empty() {
        "NODATA".to_string()
    } else {
        parts.join("; ")
    }
}

// The largest number of rewrite edges on any root-to-sink path of the
// graph. Paths are enumerated by DFS; re-entering a node already on the
// current path truncates there, the cycle entry standing as the sink.
fn max_rewrites(graph: &InterpGraph) -> usize {
    let mut best = 0;
    let mut on_path = vec![false; graph.nodes().len()];
    for &entry in graph.entries() {
        walk_rewrites(graph, entry, &mut on_path, 0, &mut best);
    }
    best
}

fn walk_rewrites(
    graph: &InterpGraph,
    node: NodeIdx,
    on_path: &mut Vec<bool>,
    rewrites: usize,
    best: &mut usize,
) {
    if on_path[node] || graph.is_sink(node) {
        *best = (*best).max(rewrites);
        return;
    }
    on_path[node] = true;
    for &(next, kind) in graph.successors(node) {
        let step = if kind == EdgeKind::Rewrite { 1 } else { 0 };
        walk_rewrites(graph, next, on_path, rewrites + step, best);
    }
    on_path[node] = false;
}

// The first NXDOMAIN sink reachable through at least one rewrite edge,
// if any. The traversal is memoized on (node, rewritten-yet) states and
// stops at the first witness.
fn blackhole_witness(graph: &InterpGraph) -> Option<NodeIdx> {
    let mut stack: Vec<(NodeIdx, bool)> =
        graph.entries().iter().map(|&idx| (idx, false)).collect();
    let mut visited: HashSet<(NodeIdx, bool)> = HashSet::new();
    while let Some((node, rewritten)) = stack.pop() {
        if !visited.insert((node, rewritten)) {
            continue;
        }
        if rewritten && graph.node(node).tag == AnswerTag::Nx {
            return Some(node);
        }
        for &(next, kind) in graph.successors(node) {
            stack.push((next, rewritten || kind == EdgeKind::Rewrite));
        }
    }
    None
}

/// The structural delegation-consistency check: for every zone in scope
/// whose origin has a parent zone in the configuration, the NS set the
/// parent declares at the child origin must equal the NS set the child
/// declares at its own apex. Every (parent replica, child replica) pair
/// is compared.
pub fn check_delegation_consistency(
    config: &Config,
    domain: &dns::Name,
    sub_domain: bool,
    out: &mut Vec<Violation>,
) {
    let mut zones: Vec<&crate::verifier::zones::Zone> = config.zones().iter().collect();
    zones.sort_by_key(|z| (z.origin.clone(), z.server.clone()));

    for child in &zones {
        let in_scope = if sub_domain {
            child.origin.is_in_zone(domain)
        } else {
            &child.origin == domain
        };
        if !in_scope {
            continue;
        }

        let parent_len = zones
            .iter()
            .filter(|p| child.origin.is_below(&p.origin))
            .map(|p| p.origin.len())
            .max();
        let parent_len = match parent_len {
            Some(len) => len,
            None => continue,
        };

        for parent in &zones {
            if parent.origin.len() != parent_len || !child.origin.is_below(&parent.origin) {
                continue;
            }
            let parent_ns = ns_names(parent, &child.origin);
            let child_ns = ns_names(child, &child.origin);
            if parent_ns != child_ns {
                out.push(Violation {
                    property: "Delegation Consistency".to_string(),
                    subject: child.origin.to_string(),
                    reason: format!(
                        "Inconsistency detected in NS records between {} and {}.",
                        parent.server, child.server
                    ),
                });
            }
        }
    }
}

fn ns_names(zone: &crate::verifier::zones::Zone, owner: &dns::Name) -> BTreeSet<dns::Name> {
    zone.get(owner, dns::RecordType::NS)
        .map(|records| records.iter().map(|r| r.name_data().clone()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::dns::{Class, Name, RData, Record, RecordType, SoaData};
    use crate::verifier::conf::VerifierConf;
    use crate::verifier::zones::Zone;
    use std::net::{IpAddr, Ipv4Addr};

    fn name(s: &str) -> Name {
        Name::from_string(s).unwrap()
    }

    fn a(node: &str, ip: [u8; 4]) -> Record {
        Record::new(
            name(node),
            RecordType::A,
            Class::IN,
            300,
            RData::Addr(IpAddr::V4(Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]))),
        )
    }

    fn with_name(node: &str, rtype: RecordType, target: &str) -> Record {
        Record::new(name(node), rtype, Class::IN, 300, RData::Name(name(target)))
    }

    fn soa(node: &str) -> Record {
        let data = SoaData {
            mname: name(&format!("ns1.{}", node)),
            rname: name(&format!("host.{}", node)),
            serial: 1,
            refresh: 2,
            retry: 3,
            expire: 4,
            minimum: 5,
        };
        Record::new(name(node), RecordType::SOA, Class::IN, 300, RData::Soa(data))
    }

    fn ec(domain: &str, types: &[RecordType]) -> EquivalenceClass {
        EquivalenceClass { id: 0, domain: name(domain), types: types.to_vec() }
    }

    fn graph_for(config: &Config, class: &EquivalenceClass) -> InterpGraph {
        build_graph(config, class, &VerifierConf::default())
    }

    // The bounded-rewrites scenario: a wildcard CNAME feeding a chain
    // of four more CNAMEs before the final address.
    fn cname_chain_config() -> Config {
        let server = name("ns1.foo.com.");
        let mut zone = Zone::new(&name("foo.com."), &server);
        zone.insert(soa("foo.com."));
        zone.insert(with_name("foo.com.", RecordType::NS, "ns1.foo.com."));
        zone.insert(with_name("*.a.foo.com.", RecordType::CNAME, "b.a.foo.com."));
        zone.insert(with_name("b.a.foo.com.", RecordType::CNAME, "c.a.foo.com."));
        zone.insert(with_name("c.a.foo.com.", RecordType::CNAME, "d.a.foo.com."));
        zone.insert(with_name("d.a.foo.com.", RecordType::CNAME, "e.a.foo.com."));
        zone.insert(with_name("e.a.foo.com.", RecordType::CNAME, "f.a.foo.com."));
        zone.insert(a("f.a.foo.com.", [1, 1, 1, 1]));
        Config::new(vec![server], vec![zone])
    }

    #[test]
    fn test_rewrites_bound() {
        let config = cname_chain_config();
        let class = ec("x.a.foo.com.", &[RecordType::A]);
        let graph = graph_for(&config, &class);

        let mut out = vec![];
        check_graph(&Property::Rewrites { max: 4 }, &class, &graph, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].reason, "Actual rewrites (5) exceeded maximum allowed (4).");

        let mut out = vec![];
        check_graph(&Property::Rewrites { max: 5 }, &class, &graph, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_rewrite_blackholing() {
        let server = name("ns1.example.");
        let mut zone = Zone::new(&name("example."), &server);
        zone.insert(soa("example."));
        zone.insert(with_name("a.x.example.", RecordType::CNAME, "b.x.example."));
        let config = Config::new(vec![server], vec![zone]);

        let class = ec("a.x.example.", &[RecordType::A]);
        let graph = graph_for(&config, &class);

        let mut out = vec![];
        check_graph(&Property::RewriteBlackholing, &class, &graph, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].reason,
            "Query rewritten to \"b.x.example.\" ends in NXDOMAIN at nameserver \"ns1.example.\"."
        );

        // Plain NXDOMAIN without rewrites is fine.
        let class = ec("missing.example.", &[RecordType::A]);
        let graph = graph_for(&config, &class);
        let mut out = vec![];
        check_graph(&Property::RewriteBlackholing, &class, &graph, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_nameserver_contact() {
        let server = name("ns1.example.");
        let mut zone = Zone::new(&name("example."), &server);
        zone.insert(soa("example."));
        zone.insert(with_name("sub.example.", RecordType::NS, "ns.external.net."));
        let config = Config::new(vec![server], vec![zone]);

        let class = ec("x.sub.example.", &[RecordType::A]);
        let graph = graph_for(&config, &class);

        let mut out = vec![];
        let property = Property::NameserverContact { suffixes: vec![name("example.")] };
        check_graph(&property, &class, &graph, &mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].reason.contains("external nameserver \"ns.external.net.\""));
    }

    #[test]
    fn test_query_rewrite_scope() {
        let server = name("ns1.example.");
        let mut zone = Zone::new(&name("example."), &server);
        zone.insert(soa("example."));
        zone.insert(with_name("out.example.", RecordType::CNAME, "target.other.org."));
        let config = Config::new(vec![server], vec![zone]);

        let class = ec("out.example.", &[RecordType::A]);
        let graph = graph_for(&config, &class);

        let mut out = vec![];
        let property = Property::QueryRewrite { suffixes: vec![name("example.")] };
        check_graph(&property, &class, &graph, &mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].reason.contains("\"target.other.org.\""));
    }

    #[test]
    fn test_response_value_and_returned() {
        let server = name("ns1.example.");
        let mut zone = Zone::new(&name("example."), &server);
        zone.insert(soa("example."));
        zone.insert(a("gw1.example.", [64, 107, 104, 3]));
        let config = Config::new(vec![server], vec![zone]);

        let class = ec("gw1.example.", &[RecordType::A]);
        let graph = graph_for(&config, &class);

        let mut out = vec![];
        let good = Property::ResponseValue {
            types: vec![RecordType::A],
            values: vec!["64.107.104.3".to_string()],
        };
        check_graph(&good, &class, &graph, &mut out);
        assert!(out.is_empty());

        let bad = Property::ResponseValue {
            types: vec![RecordType::A],
            values: vec!["64.107.104.4".to_string()],
        };
        check_graph(&bad, &class, &graph, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].reason,
            "Expected response \"64.107.104.4\", but found \"64.107.104.3\" at nameserver \"ns1.example.\"."
        );

        let mut out = vec![];
        check_graph(&Property::ResponseReturned, &class, &graph, &mut out);
        assert!(out.is_empty());
        let class = ec("missing.example.", &[RecordType::A]);
        let graph = graph_for(&config, &class);
        check_graph(&Property::ResponseReturned, &class, &graph, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_response_consistency_across_replicas() {
        let ns1 = name("ns1.example.");
        let ns2 = name("ns2.example.");
        let apex_ns = |server: &Name| {
            let mut zone = Zone::new(&name("example."), server);
            zone.insert(soa("example."));
            zone.insert(with_name("example.", RecordType::NS, "ns1.example."));
            zone.insert(with_name("example.", RecordType::NS, "ns2.example."));
            zone
        };
        let mut replica1 = apex_ns(&ns1);
        replica1.insert(a("www.example.", [1, 1, 1, 1]));
        let mut replica2 = apex_ns(&ns2);
        replica2.insert(a("www.example.", [2, 2, 2, 2]));
        let config = Config::new(vec![ns1, ns2], vec![replica1, replica2]);

        let class = ec("www.example.", &[RecordType::A]);
        let graph = graph_for(&config, &class);

        let mut out = vec![];
        check_graph(&Property::ResponseConsistency, &class, &graph, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].reason,
            "Nameservers \"ns1.example.\" and \"ns2.example.\" return different answers for the query."
        );
    }

    #[test]
    fn test_lame_delegation() {
        let ns1 = name("ns1.example.");
        let lame = name("ns.lame.example.");
        let mut zone = Zone::new(&name("example."), &ns1);
        zone.insert(soa("example."));
        zone.insert(with_name("sub.example.", RecordType::NS, "ns.lame.example."));
        // The lame server hosts an unrelated zone only.
        let other = Zone::new(&name("other."), &lame);
        let config = Config::new(vec![ns1], vec![zone, other]);

        let class = ec("x.sub.example.", &[RecordType::A]);
        let graph = graph_for(&config, &class);

        let mut out = vec![];
        check_graph(&Property::LameDelegation, &class, &graph, &mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].reason.contains("\"ns.lame.example.\""));
    }

    #[test]
    fn test_delegation_consistency() {
        let parent_server = name("ns1.richland.cc.il.us.");
        let child1 = name("ns1.child.richland.cc.il.us.");
        let child2 = name("ns2.child.richland.cc.il.us.");

        let mut parent = Zone::new(&name("richland.cc.il.us."), &parent_server);
        parent.insert(soa("richland.cc.il.us."));
        parent.insert(with_name(
            "child.richland.cc.il.us.",
            RecordType::NS,
            "ns1.child.richland.cc.il.us.",
        ));
        parent.insert(with_name(
            "child.richland.cc.il.us.",
            RecordType::NS,
            "ns2.child.richland.cc.il.us.",
        ));

        let mut child = Zone::new(&name("child.richland.cc.il.us."), &child1);
        child.insert(soa("child.richland.cc.il.us."));
        child.insert(with_name(
            "child.richland.cc.il.us.",
            RecordType::NS,
            "ns1.child.richland.cc.il.us.",
        ));

        let config = Config::new(vec![name("us.illinois.net.")], vec![parent, child]);

        let mut out = vec![];
        check_delegation_consistency(
            &config,
            &name("child.richland.cc.il.us."),
            false,
            &mut out,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].subject, "child.richland.cc.il.us.");
        assert_eq!(
            out[0].reason,
            "Inconsistency detected in NS records between ns1.richland.cc.il.us. and ns1.child.richland.cc.il.us.."
        );

        // The check is symmetric: matching sets on both sides pass.
        let mut consistent = Zone::new(&name("child.richland.cc.il.us."), &child2);
        consistent.insert(with_name(
            "child.richland.cc.il.us.",
            RecordType::NS,
            "ns1.child.richland.cc.il.us.",
        ));
        consistent.insert(with_name(
            "child.richland.cc.il.us.",
            RecordType::NS,
            "ns2.child.richland.cc.il.us.",
        ));
        let zones: Vec<Zone> = config.zones().to_vec();
        let config = Config::new(
            vec![name("us.illinois.net.")],
            vec![zones[0].clone(), consistent],
        );
        let mut out = vec![];
        check_delegation_consistency(
            &config,
            &name("child.richland.cc.il.us."),
            false,
            &mut out,
        );
        assert!(out.is_empty());
    }
}
