use crate::shared::dns;
use crate::verifier::config::Config;
use crate::verifier::zones::Zone;

/// The outcome of a single-step lookup on one authoritative server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerOutcome {
    /// Data present at the name. An empty record set is a NoData answer.
    Ans(Vec<dns::Record>),
    /// The query is rewritten (CNAME or DNAME) into `new_query`.
    AnsQ { records: Vec<dns::Record>, new_query: dns::Name },
    /// Referral to the servers of a delegated subzone: the NS records
    /// plus their in-bailiwick address glue.
    Ref(Vec<dns::Record>),
    /// The name does not exist; the zone SOA accompanies the answer.
    Nx(Vec<dns::Record>),
    /// The server has no zone containing the query name.
    Refused,
}

/// The tag summarizing how a resolution node answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnswerTag {
    Ans,
    AnsQ,
    Ref,
    Nx,
    NoData,
    Refused,
    DepthExceeded,
}

impl ServerOutcome {
    pub fn tag(&self) -> AnswerTag {
        match self {
            ServerOutcome::Ans(records) if records.is_empty() => AnswerTag::NoData,
            ServerOutcome::Ans(_) => AnswerTag::Ans,
            ServerOutcome::AnsQ { .. } => AnswerTag::AnsQ,
            ServerOutcome::Ref(_) => AnswerTag::Ref,
            ServerOutcome::Nx(_) => AnswerTag::Nx,
            ServerOutcome::Refused => AnswerTag::Refused,
        }
    }
}

/// Resolve one query against one zone, one step. The query types are
/// resolved together and the per-type outcomes grouped: types sharing
/// an outcome stay bundled, so the caller builds one successor per
/// distinct outcome instead of one per type.
pub fn lookup(
    config: &Config,
    zone: &Zone,
    query: &dns::Name,
    types: &[dns::RecordType],
) -> Vec<(Vec<dns::RecordType>, ServerOutcome)> {
    let ce = closest_encloser(zone, query);
    let mut groups: Vec<(Vec<dns::RecordType>, ServerOutcome)> = vec![];
    for &qtype in types {
        let outcome = resolve_type(config, zone, query, &ce, qtype);
        match groups.iter_mut().find(|(_, known)| mergeable(known, &outcome)) {
            Some((group_types, known)) => {
                group_types.push(qtype);
                merge(known, outcome);
            }
            None => groups.push((vec![qtype], outcome)),
        }
    }
    groups
}

/// The closest encloser of a query in a zone: the longest existing
/// ancestor-or-self of the query name, the zone origin when nothing
/// closer exists. Empty non-terminals count as existing, so a wildcard
/// owner shields its whole level even without data at the parent.
pub fn closest_encloser(zone: &Zone, query: &dns::Name) -> dns::Name {
    debug_assert!(query.is_in_zone(&zone.origin));
    let mut n = query.len();
    while n >= zone.origin.len() {
        let ancestor = query.ancestor(n);
        if zone.exists(&ancestor) {
            return ancestor;
        }
        if n == 0 {
            break;
        }
        n -= 1;
    }
    zone.origin.clone()
}

/// The rank of a record set owned by `owner` when looked up for
/// `query`: `(is_match, is_zone_cut, match_length, not_wildcard)`,
/// compared lexicographically. A zone cut outranks data at the same
/// owner, an exact owner outranks a wildcard, a longer match wins.
pub fn rank(query: &dns::Name, owner: &dns::Name, is_zone_cut: bool) -> (bool, bool, usize, bool) {
    let is_wildcard = owner.leaf().map_or(false, dns::Label::is_wildcard);
    let is_match = if is_wildcard {
        match owner.parent() {
            Some(parent) => query.is_below(&parent),
            None => false,
        }
    } else {
        query == owner
    };
    (is_match, is_zone_cut, owner.len(), !is_wildcard)
}

// One query type against the precomputed closest encloser.
fn resolve_type(
    config: &Config,
    zone: &Zone,
    query: &dns::Name,
    ce: &dns::Name,
    qtype: dns::RecordType,
) -> ServerOutcome {
    if ce == query {
        // Exact match. A zone cut at the owner outranks its data.
        if is_delegation(zone, ce) && rank(query, ce, true) > rank(query, ce, false) {
            return referral(config, zone, ce);
        }
        return answer_at(zone, ce, qtype);
    }

    // Ancestor match: DNAME rewrites the whole subtree, a cut delegates
    // it, a wildcard answers for it, otherwise the name does not exist.
    if let Some(dnames) = zone.get(ce, dns::RecordType::DNAME) {
        let chosen = smallest_by_target(dnames);
        let new_query = query.rewrite_suffix(ce, chosen.name_data());
        return ServerOutcome::AnsQ { records: vec![chosen.clone()], new_query };
    }
    if is_delegation(zone, ce) {
        return referral(config, zone, ce);
    }
    let wildcard = ce.child(dns::Label::named("*"));
    if zone.owns(&wildcard) {
        return answer_at(zone, &wildcard, qtype);
    }
    ServerOutcome::Nx(zone.soa().cloned().into_iter().collect())
}

// Authoritative data at an owner: records of the queried type, else a
// CNAME rewrite for non-CNAME queries, else NoData.
fn answer_at(zone: &Zone, owner: &dns::Name, qtype: dns::RecordType) -> ServerOutcome {
    if let Some(records) = zone.get(owner, qtype) {
        return ServerOutcome::Ans(records.clone());
    }
    if qtype != dns::RecordType::CNAME {
        if let Some(cnames) = zone.get(owner, dns::RecordType::CNAME) {
            let chosen = smallest_by_target(cnames);
            let new_query = chosen.name_data().clone();
            return ServerOutcome::AnsQ { records: vec![chosen.clone()], new_query };
        }
    }
    ServerOutcome::Ans(vec![])
}

// An owner with NS records below the apex marks a zone cut.
fn is_delegation(zone: &Zone, owner: &dns::Name) -> bool {
    owner != &zone.origin && zone.get(owner, dns::RecordType::NS).is_some()
}

// The NS set of a cut plus the in-bailiwick address glue known to the
// configuration for the named servers.
fn referral(config: &Config, zone: &Zone, cut: &dns::Name) -> ServerOutcome {
    let mut records = zone
        .get(cut, dns::RecordType::NS)
        .cloned()
        .unwrap_or_default();
    let ns_names: Vec<dns::Name> = records.iter().map(|r| r.name_data().clone()).collect();
    for ns_name in &ns_names {
        if !ns_name.is_in_zone(cut) {
            continue;
        }
        for glue in config.addresses_of(ns_name) {
            if !records.contains(glue) {
                records.push(glue.clone());
            }
        }
    }
    ServerOutcome::Ref(records)
}

// Several CNAME or DNAME records at one owner are tolerated; the pick
// must be deterministic, so the smallest target wins.
fn smallest_by_target(records: &[dns::Record]) -> &dns::Record {
    records
        .iter()
        .min_by_key(|r| r.name_data().to_string())
        .unwrap()
}

// Outcomes compare for grouping: all data answers of a lookup bundle
// into one group, the others only when identical.
fn mergeable(known: &ServerOutcome, new: &ServerOutcome) -> bool {
    match (known, new) {
        (ServerOutcome::Ans(_), ServerOutcome::Ans(_)) => true,
        (ServerOutcome::AnsQ { new_query: a, .. }, ServerOutcome::AnsQ { new_query: b, .. }) => a == b,
        (ServerOutcome::Ref(a), ServerOutcome::Ref(b)) => a == b,
        (ServerOutcome::Nx(a), ServerOutcome::Nx(b)) => a == b,
        (ServerOutcome::Refused, ServerOutcome::Refused) => true,
        _ => false,
    }
}

fn merge(known: &mut ServerOutcome, new: ServerOutcome) {
    if let (ServerOutcome::Ans(records), ServerOutcome::Ans(new_records)) = (known, new) {
        for record in new_records {
            if !records.contains(&record) {
                records.push(record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::dns::{Class, Label, Name, RData, Record, RecordType, SoaData};
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

    fn fixture() -> Config {
        let server = name("ns1.example.");
        let mut zone = Zone::new(&name("example."), &server);
        zone.insert(soa("example."));
        zone.insert(with_name("example.", RecordType::NS, "ns1.example."));
        zone.insert(a("ns1.example.", [9, 9, 9, 9]));
        zone.insert(a("www.example.", [1, 2, 3, 4]));
        zone.insert(with_name("alias.example.", RecordType::CNAME, "www.example."));
        zone.insert(with_name("sub.example.", RecordType::NS, "ns1.sub.example."));
        zone.insert(a("ns1.sub.example.", [5, 5, 5, 5]));
        zone.insert(with_name("tree.example.", RecordType::DNAME, "www.example."));
        zone.insert(a("*.wild.example.", [7, 7, 7, 7]));
        zone.insert(a("wild.example.", [7, 7, 7, 8]));
        Config::new(vec![server], vec![zone])
    }

    fn one(
        config: &Config,
        query: &str,
        qtype: RecordType,
    ) -> Vec<(Vec<RecordType>, ServerOutcome)> {
        let zone = &config.zones()[0];
        lookup(config, zone, &name(query), &[qtype])
    }

    #[test]
    fn test_exact_answer() {
        let config = fixture();
        let groups = one(&config, "www.example.", RecordType::A);
        let (types, outcome) = &groups[0];
        assert_eq!(types, &vec![RecordType::A]);
        match outcome {
            ServerOutcome::Ans(records) => assert_eq!(records[0], a("www.example.", [1, 2, 3, 4])),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_nodata_and_grouping() {
        let config = fixture();
        let zone = &config.zones()[0];
        let groups = lookup(
            &config,
            zone,
            &name("www.example."),
            &[RecordType::A, RecordType::MX, RecordType::TXT],
        );

        // A answers, MX and TXT have no data: all bundle into one Ans
        // group whose records are the A set.
        assert_eq!(groups.len(), 1);
        let (types, outcome) = &groups[0];
        assert_eq!(types.len(), 3);
        assert_eq!(outcome.tag(), AnswerTag::Ans);
    }

    #[test]
    fn test_cname_splits_types() {
        let config = fixture();
        let zone = &config.zones()[0];
        let groups = lookup(
            &config,
            zone,
            &name("alias.example."),
            &[RecordType::A, RecordType::CNAME],
        );

        assert_eq!(groups.len(), 2);
        let rewritten = groups
            .iter()
            .find(|(types, _)| types.contains(&RecordType::A))
            .unwrap();
        match &rewritten.1 {
            ServerOutcome::AnsQ { new_query, .. } => assert_eq!(new_query, &name("www.example.")),
            other => panic!("unexpected outcome {:?}", other),
        }
        let direct = groups
            .iter()
            .find(|(types, _)| types.contains(&RecordType::CNAME))
            .unwrap();
        assert_eq!(direct.1.tag(), AnswerTag::Ans);
    }

    #[test]
    fn test_referral_with_glue() {
        let config = fixture();
        let groups = one(&config, "deep.sub.example.", RecordType::A);
        match &groups[0].1 {
            ServerOutcome::Ref(records) => {
                assert!(records.contains(&with_name("sub.example.", RecordType::NS, "ns1.sub.example.")));
                assert!(records.contains(&a("ns1.sub.example.", [5, 5, 5, 5])));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_referral_at_cut_owner() {
        let config = fixture();
        let groups = one(&config, "sub.example.", RecordType::A);
        assert_eq!(groups[0].1.tag(), AnswerTag::Ref);
    }

    #[test]
    fn test_dname_substitution() {
        let config = fixture();
        let groups = one(&config, "x.tree.example.", RecordType::A);
        match &groups[0].1 {
            ServerOutcome::AnsQ { new_query, records } => {
                assert_eq!(new_query, &name("x.www.example."));
                assert_eq!(records[0].rtype, RecordType::DNAME);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_wildcard_and_nx() {
        let config = fixture();
        let groups = one(&config, "anything.wild.example.", RecordType::A);
        match &groups[0].1 {
            ServerOutcome::Ans(records) => assert_eq!(records[0], a("*.wild.example.", [7, 7, 7, 7])),
            other => panic!("unexpected outcome {:?}", other),
        }

        let groups = one(&config, "missing.example.", RecordType::A);
        match &groups[0].1 {
            ServerOutcome::Nx(records) => assert_eq!(records[0].rtype, RecordType::SOA),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_alpha_query_skips_concrete_owners() {
        let config = fixture();
        let zone = &config.zones()[0];

        // α below wild.example matches the wildcard, α below the apex
        // matches nothing and falls through to NXDOMAIN.
        let alpha = name("wild.example.").child(Label::alpha(vec![]));
        let groups = lookup(&config, zone, &alpha, &[RecordType::A]);
        assert_eq!(groups[0].1.tag(), AnswerTag::Ans);

        let alpha = name("example.").child(Label::alpha(vec![
            "www".to_string(),
            "alias".to_string(),
            "sub".to_string(),
            "tree".to_string(),
            "wild".to_string(),
            "ns1".to_string(),
        ]));
        let groups = lookup(&config, zone, &alpha, &[RecordType::A]);
        assert_eq!(groups[0].1.tag(), AnswerTag::Nx);
    }

    #[test]
    fn test_multiple_cnames_deterministic_pick() {
        let server = name("ns1.example.");
        let mut zone = Zone::new(&name("example."), &server);
        zone.insert(soa("example."));
        zone.insert(with_name("a.example.", RecordType::CNAME, "z.example."));
        zone.insert(with_name("a.example.", RecordType::CNAME, "b.example."));
        let config = Config::new(vec![server], vec![zone]);

        let groups = one(&config, "a.example.", RecordType::A);
        match &groups[0].1 {
            ServerOutcome::AnsQ { new_query, records } => {
                assert_eq!(new_query, &name("b.example."));
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].name_data(), &name("b.example."));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_rank_ordering() {
        let query = name("x.sub.example.");
        let cut = name("sub.example.");
        let wildcard = name("sub.example.").child(Label::named("*"));

        // A zone cut outranks data at the same owner.
        assert!(rank(&query, &cut, true) > rank(&query, &cut, false));
        // An exact owner outranks a covering wildcard.
        assert!(rank(&query, &query, false) > rank(&query, &wildcard, false));
        // A longer suffix match wins.
        assert!(rank(&query, &cut, false) > rank(&query, &name("example."), false));
    }
}
