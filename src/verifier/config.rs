use crate::shared::dns;
use crate::shared::log;
use crate::verifier::conf::*;
use crate::verifier::zones::*;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// The modeled authoritative configuration: the set of servers, the
/// root (entry) servers queried first, and the zones each server hosts.
/// Servers are identified by their nameserver domain name. The whole
/// value is immutable once assembled and shared read-only by the rest
/// of the pipeline.
#[derive(Debug)]
pub struct Config {
    roots: Vec<dns::Name>,
    servers: BTreeSet<dns::Name>,
    zones: Vec<Zone>,
    by_server: HashMap<dns::Name, Vec<usize>>,
    addrs: HashMap<dns::Name, Vec<dns::Record>>,
}

impl Config {
    /// Assemble a [`Config`] from parsed metadata: every referenced zone
    /// file is parsed once per hosting server. A missing file is logged
    /// and stands in as an empty zone, because an absent zone is one of
    /// the misconfigurations the verification may have to surface.
    pub fn assemble(metadata: &Metadata, zone_files_dir: &Path) -> Result<Self, String> {
        let mut roots = vec![];
        for root in &metadata.top_name_servers {
            let root = dns::Name::from_string(root).map_err(|err| format!("{:?}", err))?;
            if !roots.contains(&root) {
                roots.push(root);
            }
        }

        let mut zones = vec![];
        for zone_file in &metadata.zone_files {
            let origin = zone_file.origin_name()?;
            let file_path = zone_files_dir.join(&zone_file.file_name);
            for server in zone_file.name_server.iter() {
                let server = dns::Name::from_string(server).map_err(|err| format!("{:?}", err))?;
                if !file_path.exists() {
                    log::warn!(
                        "Zone file {:?} not found, registering '{}' on '{}' as empty",
                        file_path,
                        origin,
                        server
                    );
                    zones.push(Zone::new(&origin, &server));
                    continue;
                }
                let params = ParsingParams {
                    file_path: file_path.to_string_lossy().to_string(),
                    origin: origin.clone(),
                    server,
                    starting_ttl: 3600,
                };
                match parse_zone_file(&params) {
                    Ok(zone) => zones.push(zone),
                    Err((err, ctx)) => return Err(format!("{:?} ({})", err, ctx)),
                }
            }
        }

        Ok(Config::new(roots, zones))
    }

    /// Build a [`Config`] from already-assembled zones. The servers set
    /// contains every hosting server plus the declared roots.
    pub fn new(roots: Vec<dns::Name>, zones: Vec<Zone>) -> Self {
        let mut servers: BTreeSet<dns::Name> = roots.iter().cloned().collect();
        let mut by_server: HashMap<dns::Name, Vec<usize>> = HashMap::new();
        for (idx, zone) in zones.iter().enumerate() {
            servers.insert(zone.server.clone());
            by_server.entry(zone.server.clone()).or_default().push(idx);
        }

        // Address records of the whole configuration, indexed by owner:
        // the glue candidates attached to referrals.
        let mut addrs: HashMap<dns::Name, Vec<dns::Record>> = HashMap::new();
        for zone in &zones {
            for rtype in [dns::RecordType::A, dns::RecordType::AAAA] {
                for record in zone.get_all_of_type(rtype) {
                    let known = addrs.entry(record.node.clone()).or_default();
                    if !known.contains(record) {
                        known.push(record.clone());
                    }
                }
            }
        }

        Config { roots, servers, zones, by_server, addrs }
    }

    /// The root (entry) servers every resolution starts from.
    pub fn roots(&self) -> &[dns::Name] {
        &self.roots
    }

    /// All the server identifiers of the configuration.
    pub fn servers(&self) -> &BTreeSet<dns::Name> {
        &self.servers
    }

    /// All the zone replicas of the configuration.
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Reports if the passed name identifies a server of the configuration
    /// hosting at least one zone.
    pub fn is_known_server(&self, server: &dns::Name) -> bool {
        self.by_server.contains_key(server)
    }

    /// Find the best zone for a query on a server: among the zones the
    /// server hosts whose origin is a suffix of the query name, the one
    /// with the longest origin. `None` means the server is authoritative
    /// for no suffix of the query and must refuse it.
    pub fn find_zone(&self, server: &dns::Name, query: &dns::Name) -> Option<&Zone> {
        let hosted = self.by_server.get(server)?;
        let mut best: Option<&Zone> = None;
        for &idx in hosted {
            let zone = &self.zones[idx];
            if !query.is_in_zone(&zone.origin) {
                continue;
            }
            match best {
                Some(found) if found.origin.len() >= zone.origin.len() => {}
                _ => best = Some(zone),
            }
        }
        best
    }

    /// The address records owned by the passed name anywhere in the
    /// configuration, for glue synthesis.
    pub fn addresses_of(&self, owner: &dns::Name) -> &[dns::Record] {
        self.addrs.get(owner).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::dns::{Class, RData, Record, RecordType};
    use std::net::{IpAddr, Ipv4Addr};

    fn name(s: &str) -> dns::Name {
        dns::Name::from_string(s).unwrap()
    }

    fn addr_record(node: &str, ip: [u8; 4]) -> Record {
        Record::new(
            name(node),
            RecordType::A,
            Class::IN,
            300,
            RData::Addr(IpAddr::V4(Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]))),
        )
    }

    #[test]
    fn test_find_zone_longest_suffix() {
        let server = name("ns1.example.");
        let mut parent = Zone::new(&name("example."), &server);
        parent.insert(addr_record("a.example.", [1, 1, 1, 1]));
        let mut child = Zone::new(&name("sub.example."), &server);
        child.insert(addr_record("a.sub.example.", [2, 2, 2, 2]));

        let config = Config::new(vec![server.clone()], vec![parent, child]);

        let found = config.find_zone(&server, &name("x.sub.example.")).unwrap();
        assert_eq!(found.origin, name("sub.example."));
        let found = config.find_zone(&server, &name("x.example.")).unwrap();
        assert_eq!(found.origin, name("example."));
        assert!(config.find_zone(&server, &name("x.other.")).is_none());
        assert!(config.find_zone(&name("unknown."), &name("x.example.")).is_none());
    }

    #[test]
    fn test_address_index() {
        let server = name("ns1.example.");
        let mut zone = Zone::new(&name("example."), &server);
        zone.insert(addr_record("ns1.example.", [1, 2, 3, 4]));
        zone.insert(addr_record("ns1.example.", [1, 2, 3, 4]));

        let config = Config::new(vec![server], vec![zone]);
        let addrs = config.addresses_of(&name("ns1.example."));
        assert_eq!(addrs.len(), 1, "duplicates are collapsed");
        assert!(config.addresses_of(&name("missing.example.")).is_empty());
    }
}
