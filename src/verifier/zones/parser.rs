use crate::shared::dns;
use crate::shared::log;
use crate::verifier::zones::errors::*;
use crate::verifier::zones::tokens::*;
use crate::verifier::zones::utils::*;
use std::collections::{HashMap, HashSet};
use std::net;
use std::str::FromStr;

/// The configuration options to be specified when parsing a zone file
/// via [parse_zone_file].
#[derive(Debug)]
pub struct ParsingParams {
    pub file_path: String,
    pub origin: dns::Name,
    pub server: dns::Name,
    pub starting_ttl: u32,
}

/// The records of one zone as served by one authoritative server. The
/// same origin may appear on several servers with different record
/// sets: each replica is its own [`Zone`] value.
#[derive(Debug, Clone)]
pub struct Zone {
    pub origin: dns::Name,
    pub server: dns::Name,
    records: HashMap<dns::Name, HashMap<dns::RecordType, Vec<dns::Record>>>,
    existing: HashSet<dns::Name>,
    all: Vec<dns::Record>,
}

impl Zone {
    /// Create a new, empty [`Zone`] object.
    pub fn new(origin: &dns::Name, server: &dns::Name) -> Self {
        Self {
            origin: origin.clone(),
            server: server.clone(),
            records: Default::default(),
            existing: Default::default(),
            all: vec![],
        }
    }

    /// Insert a new [`dns::Record`] into the zone records collection.
    pub fn insert(&mut self, record: dns::Record) {
        // The owner exists, and so does every in-zone ancestor: empty
        // non-terminals take part in closest-encloser searches.
        let mut node = record.node.clone();
        loop {
            self.existing.insert(node.clone());
            if node == self.origin || !node.is_in_zone(&self.origin) {
                break;
            }
            node = node.parent().unwrap();
        }

        let outer_entry = self.records.entry(record.node.clone());
        let inner_map = outer_entry.or_default();
        let inner_entry = inner_map.entry(record.rtype);
        let records = inner_entry.or_default();
        records.push(record.clone());
        self.all.push(record);
    }

    /// Get the [`dns::Record`]s corresponding to the passed node and record type.
    pub fn get(&self, node: &dns::Name, kind: dns::RecordType) -> Option<&Vec<dns::Record>> {
        let inner_map = self.records.get(node)?;
        let records = inner_map.get(&kind)?;
        debug_assert!(records.iter().all(|r| r.rtype == kind));
        debug_assert!(records.iter().all(|r| &r.node == node));
        assert!(!records.is_empty());
        Some(records)
    }

    /// Reports if the zone owns at least one record at the passed node.
    pub fn owns(&self, node: &dns::Name) -> bool {
        self.records.contains_key(node)
    }

    /// Reports if the node exists in the zone: either it owns records
    /// or it is an empty non-terminal on the path to an owner.
    pub fn exists(&self, node: &dns::Name) -> bool {
        self.existing.contains(node)
    }

    /// Get all [`dns::Record`] of the record type passed in, returned as
    /// references ordered by owner node.
    pub fn get_all_of_type(&self, kind: dns::RecordType) -> Vec<&dns::Record> {
        let mut records: Vec<&dns::Record> = self
            .records
            .iter()
            .filter_map(|(_, r)| r.get(&kind))
            .flatten()
            .collect();
        records.sort_by(|a, b| (&a.node, a.to_string()).cmp(&(&b.node, b.to_string())));
        records
    }

    /// All the records of the zone, in file order.
    pub fn records(&self) -> &[dns::Record] {
        &self.all
    }

    /// The SOA record of the zone, if one was parsed.
    pub fn soa(&self) -> Option<&dns::Record> {
        self.get(&self.origin, dns::RecordType::SOA).map(|rs| &rs[0])
    }

    /// The number of records held by the zone.
    pub fn len(&self) -> usize {
        self.all.len()
    }
}

// Mutable state threaded through the parsing of one file: the active
// origin, the ttl and owner inherited by the following entries.
#[derive(Debug)]
struct ParsingState {
    current_orig: dns::Name,
    current_ttl: u32,
    last_owner: dns::Name,
}

/// Representation of the different types of entries expected in a zone file.
#[derive(Debug)]
enum ZoneEntry {
    Origin(dns::Name),
    Ttl(u32),
    Record(dns::Record),
}

/// Parse a zone file in master-file format, returning the [`Zone`] with
/// its records. The parser is deliberately tolerant: a malformed line is
/// logged and skipped, since broken zone data is exactly what the
/// verification pipeline downstream is meant to examine. Only an I/O
/// failure aborts the file.
pub fn parse_zone_file(params: &ParsingParams) -> Result<Zone, ParseErrCtx> {
    log::info!("Parsing zone file {:?}", params.file_path);
    let mut tokenizer = match Tokenizer::from_file(&params.file_path) {
        Err(err) => return Err((ParseErr::ReadingErr(err), params.file_path.to_string())),
        Ok(v) => v,
    };

    let mut state = ParsingState {
        current_orig: params.origin.clone(),
        current_ttl: params.starting_ttl,
        last_owner: params.origin.clone(),
    };

    let mut zone = Zone::new(&params.origin, &params.server);
    loop {
        // Peek only. All tokens are needed to parse the file entry.
        let line = tokenizer.line();
        let next_token = match tokenizer.peek() {
            Ok(Token::End) => break,
            Ok(v) => v,
            Err(err) => {
                let err = ParseErr::from(err);
                if err.is_fatal() {
                    return Err((err, params.file_path.to_string()));
                }
                log::warn!("{}, line {}: {:?}, line skipped", params.file_path, line, err);
                tokenizer.skip_line();
                continue;
            }
        };

        // Analyze the first token and start the proper parsing process.
        let line = tokenizer.line();
        let entry = match &next_token {
            Token::NewLine => {
                tokenizer.next().unwrap();
                continue;
            }
            Token::OriginDir => parse_origin(&mut tokenizer, &state),
            Token::TtlDir => parse_ttl(&mut tokenizer),
            Token::String(_) => parse_record(&mut tokenizer, &state),
            Token::Number(_) => parse_record(&mut tokenizer, &state),
            Token::At => parse_record(&mut tokenizer, &state),
            Token::Blank => parse_record(&mut tokenizer, &state),
            _ => Err(ParseErr::UnexpectedToken(next_token)),
        };
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err.is_fatal() {
                    return Err((err, params.file_path.to_string()));
                }
                log::warn!("{}, line {}: {:?}, line skipped", params.file_path, line, err);
                tokenizer.skip_line();
                continue;
            }
        };

        // Take the correct action based on the entry type.
        log::debug!("Line {}: {:?}", line, entry);
        match entry {
            ZoneEntry::Origin(origin) => state.current_orig = origin,
            ZoneEntry::Ttl(ttl) => state.current_ttl = ttl,
            ZoneEntry::Record(record) => {
                if let Err(err) = accept_record(&zone, &record) {
                    log::warn!("{}, line {}: {:?}, line skipped", params.file_path, line, err);
                    continue;
                }
                state.current_ttl = record.ttl;
                state.last_owner = record.node.clone();
                zone.insert(record)
            }
        };
    }

    if zone.soa().is_none() {
        log::warn!(
            "Zone '{}' on '{}' has no SOA record, keeping it as structurally incomplete",
            zone.origin,
            zone.server
        );
    }
    Ok(zone)
}

// Validate a parsed record against the zone it is about to enter. The
// owner must live under the zone origin, with the exception of glue
// addresses for delegated nameservers; a zone holds at most one SOA,
// owned by the origin.
fn accept_record(zone: &Zone, record: &dns::Record) -> Result<(), ParseErr> {
    if record.rtype == dns::RecordType::SOA {
        if record.node != zone.origin {
            let err_msg = format!("SOA must be owned by the zone origin '{}'", zone.origin);
            return Err(ParseErr::UnexpectedRecord(err_msg));
        }
        if zone.soa().is_some() {
            let err_msg = format!("zone '{}' already has a SOA record", zone.origin);
            return Err(ParseErr::UnexpectedRecord(err_msg));
        }
    }
    if !record.node.is_in_zone(&zone.origin) && !record.rtype.is_address() {
        let err_msg = format!("owner '{}' outside of zone '{}'", record.node, zone.origin);
        return Err(ParseErr::UnexpectedRecord(err_msg));
    }
    Ok(())
}

/// Parse and validate an 'origin' directive, returning the related [ZoneEntry::Origin].
fn parse_origin(tokenizer: &mut Tokenizer, state: &ParsingState) -> Result<ZoneEntry, ParseErr> {
    assert!(matches!(tokenizer.next(), Ok(Token::OriginDir)));

    let origin = tokenizer.next_after_blanks()?;
    let origin = if let Token::String(mut origin) = origin {
        adjust_name(&state.current_orig, &mut origin)?
    } else {
        return Err(ParseErr::UnexpectedToken(origin));
    };

    let newline = tokenizer.next_after_blanks()?;
    match newline {
        Token::NewLine => Ok(ZoneEntry::Origin(origin)),
        Token::End => Ok(ZoneEntry::Origin(origin)),
        _ => Err(ParseErr::UnexpectedToken(newline)),
    }
}

/// Parse and validate a 'ttl' directive, returning the related [ZoneEntry::Ttl].
fn parse_ttl(tokenizer: &mut Tokenizer) -> Result<ZoneEntry, ParseErr> {
    assert!(matches!(tokenizer.next(), Ok(Token::TtlDir)));

    let ttl = tokenizer.next_after_blanks()?;
    let ttl = if let Token::Number(n) = ttl {
        n
    } else {
        return Err(ParseErr::UnexpectedToken(ttl));
    };

    let newline = tokenizer.next_after_blanks()?;
    match newline {
        Token::NewLine => Ok(ZoneEntry::Ttl(ttl)),
        Token::End => Ok(ZoneEntry::Ttl(ttl)),
        _ => Err(ParseErr::UnexpectedToken(newline)),
    }
}

/// Parse and validate a 'record' entry, returning the related [ZoneEntry::Record].
/// Records starting with '@' are assigned to the active origin, records starting
/// with a blank inherit the previous owner name.
fn parse_record(tokenizer: &mut Tokenizer, state: &ParsingState) -> Result<ZoneEntry, ParseErr> {
    let node = match tokenizer.next() {
        Ok(Token::Blank) => state.last_owner.clone(),
        Ok(Token::At) => state.current_orig.clone(),
        Ok(Token::String(mut name)) => adjust_name(&state.current_orig, &mut name)?,
        // Purely numeric labels are valid owners and come out of the
        // tokenizer as numbers.
        Ok(Token::Number(n)) => adjust_name(&state.current_orig, &mut n.to_string())?,
        _ => unreachable!(),
    };

    // Parse and validate TTL, class and record type.
    let (ttl, class) = parse_ttl_class(tokenizer)?;
    let class = class.unwrap_or(dns::Class::IN);
    let ttl = ttl.unwrap_or(state.current_ttl);
    if !class.is_supported() {
        let err_msg = format!("class '{:?}' not supported", class);
        return Err(ParseErr::MalformedData(err_msg));
    }

    let record_type = tokenizer.next_after_blanks()?;
    let record_type = match record_type {
        Token::String(s) => s,
        _ => return Err(ParseErr::UnexpectedToken(record_type)),
    };
    let record_type = match dns::RecordType::from_str(&record_type.to_uppercase()) {
        Err(_) => return Err(ParseErr::UnknownType(record_type)),
        Ok(v) => v,
    };

    // Parse the record data and compose the complete record.
    let origin = &state.current_orig;
    let rdata = match record_type {
        dns::RecordType::A => parse_a_data(tokenizer)?,
        dns::RecordType::AAAA => parse_aaaa_data(tokenizer)?,
        dns::RecordType::NS => parse_name_data(tokenizer, origin)?,
        dns::RecordType::CNAME => parse_name_data(tokenizer, origin)?,
        dns::RecordType::DNAME => parse_name_data(tokenizer, origin)?,
        dns::RecordType::PTR => parse_name_data(tokenizer, origin)?,
        dns::RecordType::SOA => parse_soa_data(tokenizer, origin)?,
        dns::RecordType::MX => parse_mx_data(tokenizer, origin)?,
        dns::RecordType::SRV => parse_srv_data(tokenizer, origin)?,
        dns::RecordType::TXT => parse_txt_data(tokenizer)?,
    };

    let next = tokenizer.next_after_blanks()?;
    let record = dns::Record::new(node, record_type, class, ttl, rdata);
    match next {
        Token::NewLine => Ok(ZoneEntry::Record(record)),
        Token::End => Ok(ZoneEntry::Record(record)),
        _ => Err(ParseErr::UnexpectedToken(next)),
    }
}

fn parse_a_data(tokens: &mut Tokenizer) -> Result<dns::RData, ParseErr> {
    let ip = tokens.next_after_blanks()?;
    let address = if let Token::String(s) = &ip {
        match net::Ipv4Addr::from_str(s) {
            Err(err) => return Err(ParseErr::MalformedData(err.to_string())),
            Ok(ip) => net::IpAddr::V4(ip),
        }
    } else {
        return Err(ParseErr::UnexpectedToken(ip));
    };
    Ok(dns::RData::Addr(address))
}

fn parse_aaaa_data(tokens: &mut Tokenizer) -> Result<dns::RData, ParseErr> {
    let ip = tokens.next_after_blanks()?;
    let address = if let Token::String(s) = &ip {
        match net::Ipv6Addr::from_str(s) {
            Err(err) => return Err(ParseErr::MalformedData(err.to_string())),
            Ok(ip) => net::IpAddr::V6(ip),
        }
    } else {
        return Err(ParseErr::UnexpectedToken(ip));
    };
    Ok(dns::RData::Addr(address))
}

// NS, CNAME, DNAME and PTR all carry a single domain name.
fn parse_name_data(tokens: &mut Tokenizer, origin: &dns::Name) -> Result<dns::RData, ParseErr> {
    let name = tokens.next_after_blanks()?;
    let name = match name {
        Token::At => origin.clone(),
        Token::String(mut s) => adjust_name(origin, &mut s)?,
        _ => return Err(ParseErr::UnexpectedToken(name)),
    };
    Ok(dns::RData::Name(name))
}

fn parse_soa_data(tokens: &mut Tokenizer, origin: &dns::Name) -> Result<dns::RData, ParseErr> {
    let token = tokens.next_after_blanks()?;
    let mname = if let Token::String(mut name) = token {
        adjust_name(origin, &mut name)?
    } else {
        return Err(ParseErr::UnexpectedToken(token));
    };

    let token = tokens.next_after_blanks()?;
    let rname = if let Token::String(mut name) = token {
        adjust_name(origin, &mut name)?
    } else {
        return Err(ParseErr::UnexpectedToken(token));
    };

    let mut zone_auth_params = [0_u32; 5];
    for param in zone_auth_params.iter_mut() {
        let next = tokens.next_after_blanks()?;
        if let Token::Number(n) = next {
            *param = n;
        } else {
            return Err(ParseErr::UnexpectedToken(next));
        }
    }

    Ok(dns::RData::Soa(dns::SoaData {
        mname,
        rname,
        serial: zone_auth_params[0],
        refresh: zone_auth_params[1],
        retry: zone_auth_params[2],
        expire: zone_auth_params[3],
        minimum: zone_auth_params[4],
    }))
}

fn parse_mx_data(tokens: &mut Tokenizer, origin: &dns::Name) -> Result<dns::RData, ParseErr> {
    let next = tokens.next_after_blanks()?;
    let preference = if let Token::Number(num) = next {
        num.try_into().or(Err(ParseErr::MalformedData(num.to_string())))?
    } else {
        return Err(ParseErr::UnexpectedToken(next));
    };

    let next = tokens.next_after_blanks()?;
    let name = if let Token::String(mut mail) = next {
        adjust_name(origin, &mut mail)?
    } else {
        return Err(ParseErr::UnexpectedToken(next));
    };

    Ok(dns::RData::Mx { preference, name })
}

fn parse_srv_data(tokens: &mut Tokenizer, origin: &dns::Name) -> Result<dns::RData, ParseErr> {
    let mut numbers = [0_u16; 3];
    for number in numbers.iter_mut() {
        let next = tokens.next_after_blanks()?;
        if let Token::Number(n) = next {
            *number = n.try_into().or(Err(ParseErr::MalformedData(n.to_string())))?;
        } else {
            return Err(ParseErr::UnexpectedToken(next));
        }
    }

    let next = tokens.next_after_blanks()?;
    let name = if let Token::String(mut target) = next {
        adjust_name(origin, &mut target)?
    } else {
        return Err(ParseErr::UnexpectedToken(next));
    };

    Ok(dns::RData::Srv {
        priority: numbers[0],
        weight: numbers[1],
        port: numbers[2],
        name,
    })
}

fn parse_txt_data(tokenizer: &mut Tokenizer) -> Result<dns::RData, ParseErr> {
    let mut txts = vec![];
    loop {
        let next = tokenizer.peek_after_blanks()?;
        match next {
            Token::NewLine => break,
            Token::End => break,
            tok => {
                tokenizer.next_after_blanks().unwrap();
                let txt = parse_char_string(tok)?;
                txts.push(txt);
            }
        };
    }
    Ok(dns::RData::Txt(txts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::log::{init_log, LogLevel};
    use std::net::{IpAddr, Ipv4Addr};
    use std::{env, fs};

    fn write_zone(name: &str, content: &str) -> String {
        let path = env::temp_dir().join(format!("minos-parser-{}-{}", std::process::id(), name));
        fs::write(&path, content).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn parse(name: &str, origin: &str, content: &str) -> Zone {
        init_log(LogLevel::Error);
        let params = ParsingParams {
            file_path: write_zone(name, content),
            origin: dns::Name::from_string(origin).unwrap(),
            server: dns::Name::from_string("ns1.example.").unwrap(),
            starting_ttl: 3600,
        };
        parse_zone_file(&params).unwrap()
    }

    #[test]
    fn test_parse_simple_zone() {
        let zone = parse(
            "simple",
            "example.",
            "$ORIGIN example.\n\
             @ 300 IN SOA ns1.example. host.example. 1 2 3 4 5\n\
             @ IN NS ns1.example.\n\
             ns1 IN A 1.2.3.4\n\
             www IN CNAME ns1.example. ; alias\n",
        );

        assert_eq!(zone.len(), 4);
        assert!(zone.soa().is_some());
        let ns1 = dns::Name::from_string("ns1.example.").unwrap();
        let a = zone.get(&ns1, dns::RecordType::A).unwrap();
        assert_eq!(a[0].rdata, dns::RData::Addr(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))));
        assert_eq!(a[0].ttl, 300, "ttl inherited from the previous record");

        let www = dns::Name::from_string("www.example.").unwrap();
        let cname = zone.get(&www, dns::RecordType::CNAME).unwrap();
        assert_eq!(cname[0].name_data(), &ns1);
    }

    #[test]
    fn test_parse_directives_and_multiline() {
        let zone = parse(
            "directives",
            "example.",
            "$TTL 120\n\
             @ IN SOA ns1.example. host.example. (\n\
                 1 ; serial\n\
                 2 3 4 5 )\n\
             sub IN NS ns1.sub.example.\n",
        );

        let soa = zone.soa().unwrap();
        assert_eq!(soa.ttl, 120);
        assert_eq!(soa.soa_data().serial, 1);
        assert_eq!(soa.soa_data().minimum, 5);

        let sub = dns::Name::from_string("sub.example.").unwrap();
        assert!(zone.get(&sub, dns::RecordType::NS).is_some());
    }

    #[test]
    fn test_blank_owner_inherits_previous() {
        let content = concat!(
            "@ IN SOA ns1.example. host.example. 1 2 3 4 5\n",
            "child IN NS ns1.child.example.\n",
            "      IN NS ns2.child.example.\n",
        );
        let zone = parse("blanks", "example.", content);

        let child = dns::Name::from_string("child.example.").unwrap();
        let ns = zone.get(&child, dns::RecordType::NS).unwrap();
        assert_eq!(ns.len(), 2);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let zone = parse(
            "tolerant",
            "example.",
            "@ IN SOA ns1.example. host.example. 1 2 3 4 5\n\
             bad IN A not-an-address\n\
             worse IN WKS 1.2.3.4 TCP\n\
             other.org. IN NS ns.other.org.\n\
             good IN A 9.9.9.9\n",
        );

        // SOA plus the one good address; the rest warned and skipped.
        assert_eq!(zone.len(), 2);
        let good = dns::Name::from_string("good.example.").unwrap();
        assert!(zone.get(&good, dns::RecordType::A).is_some());
    }

    #[test]
    fn test_glue_outside_zone_is_kept() {
        let zone = parse(
            "glue",
            "cc.il.us.",
            "@ IN SOA ns1.cc.il.us. host.cc.il.us. 1 2 3 4 5\n\
             richland IN NS ns1.richland.cc.il.us.\n\
             ns1.richland.cc.il.us. IN A 1.2.3.4\n\
             out.of.zone.net. IN A 4.4.4.4\n",
        );

        let glue = dns::Name::from_string("out.of.zone.net.").unwrap();
        assert!(zone.get(&glue, dns::RecordType::A).is_some());
    }

    #[test]
    fn test_second_soa_is_rejected() {
        let zone = parse(
            "twosoa",
            "example.",
            "@ IN SOA ns1.example. host.example. 1 2 3 4 5\n\
             @ IN SOA ns2.example. host.example. 9 2 3 4 5\n",
        );

        assert_eq!(zone.len(), 1);
        assert_eq!(zone.soa().unwrap().soa_data().serial, 1);
    }
}
