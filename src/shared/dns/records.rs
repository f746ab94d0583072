use crate::shared::dns::class::*;
use crate::shared::dns::name::*;
use crate::shared::dns::types::*;
use std::fmt::{self, Display, Formatter};
use std::net::IpAddr;

/// A resource record of a zone. A record refers to a specific node of
/// the name system, describing one resource of a given type. The typed
/// payload lives in the [`RData`] union; the envelope (owner node,
/// class, ttl) is shared by all types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub node: Name,
    pub rtype: RecordType,
    pub class: Class,
    pub ttl: u32,
    pub rdata: RData,
}

/// The typed data part of a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    /// A / AAAA addresses.
    Addr(IpAddr),
    /// NS, CNAME, DNAME and PTR all point at a single domain name.
    Name(Name),
    Soa(SoaData),
    Mx { preference: u16, name: Name },
    Srv { priority: u16, weight: u16, port: u16, name: Name },
    Txt(Vec<String>),
    /// Fallback for rdata kept verbatim.
    Raw(String),
}

/// The start-of-authority payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoaData {
    pub mname: Name,
    pub rname: Name,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl Record {
    pub fn new(node: Name, rtype: RecordType, class: Class, ttl: u32, rdata: RData) -> Self {
        Record { node, rtype, class, ttl, rdata }
    }

    /// Returns the domain name carried in the rdata. Panics if the
    /// [`Record`] type does not carry a name.
    pub fn name_data(&self) -> &Name {
        match &self.rdata {
            RData::Name(name) => name,
            RData::Mx { name, .. } => name,
            RData::Srv { name, .. } => name,
            RData::Soa(soa) => &soa.mname,
            _ => panic!("name_data on {:?}", self.rtype),
        }
    }

    /// Returns the SOA payload. Panics if the [`Record`] is not a SOA.
    pub fn soa_data(&self) -> &SoaData {
        match &self.rdata {
            RData::Soa(soa) => soa,
            _ => panic!("soa_data on {:?}", self.rtype),
        }
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:?} {} {}",
            self.node,
            self.ttl,
            self.class,
            self.rtype.to_str(),
            self.rdata
        )
    }
}

impl Display for RData {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RData::Addr(ip) => write!(f, "{}", ip),
            RData::Name(name) => write!(f, "{}", name),
            RData::Soa(soa) => write!(
                f,
                "{} {} {} {} {} {} {}",
                soa.mname, soa.rname, soa.serial, soa.refresh, soa.retry, soa.expire, soa.minimum
            ),
            RData::Mx { preference, name } => write!(f, "{} {}", preference, name),
            RData::Srv { priority, weight, port, name } => {
                write!(f, "{} {} {} {}", priority, weight, port, name)
            }
            RData::Txt(txts) => {
                let mut first = true;
                for txt in txts {
                    if !first {
                        f.write_str(" ")?;
                    }
                    write!(f, "\"{}\"", txt)?;
                    first = false;
                }
                Ok(())
            }
            RData::Raw(s) => f.write_str(s),
        }
    }
}
