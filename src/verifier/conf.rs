use crate::shared::dns;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// The metadata describing a dataset: the root (entry) nameservers and
/// the zone files with their hosting servers. The file must be
/// JSON-encoded; for every field both the historical and the snake_case
/// key spellings are accepted.
#[derive(Debug, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "TopNameServers", alias = "root_nameservers")]
    pub top_name_servers: Vec<String>,
    #[serde(rename = "ZoneFiles", alias = "zones")]
    pub zone_files: Vec<ZoneFileConf>,
}

/// One zone file entry of the [`Metadata`].
#[derive(Debug, Serialize, Deserialize)]
pub struct ZoneFileConf {
    #[serde(rename = "FileName", alias = "file_name")]
    pub file_name: String,
    #[serde(rename = "NameServer", alias = "authoritative_servers")]
    pub name_server: NameServers,
    #[serde(rename = "Origin", alias = "domain_name", default)]
    pub origin: Option<String>,
}

/// The servers hosting a zone file, accepted both as a single string
/// and as a list.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NameServers {
    One(String),
    Many(Vec<String>),
}

impl NameServers {
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        match self {
            NameServers::One(s) => std::slice::from_ref(s).iter(),
            NameServers::Many(v) => v.iter(),
        }
    }
}

impl Metadata {
    /// Read and parse the metadata values from a file. The file must
    /// be JSON-encoded and follow the organization of the [Metadata]
    /// struct.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let file_bytes = match fs::read_to_string(path) {
            Err(err) => return Err(err.to_string()),
            Ok(v) => v,
        };
        let metadata = match serde_json::from_str::<Self>(&file_bytes) {
            Err(err) => return Err(err.to_string()),
            Ok(metadata) => metadata,
        };
        match metadata.validate() {
            Ok(_) => Ok(metadata),
            Err(err) => Err(err),
        }
    }

    /// Validate a metadata struct against some common errors.
    fn validate(&self) -> Result<(), String> {
        if self.top_name_servers.is_empty() {
            return Err("no top nameservers declared".to_string());
        }
        for server in &self.top_name_servers {
            if let Err(err) = dns::Name::from_string(server) {
                return Err(format!("top nameserver '{}' invalid: {:?}", server, err));
            }
        }
        for zone_file in &self.zone_files {
            for server in zone_file.name_server.iter() {
                if let Err(err) = dns::Name::from_string(server) {
                    return Err(format!("nameserver '{}' invalid: {:?}", server, err));
                }
            }
            if let Some(origin) = &zone_file.origin {
                if let Err(err) = dns::Name::from_string(origin) {
                    return Err(format!("origin '{}' invalid: {:?}", origin, err));
                }
            }
        }
        Ok(())
    }
}

impl ZoneFileConf {
    /// The declared origin of the zone file, derived from the file name
    /// when not explicitly given: the `.txt` extension is stripped, and
    /// so is a trailing `-<digits>` replica marker left by datasets that
    /// carry several copies of the same zone.
    pub fn origin_name(&self) -> Result<dns::Name, String> {
        if let Some(origin) = &self.origin {
            return dns::Name::from_string(origin)
                .map_err(|err| format!("origin '{}' invalid: {:?}", origin, err));
        }

        let mut derived = self.file_name.strip_suffix(".txt").unwrap_or(&self.file_name);
        if !derived.ends_with('.') {
            if let Some(dash) = derived.rfind('-') {
                if derived[dash + 1..].chars().all(|ch| ch.is_ascii_digit()) {
                    derived = &derived[..dash];
                }
            }
        }
        let derived = if derived.ends_with('.') {
            derived.to_string()
        } else {
            format!("{}.", derived)
        };
        dns::Name::from_string(&derived)
            .map_err(|err| format!("derived origin '{}' invalid: {:?}", derived, err))
    }
}

/// A verification job: the domain scope plus the properties to check on
/// it. `SubDomain` extends the scope to every descendant of the domain.
#[derive(Debug, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "Domain")]
    pub domain: String,
    #[serde(rename = "SubDomain", default)]
    pub sub_domain: bool,
    #[serde(rename = "Properties")]
    pub properties: Vec<PropertyConf>,
}

/// One property request of a [`Job`]. `Types` and `Value` payloads are
/// property-specific and validated when the property is instantiated.
#[derive(Debug, Serialize, Deserialize)]
pub struct PropertyConf {
    #[serde(rename = "PropertyName")]
    pub name: String,
    #[serde(rename = "Types", default)]
    pub types: Option<Vec<String>>,
    #[serde(rename = "Value", default)]
    pub value: Option<PropertyValue>,
}

/// The value attached to a property: a bound for counting properties,
/// a list of strings for the others.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Count(u64),
    List(Vec<String>),
}

/// Read and parse the jobs file. Both a single job object and an array
/// of jobs are accepted.
pub fn load_jobs(path: &Path) -> Result<Vec<Job>, String> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum JobsFile {
        Many(Vec<Job>),
        One(Job),
    }

    let file_bytes = match fs::read_to_string(path) {
        Err(err) => return Err(err.to_string()),
        Ok(v) => v,
    };
    match serde_json::from_str::<JobsFile>(&file_bytes) {
        Err(err) => Err(err.to_string()),
        Ok(JobsFile::Many(jobs)) => Ok(jobs),
        Ok(JobsFile::One(job)) => Ok(vec![job]),
    }
}

/// The resolution bounds and knobs of one verification run. Everything
/// is carried explicitly through the pipeline, there is no global
/// configuration state.
#[derive(Debug, Clone)]
pub struct VerifierConf {
    /// Longest query, in labels, enumerated while traversing DNAME
    /// cross-edges of the label trie.
    pub max_query_length: usize,
    /// Fuel of the symbolic execution: paths longer than this many
    /// edges terminate in a DepthExceeded node.
    pub max_depth: usize,
    /// Bound on worklist iterations of one interpretation graph.
    pub max_steps: usize,
    /// Worker threads resolving equivalence classes. With 1 the run is
    /// strictly sequential; the report is identical either way.
    pub threads: usize,
}

impl Default for VerifierConf {
    fn default() -> Self {
        VerifierConf {
            max_query_length: 20,
            max_depth: 15,
            max_steps: 1000,
            threads: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_synonym_keys() {
        let classic = r#"{
            "TopNameServers": ["ns.root."],
            "ZoneFiles": [
                {"FileName": "example..txt", "NameServer": "ns1.example."}
            ]
        }"#;
        let meta = serde_json::from_str::<Metadata>(classic).unwrap();
        assert_eq!(meta.top_name_servers, vec!["ns.root."]);
        assert_eq!(meta.zone_files[0].file_name, "example..txt");

        let synonyms = r#"{
            "root_nameservers": ["ns.root."],
            "zones": [
                {"file_name": "z.txt", "authoritative_servers": ["a.", "b."], "domain_name": "z."}
            ]
        }"#;
        let meta = serde_json::from_str::<Metadata>(synonyms).unwrap();
        let servers: Vec<&String> = meta.zone_files[0].name_server.iter().collect();
        assert_eq!(servers, vec!["a.", "b."]);
        assert_eq!(meta.zone_files[0].origin.as_deref(), Some("z."));
    }

    #[test]
    fn test_origin_derivation() {
        let conf = |file: &str, origin: Option<&str>| ZoneFileConf {
            file_name: file.to_string(),
            name_server: NameServers::One("ns.".to_string()),
            origin: origin.map(str::to_string),
        };

        let explicit = conf("whatever.txt", Some("example."));
        assert_eq!(explicit.origin_name().unwrap().to_string(), "example.");

        let derived = conf("cc.il.us..txt", None);
        assert_eq!(derived.origin_name().unwrap().to_string(), "cc.il.us.");

        let replica = conf("child.richland.cc.il.us.-2.txt", None);
        assert_eq!(
            replica.origin_name().unwrap().to_string(),
            "child.richland.cc.il.us."
        );

        let relative = conf("example.com.txt", None);
        assert_eq!(relative.origin_name().unwrap().to_string(), "example.com.");
    }

    #[test]
    fn test_jobs_parsing() {
        let jobs = r#"[
            {"Domain": "cc.il.us.", "SubDomain": true, "Properties": [
                {"PropertyName": "Rewrites", "Value": 1},
                {"PropertyName": "NameserverContact", "Value": ["edu.", "net."]},
                {"PropertyName": "ResponseValue", "Types": ["A"], "Value": ["1.2.3.4"]}
            ]}
        ]"#;
        let parsed: Vec<Job> = serde_json::from_str(jobs).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].sub_domain);
        assert!(matches!(
            parsed[0].properties[0].value,
            Some(PropertyValue::Count(1))
        ));
        assert!(matches!(
            parsed[0].properties[1].value,
            Some(PropertyValue::List(_))
        ));
        assert_eq!(parsed[0].properties[2].types.as_ref().unwrap(), &vec!["A".to_string()]);
    }
}
