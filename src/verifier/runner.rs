use crate::shared::log;
use crate::shared::thread_pool::ThreadPool;
use crate::shared::dns;
use crate::verifier::checks::*;
use crate::verifier::conf::*;
use crate::verifier::config::Config;
use crate::verifier::ecs::{generate_ecs, EquivalenceClass};
use crate::verifier::graph::build_graph;
use crate::verifier::report::Report;
use crate::verifier::trie::LabelTrie;
use std::path::Path;
use std::sync::{Arc, Mutex};

// A job with its scope resolved and its properties instantiated.
#[derive(Debug)]
struct ScopedJob {
    domain: dns::Name,
    sub_domain: bool,
    properties: Vec<Property>,
}

impl ScopedJob {
    fn covers(&self, domain: &dns::Name) -> bool {
        if self.sub_domain {
            domain.is_in_zone(&self.domain)
        } else {
            domain == &self.domain
        }
    }
}

/// Run a whole verification over an input directory holding
/// `zone_files/metadata.json` (or `metadata.json` directly) and an
/// optional `jobs.json`. Returns the final [`Report`]; an error means
/// the inputs were structurally unreadable.
pub fn run_verification(input_dir: &Path, conf: &VerifierConf) -> Result<Report, String> {
    let zone_files_dir = input_dir.join("zone_files");
    let metadata_path = if zone_files_dir.join("metadata.json").exists() {
        zone_files_dir.join("metadata.json")
    } else {
        input_dir.join("metadata.json")
    };
    let zone_files_dir = metadata_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input_dir.to_path_buf());

    let metadata = Metadata::from_file(&metadata_path)
        .map_err(|err| format!("parsing {:?}: {}", metadata_path, err))?;
    let config = Config::assemble(&metadata, &zone_files_dir)?;

    let jobs_path = input_dir.join("jobs.json");
    let jobs = if jobs_path.exists() {
        load_jobs(&jobs_path).map_err(|err| format!("parsing {:?}: {}", jobs_path, err))?
    } else {
        log::info!("No jobs file found, checking the default properties");
        default_jobs()
    };

    Ok(verify(Arc::new(config), &jobs, conf))
}

/// Verify a configuration against a set of jobs: build the label trie,
/// enumerate the equivalence classes, resolve every class in scope of
/// some job and evaluate the requested properties. The returned report
/// is deterministic regardless of the worker thread count.
pub fn verify(config: Arc<Config>, jobs: &[Job], conf: &VerifierConf) -> Report {
    let scoped = scope_jobs(jobs);

    let trie = LabelTrie::build(&config);
    let ecs = generate_ecs(&trie, conf);
    log::info!(
        "Configuration has {} zones on {} servers, {} equivalence classes",
        config.zones().len(),
        config.servers().len(),
        ecs.len()
    );

    let mut violations = vec![];

    // Structural properties run once over the zones.
    for job in &scoped {
        for property in &job.properties {
            if property.is_structural() {
                check_delegation_consistency(&config, &job.domain, job.sub_domain, &mut violations);
            }
        }
    }

    // Per-EC properties: each class in scope of some job is resolved
    // into its interpretation graph and checked. Classes are
    // independent, so they can go to a worker pool.
    let scoped = Arc::new(scoped);
    if conf.threads <= 1 {
        for ec in &ecs {
            check_class(&config, &scoped, ec, conf, &mut violations);
        }
    } else {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let pool = ThreadPool::new(conf.threads, "ec-workers");
        for ec in &ecs {
            if !scoped.iter().any(|job| job.covers(&ec.domain)) {
                continue;
            }
            let config = Arc::clone(&config);
            let scoped = Arc::clone(&scoped);
            let sink = Arc::clone(&sink);
            let ec = ec.clone();
            let conf = conf.clone();
            pool.execute(move || {
                let mut local = vec![];
                check_class(&config, &scoped, &ec, &conf, &mut local);
                sink.lock().unwrap().extend(local);
            });
        }
        // Dropping the pool joins the workers once the queue drains.
        drop(pool);
        let mut sink = sink.lock().unwrap();
        violations.append(&mut sink);
    }

    violations.sort();
    violations.dedup();
    Report {
        violations,
        zones_parsed: config.zones().len(),
        ec_count: ecs.len(),
    }
}

// Check one equivalence class against every job covering it.
fn check_class(
    config: &Config,
    jobs: &[ScopedJob],
    ec: &EquivalenceClass,
    conf: &VerifierConf,
    out: &mut Vec<Violation>,
) {
    let properties: Vec<&Property> = jobs
        .iter()
        .filter(|job| job.covers(&ec.domain))
        .flat_map(|job| job.properties.iter())
        .filter(|property| !property.is_structural())
        .collect();
    if properties.is_empty() {
        return;
    }

    let graph = build_graph(config, ec, conf);
    for property in properties {
        check_graph(property, ec, &graph, out);
    }
}

// Resolve job scopes and instantiate their properties. A job with an
// invalid domain or a property the checker does not know is logged and
// skipped, not fatal.
fn scope_jobs(jobs: &[Job]) -> Vec<ScopedJob> {
    let mut scoped = vec![];
    for job in jobs {
        let domain = match dns::Name::from_string(&job.domain) {
            Ok(domain) => domain,
            Err(err) => {
                log::warn!("Job domain '{}' invalid: {:?}, job skipped", job.domain, err);
                continue;
            }
        };
        let mut properties = vec![];
        for property_conf in &job.properties {
            match Property::from_conf(property_conf) {
                Ok(property) => properties.push(property),
                Err(err) => log::warn!("Property skipped: {}", err),
            }
        }
        scoped.push(ScopedJob { domain, sub_domain: job.sub_domain, properties });
    }
    scoped
}

// The properties checked when no jobs file is present.
fn default_jobs() -> Vec<Job> {
    let property = |name: &str| PropertyConf {
        name: name.to_string(),
        types: None,
        value: None,
    };
    vec![Job {
        domain: ".".to_string(),
        sub_domain: true,
        properties: vec![
            property("LameDelegation"),
            property("RewriteBlackholing"),
            property("DelegationConsistency"),
        ],
    }]
}
