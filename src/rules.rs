use std::net::IpAddr;
use std::time::Duration;

use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::warn;

use crate::dns::{Question, RecordType};

/// Defaults a rule's absent overrides fall back to; sourced from `AppConfig`.
#[derive(Debug, Clone)]
pub struct Defaults {
    pub local_name_server: String,
    pub world_name_server: String,
    pub use_http_query: bool,
    pub query_timeout_ms: u64,
    pub compression_mutation: bool,
}

impl Defaults {
    /// The outcome for queries the rule engine never sees at all (non-A/AAAA
    /// types bypass it and forward directly with plain defaults).
    pub fn passthrough_outcome(&self, question: &Question) -> RuleOutcome {
        passthrough_from_defaults(question, self)
    }
}

/// What the rule engine decided to do with a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    /// Answer directly with this literal IP.
    Synthesize(IpAddr),
    /// Forward under this name instead of the question's own name.
    Redirect(String),
    /// Forward the original query unchanged.
    Passthrough,
}

#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub effective_type: RecordType,
    pub upstream: String,
    pub use_http: bool,
    pub timeout: Duration,
    pub use_mutation: bool,
    pub action: RuleAction,
}

/// One entry of the rule list. `pattern` is matched against the question
/// name; everything else is an optional override of `Defaults`.
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Regex,
    pub address: Option<String>,
    pub name_server: Option<String>,
    pub use_http_query: Option<bool>,
    pub query_timeout_ms: Option<u64>,
    pub compression_mutation: Option<bool>,
    pub force_aaaa: Option<bool>,
}

/// The JSON shape of one `rules.json` entry, compiled into a [`Rule`] at
/// load time (patterns are pre-compiled once, not per query).
#[derive(Debug, Deserialize)]
struct RuleSpec {
    pattern: String,
    address: Option<String>,
    #[serde(rename = "nameServer")]
    name_server: Option<String>,
    #[serde(rename = "useHttpQuery")]
    use_http_query: Option<bool>,
    #[serde(rename = "queryTimeout")]
    query_timeout: Option<u64>,
    #[serde(rename = "compressionMutation")]
    compression_mutation: Option<bool>,
    #[serde(rename = "forceAaaa")]
    force_aaaa: Option<bool>,
}

/// Ordered rule list. Matching walks from the last entry to the first; the
/// first pattern match wins.
#[derive(Debug, Clone, Default)]
pub struct RuleList(Vec<Rule>);

impl RuleList {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self(rules)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn compile(specs: Vec<RuleSpec>) -> Vec<Rule> {
        specs
            .into_iter()
            .filter_map(|spec| match Regex::new(&spec.pattern) {
                Ok(pattern) => Some(Rule {
                    pattern,
                    address: spec.address,
                    name_server: spec.name_server,
                    use_http_query: spec.use_http_query,
                    query_timeout_ms: spec.query_timeout,
                    compression_mutation: spec.compression_mutation,
                    force_aaaa: spec.force_aaaa,
                }),
                Err(e) => {
                    warn!(pattern = %spec.pattern, error = %e, "dropping rule with unparsable pattern");
                    None
                }
            })
            .collect()
    }

    /// Loads `rules.json`. Missing file or parse error yields an empty list,
    /// matching the tolerant loader behavior specified for the core's
    /// external collaborator.
    pub fn load_or_empty(path: &std::path::Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "rules.json unreadable, using empty rule list");
                return Self::empty();
            }
        };
        match serde_json::from_str::<Vec<RuleSpec>>(&contents) {
            Ok(specs) => Self(Self::compile(specs)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "rules.json malformed, using empty rule list");
                Self::empty()
            }
        }
    }

    /// Walks the rule list from the last entry to the first, returning the
    /// first whose pattern matches `question.name`.
    ///
    /// Preserves the source's family-mismatch behavior: when a matching
    /// rule's literal address is of the wrong IP family for the effective
    /// record type, the search does not fall back to earlier rules — it
    /// stops and the query is forwarded with plain defaults, as if nothing
    /// had matched at all.
    pub fn resolve(&self, question: &Question, defaults: &Defaults) -> RuleOutcome {
        for rule in self.0.iter().rev() {
            let Some(captures) = rule.pattern.captures(&question.name) else {
                continue;
            };

            let effective_type = if rule.force_aaaa.unwrap_or(false) {
                RecordType::Aaaa
            } else {
                question.qtype
            };
            let use_http = rule.use_http_query.unwrap_or(defaults.use_http_query);
            let timeout_ms = rule.query_timeout_ms.unwrap_or(defaults.query_timeout_ms);
            let use_mutation = rule
                .compression_mutation
                .unwrap_or(defaults.compression_mutation);

            let action = match &rule.address {
                None => RuleAction::Passthrough,
                Some(address) => match address.parse::<IpAddr>() {
                    Ok(ip) if family_matches(effective_type, ip) => RuleAction::Synthesize(ip),
                    Ok(_) => return passthrough_from_defaults(question, defaults),
                    Err(_) => RuleAction::Redirect(expand_template(address, &captures)),
                },
            };

            let upstream = rule.name_server.clone().unwrap_or_else(|| {
                if use_http {
                    defaults.world_name_server.clone()
                } else {
                    defaults.local_name_server.clone()
                }
            });

            return RuleOutcome {
                effective_type,
                upstream,
                use_http,
                timeout: Duration::from_millis(timeout_ms),
                use_mutation,
                action,
            };
        }

        passthrough_from_defaults(question, defaults)
    }
}

fn family_matches(effective_type: RecordType, ip: IpAddr) -> bool {
    matches!(
        (effective_type, ip),
        (RecordType::A, IpAddr::V4(_)) | (RecordType::Aaaa, IpAddr::V6(_))
    )
}

fn passthrough_from_defaults(question: &Question, defaults: &Defaults) -> RuleOutcome {
    RuleOutcome {
        effective_type: question.qtype,
        upstream: if defaults.use_http_query {
            defaults.world_name_server.clone()
        } else {
            defaults.local_name_server.clone()
        },
        use_http: defaults.use_http_query,
        timeout: Duration::from_millis(defaults.query_timeout_ms),
        use_mutation: defaults.compression_mutation,
        action: RuleAction::Passthrough,
    }
}

/// Positional template substitution: `{0}` is the whole match, `{1}..` are
/// capture groups.
fn expand_template(template: &str, captures: &Captures) -> String {
    let mut out = String::with_capacity(template.len());
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' {
            if let Some(end) = chars[i..].iter().position(|&c| c == '}') {
                let idx_str: String = chars[i + 1..i + end].iter().collect();
                if let Ok(idx) = idx_str.parse::<usize>() {
                    if let Some(m) = captures.get(idx) {
                        out.push_str(m.as_str());
                    }
                    i += end + 1;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}
