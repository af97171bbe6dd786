//! robots.txt parser
//!
//! Lines are tokenized by the robotstxt crate; this module keeps the `User-agent`,
//! `Disallow` and `Allow` records that apply to this crawler. Rules are literal path
//! prefixes, so wildcard and `Crawl-delay` extensions are ignored.

use crate::robots::rules::{PrefixList, RuleSet};
use chrono::{DateTime, Utc};
use robotstxt::{parse_robotstxt, RobotsParseHandler};
use url::Url;

/// Allow and disallow rules that apply to this crawler on one host
#[derive(Debug, Clone)]
pub struct HostDirectives {
    disallows: RuleSet,
    disallow_rules: PrefixList,
    allows: PrefixList,
    fetched_at: DateTime<Utc>,
    last_access: u64,
}

impl HostDirectives {
    /// Directives that allow every path, used whenever robots.txt is unusable
    pub fn allow_all() -> Self {
        Self {
            disallows: RuleSet::new(),
            disallow_rules: PrefixList::new(),
            allows: PrefixList::new(),
            fetched_at: Utc::now(),
            last_access: 0,
        }
    }

    pub fn add_disallow(&mut self, path: &str) {
        self.disallows.add(path);
        self.disallow_rules.add(path);
    }

    pub fn add_allow(&mut self, path: &str) {
        self.allows.add(path);
    }

    /// Decides whether `path` may be fetched
    ///
    /// The longest matching rule wins; an allow rule as long as the matching
    /// disallow rule wins the tie. Paths no disallow rule matches are allowed.
    pub fn allows(&self, path: &str) -> bool {
        let path = if path.is_empty() { "/" } else { path };

        if !self.disallows.contains_prefix_of(path) {
            return true;
        }

        let disallow = self.disallow_rules.longest_prefix_of(path).map_or(0, str::len);
        self.allows
            .longest_prefix_of(path)
            .is_some_and(|allow| allow.len() >= disallow)
    }

    pub fn is_allow_all(&self) -> bool {
        self.disallows.is_empty()
    }

    /// When robots.txt was fetched for this host
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub(crate) fn last_access(&self) -> u64 {
        self.last_access
    }

    pub(crate) fn touch(&mut self, tick: u64) {
        self.last_access = tick;
    }
}

/// Collects the records of the groups that apply to one agent name
struct DirectivesBuilder {
    agent_name: String,
    directives: HostDirectives,
    in_matching_group: bool,
    reading_agents: bool,
}

impl DirectivesBuilder {
    fn new(user_agent_name: &str) -> Self {
        Self {
            agent_name: user_agent_name.to_lowercase(),
            directives: HostDirectives::allow_all(),
            in_matching_group: false,
            reading_agents: false,
        }
    }

    fn applies_to_me(&self, agent: &str) -> bool {
        let agent = agent.trim().to_lowercase();
        agent == "*" || (!self.agent_name.is_empty() && agent.contains(&self.agent_name))
    }
}

impl RobotsParseHandler for DirectivesBuilder {
    fn handle_robots_start(&mut self) {}

    fn handle_robots_end(&mut self) {}

    fn handle_user_agent(&mut self, _line_num: u32, user_agent: &str) {
        let matches = self.applies_to_me(user_agent);
        if self.reading_agents {
            self.in_matching_group |= matches;
        } else {
            self.in_matching_group = matches;
            self.reading_agents = true;
        }
    }

    fn handle_allow(&mut self, _line_num: u32, value: &str) {
        self.reading_agents = false;
        if self.in_matching_group && !value.trim().is_empty() {
            self.directives.add_allow(&encode_rule_path(value.trim()));
        }
    }

    fn handle_disallow(&mut self, _line_num: u32, value: &str) {
        self.reading_agents = false;
        if self.in_matching_group && !value.trim().is_empty() {
            self.directives.add_disallow(&encode_rule_path(value.trim()));
        }
    }

    fn handle_sitemap(&mut self, _line_num: u32, _value: &str) {}

    fn handle_unknown_action(&mut self, _line_num: u32, _action: &str, _value: &str) {}
}

/// Parses robots.txt content for the given agent name
///
/// A group of consecutive `User-agent` lines applies when one of them is `*` or
/// contains `user_agent_name` (case-insensitive). Rules from every applicable group
/// are merged. An empty `Disallow:` line allows everything and adds no rule.
///
/// # Arguments
///
/// * `content` - The raw robots.txt text
/// * `user_agent_name` - The crawler's robots agent name
///
/// # Returns
///
/// The merged directives for this crawler
pub fn parse(content: &str, user_agent_name: &str) -> HostDirectives {
    let mut builder = DirectivesBuilder::new(user_agent_name);
    parse_robotstxt(content, &mut builder);
    builder.directives
}

/// Brings a rule into the same percent-encoded form that URL paths are compared in
fn encode_rule_path(rule: &str) -> String {
    match Url::parse("http://robots.invalid/") {
        Ok(mut base) => {
            base.set_path(rule);
            base.path().to_string()
        }
        Err(_) => rule.to_string(),
    }
}
