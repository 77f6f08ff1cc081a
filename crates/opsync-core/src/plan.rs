use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::config::PlanConfig;
use crate::error::ConfigError;

/// A deployment variant of the API, derived from a description directory name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Directory name, e.g. `ghes-3.10`.
    pub dir: String,
    /// Plan name captured by the pattern, e.g. `ghes`.
    pub name: String,
    /// Index of the pattern that matched; lower sorts first.
    pub priority: usize,
    pub major: u32,
    pub minor: u32,
}

impl Plan {
    /// Path of the description file inside the descriptions directory.
    pub fn file_path(&self, descriptions_dir: &str) -> String {
        format!("{descriptions_dir}/{dir}/{dir}.json", dir = self.dir)
    }

    /// Pattern order ascending, then newest release first.
    pub fn sort_order(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.major.cmp(&self.major))
            .then_with(|| other.minor.cmp(&self.minor))
    }
}

/// Which product an operation is available in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Availability {
    Public,
    EnterpriseCloud,
    EnterpriseServer,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Public => "public",
            Availability::EnterpriseCloud => "enterprise-cloud",
            Availability::EnterpriseServer => "enterprise-server",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled plan patterns.
#[derive(Debug, Clone)]
pub struct PlanMatcher {
    patterns: Vec<Regex>,
    min_server_major: u32,
    server_plan: String,
}

impl PlanMatcher {
    pub fn new(config: &PlanConfig) -> Result<Self, ConfigError> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidPattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            min_server_major: config.min_server_major,
            server_plan: config.server_plan.clone(),
        })
    }

    /// Match a directory name against the patterns; first match wins.
    ///
    /// Returns `None` for unknown directories and for enterprise-server
    /// releases older than the supported minimum.
    pub fn match_dir(&self, dir: &str) -> Option<Plan> {
        for (priority, pattern) in self.patterns.iter().enumerate() {
            let Some(caps) = pattern.captures(dir) else {
                continue;
            };
            let name = caps.name("plan").map(|m| m.as_str()).unwrap_or(dir);
            let version = |group: &str| -> u32 {
                caps.name(group)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(0)
            };
            let plan = Plan {
                dir: dir.to_string(),
                name: name.to_string(),
                priority,
                major: version("major"),
                minor: version("minor"),
            };
            if plan.name == self.server_plan && plan.major < self.min_server_major {
                return None;
            }
            return Some(plan);
        }
        None
    }

    /// Match and sort a directory listing.
    pub fn select(&self, dirs: &[String]) -> Vec<Plan> {
        let mut plans: Vec<Plan> = dirs.iter().filter_map(|d| self.match_dir(d)).collect();
        plans.sort_by(|a, b| a.sort_order(b));
        plans
    }

    /// Whether a description file belongs to an enterprise-server plan.
    pub fn is_server_file(&self, file: &str) -> bool {
        self.plan_of_file(file)
            .is_some_and(|plan| plan.name == self.server_plan)
    }

    /// Map a description file path back to the plan that produced it.
    pub fn plan_of_file(&self, file: &str) -> Option<Plan> {
        let mut parts = file.rsplit('/');
        let _file_name = parts.next()?;
        let dir = parts.next()?;
        self.patterns
            .iter()
            .enumerate()
            .find_map(|(priority, pattern)| {
                let caps = pattern.captures(dir)?;
                Some(Plan {
                    dir: dir.to_string(),
                    name: caps.name("plan")?.as_str().to_string(),
                    priority,
                    major: 0,
                    minor: 0,
                })
            })
    }

    /// Availability of an operation found in the given files.
    pub fn availability(&self, files: &[String]) -> Vec<Availability> {
        let mut out: Vec<Availability> = files
            .iter()
            .filter_map(|f| self.plan_of_file(f))
            .map(|plan| match plan.priority {
                0 => Availability::Public,
                _ if plan.name == self.server_plan => Availability::EnterpriseServer,
                _ => Availability::EnterpriseCloud,
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }
}
