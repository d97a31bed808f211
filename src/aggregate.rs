//! Repository aggregation.
//!
//! The final report and the retention pass both need the set of every
//! repository the run could have touched: the configured defaults plus
//! whatever individual scripts declare. Aggregation works over the
//! descriptors already loaded for the run - scripts are never re-sourced -
//! and is pure: no engine calls, no error recording.

use crate::hooks::ScriptDescriptor;

/// Which repositories to collect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoFilter {
    /// Defaults plus everything declared by any script.
    All,
    /// Exactly one explicitly named repository.
    One(String),
}

/// Collects the distinct repositories referenced across a run.
pub struct RepositoryAggregator<'a> {
    default_repos: &'a [String],
    scripts: &'a [ScriptDescriptor],
}

impl<'a> RepositoryAggregator<'a> {
    pub fn new(default_repos: &'a [String], scripts: &'a [ScriptDescriptor]) -> Self {
        Self {
            default_repos,
            scripts,
        }
    }

    /// Deduplicated repository list, first-seen order, defaults first.
    pub fn collect(&self, filter: &RepoFilter) -> Vec<String> {
        match filter {
            RepoFilter::One(repo) => vec![repo.clone()],
            RepoFilter::All => {
                let mut seen: Vec<String> = Vec::new();
                let declared = self
                    .default_repos
                    .iter()
                    .chain(self.scripts.iter().flat_map(|s| s.repositories.iter()));
                for repo in declared {
                    if !seen.iter().any(|r| r == repo) {
                        seen.push(repo.clone());
                    }
                }
                seen
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn script(name: &str, repos: &[&str]) -> ScriptDescriptor {
        ScriptDescriptor {
            path: PathBuf::from(format!("/etc/vaultrun.d/{}", name)),
            name: name.to_string(),
            files: vec!["/data".to_string()],
            repositories: repos.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_collect_one_skips_enumeration() {
        let defaults = vec!["repoA".to_string()];
        let scripts = vec![script("a.sh", &["repoB"])];
        let agg = RepositoryAggregator::new(&defaults, &scripts);
        assert_eq!(
            agg.collect(&RepoFilter::One("repoZ".to_string())),
            vec!["repoZ"]
        );
    }

    #[test]
    fn test_collect_all_dedups_preserving_order() {
        let defaults = vec!["repoA".to_string()];
        let scripts = vec![
            script("a.sh", &["repoB", "repoA"]),
            script("b.sh", &["repoC", "repoB"]),
            script("c.sh", &[]),
        ];
        let agg = RepositoryAggregator::new(&defaults, &scripts);
        assert_eq!(
            agg.collect(&RepoFilter::All),
            vec!["repoA", "repoB", "repoC"]
        );
    }

    #[test]
    fn test_collect_all_with_no_scripts() {
        let defaults = vec!["repoA".to_string(), "repoB".to_string()];
        let agg = RepositoryAggregator::new(&defaults, &[]);
        assert_eq!(agg.collect(&RepoFilter::All), vec!["repoA", "repoB"]);
    }
}
