//! Template router
//!
//! Picks the template a job should run under. Each binding pairs a launcher
//! with a sorted set of filter tags; a job scores one point per tag found in
//! a binding's filters and the highest score wins. Ties go to the binding
//! registered first, so a job matching nothing still runs under the first
//! template.

use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::service::JobLauncher;

/// A job template paired with the tags that route jobs to it
#[derive(Clone)]
pub struct TemplateBinding {
    launcher: Arc<dyn JobLauncher>,
    filters: BTreeSet<String>,
}

impl TemplateBinding {
    pub fn new(launcher: Arc<dyn JobLauncher>, filters: impl IntoIterator<Item = String>) -> Self {
        Self {
            launcher,
            filters: filters.into_iter().collect(),
        }
    }

    pub fn launcher(&self) -> &Arc<dyn JobLauncher> {
        &self.launcher
    }

    pub fn filters(&self) -> &BTreeSet<String> {
        &self.filters
    }

    /// Number of `tags` present in this binding's filters
    pub fn score(&self, tags: &[String]) -> usize {
        match_score(tags, &self.filters)
    }
}

impl std::fmt::Debug for TemplateBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateBinding")
            .field("template", &self.launcher.name())
            .field("filters", &self.filters)
            .finish()
    }
}

/// Counts the tags found in `filters`
pub fn match_score(tags: &[String], filters: &BTreeSet<String>) -> usize {
    tags.iter()
        .filter(|tag| filters.contains(tag.as_str()))
        .count()
}

/// The fixed, ordered set of bindings built at startup
#[derive(Debug)]
pub struct TemplateRegistry {
    bindings: Vec<TemplateBinding>,
}

impl TemplateRegistry {
    /// Creates a registry. At least one binding is required.
    pub fn new(bindings: Vec<TemplateBinding>) -> Result<Self> {
        if bindings.is_empty() {
            anyhow::bail!("at least one job template must be configured");
        }
        Ok(Self { bindings })
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[allow(dead_code)]
    pub fn bindings(&self) -> &[TemplateBinding] {
        &self.bindings
    }

    /// Selects the binding for a job with the given tags
    ///
    /// A lone binding is returned without scoring. Otherwise the binding
    /// with the strictly highest score wins, the earliest one on ties.
    pub fn select(&self, tags: &[String]) -> Option<&TemplateBinding> {
        if let [only] = self.bindings.as_slice() {
            return Some(only);
        }

        let mut best: Option<(usize, &TemplateBinding)> = None;
        for binding in &self.bindings {
            let score = binding.score(tags);
            if best.is_none_or(|(highest, _)| score > highest) {
                best = Some((score, binding));
            }
        }

        best.map(|(_, binding)| binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingLauncher, binding, tags};
    use proptest::prelude::*;

    fn selected(registry: &TemplateRegistry, job_tags: &[&str]) -> String {
        registry
            .select(&tags(job_tags))
            .map(|b| b.launcher().name().to_string())
            .unwrap()
    }

    #[test]
    fn test_empty_registry_is_rejected() {
        assert!(TemplateRegistry::new(Vec::new()).is_err());
    }

    #[test]
    fn test_single_binding_ignores_tags() {
        let only = RecordingLauncher::new("only");
        let registry = TemplateRegistry::new(vec![binding(&only, &["os=windows"])]).unwrap();

        assert_eq!(selected(&registry, &[]), "only");
        assert_eq!(selected(&registry, &["os=linux"]), "only");
        assert_eq!(selected(&registry, &["os=windows"]), "only");
    }

    #[test]
    fn test_linux_windows_routing() {
        let linux = RecordingLauncher::new("linux");
        let windows = RecordingLauncher::new("windows");
        let registry = TemplateRegistry::new(vec![
            binding(&linux, &["linux"]),
            binding(&windows, &["windows"]),
        ])
        .unwrap();

        assert_eq!(selected(&registry, &["linux"]), "linux");
        assert_eq!(selected(&registry, &["windows"]), "windows");
        assert_eq!(selected(&registry, &[]), "linux");
        assert_eq!(selected(&registry, &["macos"]), "linux");
    }

    #[test]
    fn test_highest_score_wins() {
        let gpu = RecordingLauncher::new("A");
        let arm = RecordingLauncher::new("B");
        let registry = TemplateRegistry::new(vec![
            binding(&gpu, &["gpu"]),
            binding(&arm, &["cpu", "arm"]),
        ])
        .unwrap();

        let job_tags = tags(&["arm", "cpu"]);
        assert_eq!(registry.bindings()[0].score(&job_tags), 0);
        assert_eq!(registry.bindings()[1].score(&job_tags), 2);
        assert_eq!(selected(&registry, &["arm", "cpu"]), "B");
    }

    #[test]
    fn test_tie_goes_to_first_registered() {
        let first = RecordingLauncher::new("first");
        let second = RecordingLauncher::new("second");
        let registry = TemplateRegistry::new(vec![
            binding(&first, &["os=linux", "arch=amd64"]),
            binding(&second, &["os=linux", "arch=arm64"]),
        ])
        .unwrap();

        assert_eq!(selected(&registry, &["os=linux"]), "first");
        assert_eq!(selected(&registry, &["os=linux", "arch=arm64"]), "second");
    }

    #[test]
    fn test_filters_are_sorted() {
        let launcher = RecordingLauncher::new("t");
        let b = binding(&launcher, &["zeta", "alpha", "mid", "alpha"]);
        let filters: Vec<&str> = b.filters().iter().map(String::as_str).collect();
        assert_eq!(filters, vec!["alpha", "mid", "zeta"]);
    }

    proptest! {
        #[test]
        fn prop_adding_a_matching_tag_never_lowers_score(
            filters in prop::collection::btree_set("[a-z]{1,6}", 1..6),
            job_tags in prop::collection::vec("[a-z]{1,6}", 0..8),
            pick in any::<prop::sample::Index>(),
        ) {
            let before = match_score(&job_tags, &filters);

            let extra = pick.get(&filters.iter().cloned().collect::<Vec<_>>()).clone();
            let mut extended = job_tags.clone();
            extended.push(extra);

            prop_assert!(match_score(&extended, &filters) > before);
        }

        #[test]
        fn prop_score_bounded_by_tag_count(
            filters in prop::collection::btree_set("[a-z]{1,4}", 0..6),
            job_tags in prop::collection::vec("[a-z]{1,4}", 0..8),
        ) {
            prop_assert!(match_score(&job_tags, &filters) <= job_tags.len());
        }
    }
}
