//! The backtracking dependency solver.
//!
//! Given a root constraint map, the solver picks one version per reachable
//! package such that every declared constraint is satisfied at once. The
//! search is a depth-first walk over candidate versions, newest first, with
//! dead ends modelled as plain `None` returns rather than unwinding. It
//! terminates because the set of reachable `(name, version)` pairs is
//! finite and every recursive step removes one package from the pending map
//! while only ever tightening the constraints on the rest.

use std::collections::BTreeMap;

use semver::Version;
use thiserror::Error;

use super::{
    cache::{PackageCache, UnknownPackage},
    constraint::Constraint,
    PackageName,
};

/// A satisfying assignment of one version per reachable package.
///
/// Each entry also carries the chosen release's own dependency map, so a
/// workspace loader can walk the closure without a second cache pass.
#[derive(Debug, Clone, Default)]
pub struct Solution(BTreeMap<PackageName, SolvedPackage>);

#[derive(Debug, Clone)]
pub struct SolvedPackage {
    pub version: Version,
    pub dependencies: BTreeMap<PackageName, Constraint>,
}

impl Solution {
    pub fn get(&self, name: &str) -> Option<&SolvedPackage> {
        self.0.get(name)
    }

    pub fn version_of(&self, name: &str) -> Option<&Version> {
        self.get(name).map(|package| &package.version)
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&PackageName, &SolvedPackage)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Error)]
pub enum SolveError {
    #[error(transparent)]
    UnknownPackage(#[from] UnknownPackage),
    #[error("no assignment of package versions satisfies every constraint")]
    Unsolvable,
}

/// Solves `root` against `cache`.
pub fn solve(
    cache: &PackageCache,
    root: &BTreeMap<PackageName, Constraint>,
) -> Result<Solution, SolveError> {
    let partial = BTreeMap::new();
    match solve_rec(cache, root.clone(), partial)? {
        Some(chosen) => Ok(Solution(chosen)),
        None => Err(SolveError::Unsolvable),
    }
}

fn solve_rec(
    cache: &PackageCache,
    mut pending: BTreeMap<PackageName, Constraint>,
    partial: BTreeMap<PackageName, SolvedPackage>,
) -> Result<Option<BTreeMap<PackageName, SolvedPackage>>, UnknownPackage> {
    // lexicographically smallest pending name; done if there is none
    let Some((name, constraint)) = pending.pop_first() else {
        return Ok(Some(partial));
    };

    // a package the partial solution has already fixed is only re-checked
    // against the (possibly tightened) constraint; its dependencies were
    // merged when it was first chosen, and merging them again could bounce
    // a dependency cycle between the pending map and the partial solution
    // forever
    if let Some(chosen) = partial.get(&name) {
        return match constraint.satisfies(&chosen.version) {
            true => solve_rec(cache, pending, partial),
            false => Ok(None),
        };
    }

    let releases = cache.get(&name)?;

    // candidates in descending version order, so the newest satisfying
    // release wins
    let candidates = releases
        .iter()
        .rev()
        .filter(|release| constraint.satisfies(&release.version));

    for candidate in candidates {
        let Some(merged) = combine(&pending, &candidate.dependencies) else {
            continue;
        };

        let mut partial = partial.clone();
        partial.insert(
            name.clone(),
            SolvedPackage {
                version: candidate.version.clone(),
                dependencies: candidate.dependencies.clone(),
            },
        );

        if let Some(solution) = solve_rec(cache, merged, partial)? {
            return Ok(Some(solution));
        }
    }

    Ok(None)
}

/// Unions two constraint maps, intersecting where the keys overlap; `None`
/// if any intersection is empty.
fn combine(
    lhs: &BTreeMap<PackageName, Constraint>,
    rhs: &BTreeMap<PackageName, Constraint>,
) -> Option<BTreeMap<PackageName, Constraint>> {
    let mut merged = lhs.clone();

    for (name, constraint) in rhs {
        match merged.get(name) {
            Some(existing) => {
                let met = existing.intersect(constraint)?;
                merged.insert(name.clone(), met);
            }
            None => {
                merged.insert(name.clone(), constraint.clone());
            }
        }
    }

    Some(merged)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::package::cache::Release;

    use super::*;

    fn release(version: &str, deps: &[(&str, &str)]) -> Release {
        Release {
            version: version.parse().unwrap(),
            dependencies: deps
                .iter()
                .map(|(name, c)| {
                    (PackageName::from(*name), c.parse().unwrap())
                })
                .collect(),
        }
    }

    fn constraints(
        deps: &[(&str, &str)],
    ) -> BTreeMap<PackageName, Constraint> {
        deps.iter()
            .map(|(name, c)| (PackageName::from(*name), c.parse().unwrap()))
            .collect()
    }

    #[test]
    fn picks_the_newest_version_that_leaves_a_solution() {
        // P@1.5.0 needs Q < 2.0.0, P@1.4.0 needs Q >= 2.0.0; both Q exist.
        // newest-first must land on P@1.5.0 with Q@1.9.0.
        let cache = PackageCache::from_releases([
            (
                PackageName::from("author/p"),
                vec![
                    release("1.4.0", &[("author/q", "2.0.0 <= v < 3.0.0")]),
                    release("1.5.0", &[("author/q", "1.0.0 <= v < 2.0.0")]),
                ],
            ),
            (
                PackageName::from("author/q"),
                vec![release("1.9.0", &[]), release("2.1.0", &[])],
            ),
        ]);

        let root = constraints(&[("author/p", "1.0.0 <= v < 2.0.0")]);
        let solution = solve(&cache, &root).unwrap();

        assert_eq!(
            solution.version_of("author/p").unwrap(),
            &Version::new(1, 5, 0)
        );
        assert_eq!(
            solution.version_of("author/q").unwrap(),
            &Version::new(1, 9, 0)
        );
    }

    #[test]
    fn backtracks_when_the_newest_candidate_is_a_dead_end() {
        // P@1.5.0 needs a Q that does not exist; P@1.4.0 works.
        let cache = PackageCache::from_releases([
            (
                PackageName::from("author/p"),
                vec![
                    release("1.4.0", &[("author/q", "1.0.0 <= v < 2.0.0")]),
                    release("1.5.0", &[("author/q", "9.0.0 <= v < 10.0.0")]),
                ],
            ),
            (
                PackageName::from("author/q"),
                vec![release("1.0.0", &[])],
            ),
        ]);

        let root = constraints(&[("author/p", "1.0.0 <= v < 2.0.0")]);
        let solution = solve(&cache, &root).unwrap();

        assert_eq!(
            solution.version_of("author/p").unwrap(),
            &Version::new(1, 4, 0)
        );
    }

    #[test]
    fn empty_transitive_overlap_is_unsolvable() {
        // P and Q agree on a common dependency R but with disjoint ranges.
        let cache = PackageCache::from_releases([
            (
                PackageName::from("author/p"),
                vec![release("1.0.0", &[("author/r", "1.0.0 <= v < 2.0.0")])],
            ),
            (
                PackageName::from("author/q"),
                vec![release("1.0.0", &[("author/r", "2.0.0 <= v < 3.0.0")])],
            ),
            (
                PackageName::from("author/r"),
                vec![release("1.5.0", &[]), release("2.5.0", &[])],
            ),
        ]);

        let root = constraints(&[
            ("author/p", "1.0.0 <= v < 2.0.0"),
            ("author/q", "1.0.0 <= v < 2.0.0"),
        ]);

        assert!(matches!(
            solve(&cache, &root),
            Err(SolveError::Unsolvable)
        ));
    }

    #[test]
    fn unknown_package_is_reported_by_name() {
        let cache = PackageCache::from_releases([(
            PackageName::from("author/p"),
            vec![release("1.0.0", &[("author/ghost", "1.0.0 <= v < 2.0.0")])],
        )]);

        let root = constraints(&[("author/p", "1.0.0 <= v < 2.0.0")]);

        assert!(matches!(
            solve(&cache, &root),
            Err(SolveError::UnknownPackage(UnknownPackage(name)))
                if name == "author/ghost"
        ));
    }

    #[test]
    fn mutually_dependent_packages_terminate() {
        let cache = PackageCache::from_releases([
            (
                PackageName::from("author/p"),
                vec![release("1.0.0", &[("author/q", "1.0.0 <= v < 2.0.0")])],
            ),
            (
                PackageName::from("author/q"),
                vec![release("1.2.0", &[("author/p", "1.0.0 <= v < 2.0.0")])],
            ),
        ]);

        let root = constraints(&[("author/p", "1.0.0 <= v < 2.0.0")]);
        let solution = solve(&cache, &root).unwrap();

        assert_eq!(solution.len(), 2);
        assert_eq!(
            solution.version_of("author/q").unwrap(),
            &Version::new(1, 2, 0)
        );
    }

    #[test]
    fn empty_root_yields_the_empty_solution() {
        let cache = PackageCache::empty();
        let solution = solve(&cache, &BTreeMap::new()).unwrap();
        assert!(solution.is_empty());
    }

    /// Strategy: a small universe of packages with random release sets and
    /// random intra-universe constraints.
    fn cache_strategy() -> impl Strategy<Value = PackageCache> {
        let names = ["u/a", "u/b", "u/c"];

        let dep = (0usize..names.len(), 0u64..3, 1u64..4).prop_filter_map(
            "dep ranges must be nonempty",
            move |(target, lo, width)| {
                let constraint = Constraint::new(
                    Version::new(lo, 0, 0),
                    crate::package::constraint::Op::LessEq,
                    Version::new(lo + width, 0, 0),
                    crate::package::constraint::Op::Less,
                )
                .ok()?;
                Some((PackageName::from(names[target]), constraint))
            },
        );

        let release = (0u64..4, proptest::collection::vec(dep, 0..2))
            .prop_map(|(major, deps)| Release {
                version: Version::new(major, 0, 0),
                dependencies: deps.into_iter().collect(),
            });

        proptest::collection::vec(
            proptest::collection::vec(release, 1..4),
            3..=3,
        )
        .prop_map(move |releases| {
            PackageCache::from_releases(
                names
                    .iter()
                    .zip(releases)
                    .map(|(name, mut releases)| {
                        // one release per version
                        releases.sort_by(|a, b| a.version.cmp(&b.version));
                        releases.dedup_by(|a, b| a.version == b.version);
                        (PackageName::from(*name), releases)
                    }),
            )
        })
    }

    proptest! {
        /// Every solution actually satisfies every direct and transitive
        /// constraint it is subject to.
        #[test]
        fn solutions_satisfy_all_constraints(
            cache in cache_strategy(),
            lo in 0u64..3,
            width in 1u64..4,
        ) {
            let mut root = constraints(&[]);
            root.insert(
                PackageName::from("u/a"),
                Constraint::new(
                    Version::new(lo, 0, 0),
                    crate::package::constraint::Op::LessEq,
                    Version::new(lo + width, 0, 0),
                    crate::package::constraint::Op::Less,
                ).unwrap(),
            );

            if let Ok(solution) = solve(&cache, &root) {
                for (name, constraint) in &root {
                    let version = solution.version_of(name).unwrap();
                    prop_assert!(constraint.satisfies(version));
                }

                for (_, package) in solution.iter() {
                    for (dep, constraint) in &package.dependencies {
                        let version = solution.version_of(dep).unwrap();
                        prop_assert!(constraint.satisfies(version));
                    }
                }
            }
        }
    }
}
