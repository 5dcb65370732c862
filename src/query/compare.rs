//! Containment comparison between queries

use super::{QueryLevel, TestQuery};
use crate::params::CaseParams;

/// How the case sets matched by two queries relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrdering {
    /// Neither contains the other
    Unordered,
    /// The first matches everything the second does, and more
    StrictSuperset,
    Equal,
    /// The second matches everything the first does, and more
    StrictSubset,
}

/// Compare two queries by the sets of cases they match.
///
/// Works one level at a time (group path, test path, params). Below a
/// multi-level query's own level every child matches, so a shorter path at a
/// multi level contains a longer one.
pub fn compare_queries(a: &TestQuery, b: &TestQuery) -> QueryOrdering {
    if a.suite() != b.suite() {
        return QueryOrdering::Unordered;
    }

    let group_ordering = compare_paths(a.group(), b.group());
    let (a_big, b_big) = (!a.has_test(), !b.has_test());
    if group_ordering != QueryOrdering::Equal || a_big || b_big {
        return compare_one_level(group_ordering, a_big, b_big);
    }

    let test_ordering = compare_paths(a.test(), b.test());
    let (a_big, b_big) = (
        a.level() == QueryLevel::MultiTest,
        b.level() == QueryLevel::MultiTest,
    );
    if test_ordering != QueryOrdering::Equal || a_big || b_big {
        return compare_one_level(test_ordering, a_big, b_big);
    }

    let params_ordering = compare_public_params(a.params(), b.params());
    let (a_big, b_big) = (
        a.level() == QueryLevel::MultiCase,
        b.level() == QueryLevel::MultiCase,
    );
    if params_ordering != QueryOrdering::Equal || a_big || b_big {
        return compare_one_level(params_ordering, a_big, b_big);
    }
    QueryOrdering::Equal
}

fn compare_one_level(ordering: QueryOrdering, a_big: bool, b_big: bool) -> QueryOrdering {
    match (ordering, a_big, b_big) {
        (QueryOrdering::Unordered, _, _) => QueryOrdering::Unordered,
        (ordering, true, true) => ordering,
        // Equal paths at a non-multi level were handled by the caller
        (_, false, false) => QueryOrdering::Unordered,
        (ordering, true, false) if ordering != QueryOrdering::StrictSubset => {
            QueryOrdering::StrictSuperset
        }
        (ordering, false, true) if ordering != QueryOrdering::StrictSuperset => {
            QueryOrdering::StrictSubset
        }
        _ => QueryOrdering::Unordered,
    }
}

fn compare_paths(a: &[String], b: &[String]) -> QueryOrdering {
    if a.iter().zip(b).any(|(x, y)| x != y) {
        return QueryOrdering::Unordered;
    }
    match a.len().cmp(&b.len()) {
        std::cmp::Ordering::Equal => QueryOrdering::Equal,
        std::cmp::Ordering::Less => QueryOrdering::StrictSuperset,
        std::cmp::Ordering::Greater => QueryOrdering::StrictSubset,
    }
}

/// Compare two partial param assignments as prefixes: fewer constraints match
/// more cases. Key order is irrelevant and private keys are ignored.
pub fn compare_public_params(a: &CaseParams, b: &CaseParams) -> QueryOrdering {
    let a = a.public_params();
    let b = b.public_params();
    let mut common = 0;
    for (k, v) in a.iter() {
        if let Some(other) = b.get(k) {
            if other != v {
                return QueryOrdering::Unordered;
            }
            common += 1;
        }
    }
    let a_remaining = a.len() - common;
    let b_remaining = b.len() - common;
    match (a_remaining, b_remaining) {
        (0, 0) => QueryOrdering::Equal,
        (0, _) => QueryOrdering::StrictSuperset,
        (_, 0) => QueryOrdering::StrictSubset,
        _ => QueryOrdering::Unordered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case_params;

    fn cmp(a: &str, b: &str) -> QueryOrdering {
        let a = TestQuery::parse(a).unwrap();
        let b = TestQuery::parse(b).unwrap();
        compare_queries(&a, &b)
    }

    #[test]
    fn test_equal() {
        assert_eq!(cmp("s:*", "s:*"), QueryOrdering::Equal);
        assert_eq!(cmp("s:a,*", "s:a,*"), QueryOrdering::Equal);
        assert_eq!(cmp("s:a:t:x=1;y=2", "s:a:t:y=2;x=1"), QueryOrdering::Equal);
        assert_eq!(cmp("s:a:t:x=1;*", "s:a:t:x=1;*"), QueryOrdering::Equal);
    }

    #[test]
    fn test_containment_across_levels() {
        assert_eq!(cmp("s:*", "s:a:t:x=1"), QueryOrdering::StrictSuperset);
        assert_eq!(cmp("s:a,*", "s:a,b,*"), QueryOrdering::StrictSuperset);
        assert_eq!(cmp("s:a,*", "s:a:*"), QueryOrdering::StrictSuperset);
        assert_eq!(cmp("s:a:*", "s:a:t:"), QueryOrdering::StrictSuperset);
        assert_eq!(cmp("s:a:t,*", "s:a:t:*"), QueryOrdering::StrictSuperset);
        assert_eq!(cmp("s:a:t:*", "s:a:t:x=1;*"), QueryOrdering::StrictSuperset);
        assert_eq!(cmp("s:a:t:x=1;*", "s:a:t:x=1;y=2"), QueryOrdering::StrictSuperset);
        assert_eq!(cmp("s:a:t:x=1;y=2", "s:a:t:x=1;*"), QueryOrdering::StrictSubset);
        assert_eq!(cmp("s:a,b:t:", "s:a,*"), QueryOrdering::StrictSubset);
    }

    #[test]
    fn test_unordered() {
        assert_eq!(cmp("s:*", "t:*"), QueryOrdering::Unordered);
        assert_eq!(cmp("s:a,*", "s:b,*"), QueryOrdering::Unordered);
        assert_eq!(cmp("s:a:t:x=1", "s:a:t:x=2"), QueryOrdering::Unordered);
        // Same group path, but `s:a:*` is the file `a` while `s:a,b,*` is below it
        assert_eq!(cmp("s:a:*", "s:a,b,*"), QueryOrdering::Unordered);
        // A single case doesn't contain a longer single case
        assert_eq!(cmp("s:a:t:x=1", "s:a:t:x=1;y=2"), QueryOrdering::Unordered);
        assert_eq!(cmp("s:a:t:x=1;*", "s:a:t:y=2;*"), QueryOrdering::Unordered);
    }

    #[test]
    fn test_compare_public_params_ignores_private_keys() {
        assert_eq!(
            compare_public_params(&case_params! { "a" => 1, "_p" => 1 }, &case_params! { "a" => 1 }),
            QueryOrdering::Equal
        );
        assert_eq!(
            compare_public_params(&CaseParams::new(), &case_params! { "a" => 1 }),
            QueryOrdering::StrictSuperset
        );
    }
}
