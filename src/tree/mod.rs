//! Case tree
//!
//! `load_tree` maps a query against a suite listing and builds a tree keyed
//! by group path, file, test path and case params:
//!
//! ```text
//! suite:*
//!   suite:a,*              directory
//!     suite:a:*            file
//!       suite:a:t,*        test path prefix
//!         suite:a:t:*      test
//!           suite:a:t:x=1;*
//!             suite:a:t:x=1    leaf (one case)
//! ```
//!
//! Only files, tests and cases matched by the query are inserted. Subtrees
//! are collapsible unless they strictly contain one of the subqueries to
//! expand; collapsed iteration stops at collapsible subtrees.

use crate::framework::{ListingEntry, RunCase, RunContext, Test, TestFileLoader};
use crate::logging::Status;
use crate::params::CaseParams;
use crate::query::{
    BIG_SEPARATOR, PARAM_SEPARATOR, PATH_SEPARATOR, QueryLevel, QueryOrdering, TestQuery, WILDCARD,
    compare_queries, stringify_single_param,
};
use crate::utils::{HarnessError, ListingError, QueryError, Result, SpecLoadError};
use std::collections::HashMap;
use std::fmt;

// Child key of a test's failing leaf; never a `k=v` param key
const BAD_CASE_KEY: &str = "!";

/// Number of tests in a subtree, and of nodes whose description has a TODO
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubtreeCounts {
    pub tests: usize,
    pub nodes_with_todo: usize,
}

/// An inner node
#[derive(Debug)]
pub struct TestSubtree {
    query: TestQuery,
    readable_name: String,
    description: Option<String>,
    collapsible: bool,
    children: Vec<TestTreeNode>,
    index: HashMap<String, usize>,
    counts: SubtreeCounts,
}

#[derive(Debug)]
enum LeafKind {
    Case(RunCase),
    LoadError(SpecLoadError),
}

/// A runnable leaf: one case, or a spec file that failed to import
#[derive(Debug)]
pub struct TestTreeLeaf {
    query: TestQuery,
    readable_name: String,
    kind: LeafKind,
}

#[derive(Debug)]
pub enum TestTreeNode {
    Subtree(TestSubtree),
    Leaf(TestTreeLeaf),
}

/// Borrowed view of a subtree or leaf
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Subtree(&'a TestSubtree),
    Leaf(&'a TestTreeLeaf),
}

impl NodeRef<'_> {
    pub fn query(&self) -> &TestQuery {
        match self {
            Self::Subtree(s) => &s.query,
            Self::Leaf(l) => &l.query,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }
}

/// Options for [`TestTree::iterate_collapsed_nodes`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CollapseOptions {
    /// Also yield the subtrees that were expanded
    pub include_intermediate_nodes: bool,
    /// Yield subtrees with no children (e.g. a file with no tests)
    pub include_empty_subtrees: bool,
    /// Never collapse subtrees at or above this depth (see
    /// [`QueryLevel::depth`]); 0 disables
    pub always_expand_through_level: u8,
}

impl TestSubtree {
    fn new(query: TestQuery, readable_name: String, collapsible: bool) -> Self {
        Self {
            query,
            readable_name,
            description: None,
            collapsible,
            children: Vec::new(),
            index: HashMap::new(),
            counts: SubtreeCounts::default(),
        }
    }

    pub fn query(&self) -> &TestQuery {
        &self.query
    }

    pub fn readable_name(&self) -> &str {
        &self.readable_name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_collapsible(&self) -> bool {
        self.collapsible
    }

    pub fn children(&self) -> &[TestTreeNode] {
        &self.children
    }

    pub fn counts(&self) -> SubtreeCounts {
        self.counts
    }

    fn set_description(&mut self, description: &str) {
        let description = description.trim().to_string();
        if description.contains("TODO") {
            self.counts.nodes_with_todo += 1;
        }
        self.description = Some(description);
    }

    fn push_child(&mut self, key: &str, node: TestTreeNode) -> usize {
        let i = self.children.len();
        self.children.push(node);
        self.index.insert(key.to_string(), i);
        i
    }

    fn get_or_insert_subtree(
        &mut self,
        key: &str,
        create: impl FnOnce() -> std::result::Result<TestSubtree, QueryError>,
    ) -> Result<&mut TestSubtree> {
        let i = match self.index.get(key) {
            Some(&i) => i,
            None => {
                let subtree = create()?;
                self.push_child(key, TestTreeNode::Subtree(subtree))
            }
        };
        match &mut self.children[i] {
            TestTreeNode::Subtree(s) => Ok(s),
            TestTreeNode::Leaf(l) => Err(HarnessError::Other(format!(
                "expected a subtree under {} but found leaf {}",
                self.query, l.query
            ))),
        }
    }

    fn propagate_counts(&mut self) -> SubtreeCounts {
        for child in &mut self.children {
            if let TestTreeNode::Subtree(s) = child {
                let counts = s.propagate_counts();
                self.counts.tests += counts.tests;
                self.counts.nodes_with_todo += counts.nodes_with_todo;
            }
        }
        self.counts
    }
}

impl TestTreeLeaf {
    pub fn query(&self) -> &TestQuery {
        &self.query
    }

    pub fn readable_name(&self) -> &str {
        &self.readable_name
    }

    pub fn run_case(&self) -> Option<&RunCase> {
        match &self.kind {
            LeafKind::Case(case) => Some(case),
            LeafKind::LoadError(_) => None,
        }
    }

    pub fn load_error(&self) -> Option<&SpecLoadError> {
        match &self.kind {
            LeafKind::LoadError(e) => Some(e),
            LeafKind::Case(_) => None,
        }
    }

    /// Run the leaf. A file that failed to import records `fail`.
    pub async fn run(&self, ctx: &RunContext) -> Status {
        match &self.kind {
            LeafKind::Case(case) => case.run(ctx).await,
            LeafKind::LoadError(e) => {
                let (rec, _) = ctx.logger.record(self.query.to_string());
                rec.threw(e.to_string());
                rec.finish()
            }
        }
    }
}

/// A loaded, filtered tree of cases
#[derive(Debug)]
pub struct TestTree {
    for_query: TestQuery,
    root: TestSubtree,
}

fn leaves_of<'a>(subtree: &'a TestSubtree) -> Box<dyn Iterator<Item = &'a TestTreeLeaf> + 'a> {
    Box::new(subtree.children.iter().flat_map(|child| -> Box<dyn Iterator<Item = &'a TestTreeLeaf> + 'a> {
        match child {
            TestTreeNode::Subtree(s) => leaves_of(s),
            TestTreeNode::Leaf(l) => Box::new(std::iter::once(l)),
        }
    }))
}

fn collapsed_nodes_of<'a>(subtree: &'a TestSubtree, opts: &CollapseOptions, out: &mut Vec<NodeRef<'a>>) {
    if opts.include_intermediate_nodes {
        out.push(NodeRef::Subtree(subtree));
    }
    for child in &subtree.children {
        match child {
            TestTreeNode::Subtree(s) => {
                let collapsible =
                    s.collapsible && s.query.level().depth() > opts.always_expand_through_level;
                if !s.children.is_empty() && !collapsible {
                    collapsed_nodes_of(s, opts, out);
                } else if !s.children.is_empty() || opts.include_empty_subtrees {
                    out.push(NodeRef::Subtree(s));
                }
            }
            TestTreeNode::Leaf(l) => out.push(NodeRef::Leaf(l)),
        }
    }
}

impl TestTree {
    /// The query the tree was loaded for
    pub fn for_query(&self) -> &TestQuery {
        &self.for_query
    }

    /// The suite-level subtree
    pub fn root(&self) -> &TestSubtree {
        &self.root
    }

    pub fn counts(&self) -> SubtreeCounts {
        self.root.counts
    }

    /// Every leaf, in listing / declaration / combinatorial order
    pub fn iterate_leaves(&self) -> impl Iterator<Item = &TestTreeLeaf> + '_ {
        leaves_of(&self.root)
    }

    /// Nodes to show for the tree, collapsing every collapsible subtree
    pub fn iterate_collapsed_nodes(&self, opts: CollapseOptions) -> Vec<NodeRef<'_>> {
        let mut out = Vec::new();
        collapsed_nodes_of(&self.root, &opts, &mut out);
        out
    }

    fn fmt_subtree(f: &mut fmt::Formatter<'_>, s: &TestSubtree, indent: &str) -> fmt::Result {
        let marker = if s.collapsible { '+' } else { '-' };
        write!(
            f,
            "{}{} {} / {} {:?} => {}",
            indent, marker, s.counts.tests, s.counts.nodes_with_todo, s.readable_name, s.query
        )?;
        if let Some(description) = &s.description {
            write!(f, "\n{}  | {:?}", indent, description)?;
        }
        let child_indent = format!("{}  ", indent);
        for child in &s.children {
            writeln!(f)?;
            match child {
                TestTreeNode::Subtree(c) => Self::fmt_subtree(f, c, &child_indent)?,
                TestTreeNode::Leaf(l) => {
                    write!(f, "{}> {:?} => {}", child_indent, l.readable_name, l.query)?
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for TestTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Self::fmt_subtree(f, &self.root, "")
    }
}

/// Tracks which subqueries to expand were matched by a node
struct Expander<'a> {
    subqueries: &'a [TestQuery],
    seen: Vec<bool>,
}

impl<'a> Expander<'a> {
    fn new(subqueries: &'a [TestQuery]) -> Self {
        Self {
            subqueries,
            seen: vec![false; subqueries.len()],
        }
    }

    /// A node is collapsible unless it strictly contains a subquery to expand
    fn is_collapsible(&mut self, query: &TestQuery) -> bool {
        let mut collapsible = true;
        for (i, sq) in self.subqueries.iter().enumerate() {
            match compare_queries(sq, query) {
                QueryOrdering::Equal => self.seen[i] = true,
                QueryOrdering::StrictSubset => collapsible = false,
                _ => {}
            }
        }
        collapsible
    }

    fn unseen(&self) -> impl Iterator<Item = &TestQuery> {
        self.subqueries
            .iter()
            .zip(&self.seen)
            .filter(|(_, seen)| !**seen)
            .map(|(q, _)| q)
    }
}

fn add_subtree_for_dir_path<'t>(
    mut tree: &'t mut TestSubtree,
    path: &[String],
    expander: &mut Expander<'_>,
) -> Result<&'t mut TestSubtree> {
    let suite = tree.query.suite().to_string();
    for (i, part) in path.iter().enumerate() {
        tree = tree.get_or_insert_subtree(part, || {
            let query = TestQuery::multi_group(suite.as_str(), path[..=i].iter().cloned())?;
            let collapsible = expander.is_collapsible(&query);
            Ok(TestSubtree::new(
                query,
                format!("{}{}{}", part, PATH_SEPARATOR, WILDCARD),
                collapsible,
            ))
        })?;
    }
    Ok(tree)
}

fn add_subtree_for_file_path<'t>(
    tree: &'t mut TestSubtree,
    path: &[String],
    expander: &mut Expander<'_>,
) -> Result<&'t mut TestSubtree> {
    let suite = tree.query.suite().to_string();
    let tree = add_subtree_for_dir_path(tree, path, expander)?;
    let last = path.last().cloned().unwrap_or_default();
    tree.get_or_insert_subtree("", || {
        let query = TestQuery::multi_test(suite.as_str(), path.iter().cloned(), Vec::<String>::new())?;
        let collapsible = expander.is_collapsible(&query);
        Ok(TestSubtree::new(
            query,
            format!("{}{}{}", last, BIG_SEPARATOR, WILDCARD),
            collapsible,
        ))
    })
}

fn add_subtree_for_test_path<'t>(
    mut tree: &'t mut TestSubtree,
    test: &[String],
    expander: &mut Expander<'_>,
) -> Result<&'t mut TestSubtree> {
    let suite = tree.query.suite().to_string();
    let file = tree.query.group().to_vec();
    for (i, part) in test.iter().enumerate() {
        tree = tree.get_or_insert_subtree(part, || {
            let query = TestQuery::multi_test(
                suite.as_str(),
                file.iter().cloned(),
                test[..=i].iter().cloned(),
            )?;
            let collapsible = expander.is_collapsible(&query);
            Ok(TestSubtree::new(
                query,
                format!("{}{}{}", part, PATH_SEPARATOR, WILDCARD),
                collapsible,
            ))
        })?;
    }
    let last = test.last().cloned().unwrap_or_default();
    tree.get_or_insert_subtree("", || {
        let query = TestQuery::multi_case(
            suite.as_str(),
            file.iter().cloned(),
            test.iter().cloned(),
            CaseParams::new(),
        )?;
        let collapsible = expander.is_collapsible(&query);
        Ok(TestSubtree::new(
            query,
            format!("{}{}{}", last, BIG_SEPARATOR, WILDCARD),
            collapsible,
        ))
    })
}

fn add_leaf_for_case(
    mut tree: &mut TestSubtree,
    case: RunCase,
    expander: &mut Expander<'_>,
) -> Result<()> {
    let query = case.query().clone();
    let mut so_far = CaseParams::new();
    let mut name = format!(
        "{}{}",
        query.test().last().map(String::as_str).unwrap_or_default(),
        BIG_SEPARATOR
    );
    for (k, v) in query.params().iter() {
        name = stringify_single_param(k, v);
        so_far.insert(k, v.clone());
        let prefix = so_far.clone();
        tree = tree.get_or_insert_subtree(&name, || {
            let subquery = TestQuery::multi_case(
                query.suite(),
                query.group().iter().cloned(),
                query.test().iter().cloned(),
                prefix,
            )?;
            let collapsible = expander.is_collapsible(&subquery);
            Ok(TestSubtree::new(
                subquery,
                format!("{}{}{}", name, PARAM_SEPARATOR, WILDCARD),
                collapsible,
            ))
        })?;
    }

    expander.is_collapsible(&query);
    if tree.index.contains_key("") {
        log::warn!("duplicate test case {}; keeping the first", query);
        return Ok(());
    }
    tree.push_child(
        "",
        TestTreeNode::Leaf(TestTreeLeaf {
            query,
            readable_name: name,
            kind: LeafKind::Case(case),
        }),
    );
    Ok(())
}

/// A case whose params can't form a query. The test gets one leaf, at its
/// `suite:file:test:*` query, that fails when run.
fn add_leaf_for_bad_case(tree: &mut TestSubtree, suite: &str, file: &[String], message: String) {
    if tree.index.contains_key(BAD_CASE_KEY) {
        return;
    }
    let query = tree.query.clone();
    let error = SpecLoadError::new(suite, file, format!("{}: {}", query, message));
    tree.push_child(
        BAD_CASE_KEY,
        TestTreeNode::Leaf(TestTreeLeaf {
            readable_name: tree.readable_name.clone(),
            query,
            kind: LeafKind::LoadError(error),
        }),
    );
}

/// Decide whether a case is selected by `query`. Returns the subcase filter
/// to apply (if any) when it is.
///
/// Query params that the case doesn't have are taken as subcase params.
fn select_case(query: &TestQuery, test: &Test, case: &CaseParams) -> Option<Option<CaseParams>> {
    if !query.has_params() {
        return Some(None);
    }
    let public = case.public_params();
    let mut leftover = CaseParams::new();
    for (k, v) in query.params().iter() {
        match public.get(k) {
            Some(mine) if mine == v => {}
            Some(_) => return None,
            None => {
                leftover.insert(k, v.clone());
            }
        }
    }
    if query.level() == QueryLevel::SingleCase
        && public.keys().any(|k| !query.params().contains_key(k))
    {
        return None;
    }
    if leftover.is_empty() {
        return Some(None);
    }
    let mut subcases = test.iterate_subcases(case)?;
    if subcases.any(|sub| sub.matches_partial(&leftover)) {
        Some(Some(leftover))
    } else {
        None
    }
}

/// Load the subtree of `query`'s suite that `query` selects.
///
/// Nodes that strictly contain an entry of `subqueries_to_expand` are not
/// collapsible. A spec file that fails to import becomes a leaf that fails
/// when run. Fails if the suite is unknown or nothing matches.
pub async fn load_tree<L>(
    loader: &L,
    query: &TestQuery,
    subqueries_to_expand: &[TestQuery],
) -> Result<TestTree>
where
    L: TestFileLoader + ?Sized,
{
    let suite = query.suite();
    let listing = loader.listing(suite).await?;
    let mut expander = Expander::new(subqueries_to_expand);

    let root_query = TestQuery::multi_suite(suite)?;
    let collapsible = expander.is_collapsible(&root_query);
    let mut root = TestSubtree::new(root_query, format!("{}{}{}", suite, BIG_SEPARATOR, WILDCARD), collapsible);
    let mut found_case = false;

    for entry in listing {
        let (path, readme) = match entry {
            ListingEntry::Readme { path, readme } if path.is_empty() => {
                root.set_description(&readme);
                continue;
            }
            ListingEntry::Readme { path, readme } => (path, Some(readme)),
            ListingEntry::Spec { path } => (path, None),
        };
        if path.is_empty() {
            log::warn!("listing of {} has a spec entry with an empty path", suite);
            continue;
        }

        let dir_query = TestQuery::multi_group(suite, path.iter().cloned())?;
        if compare_queries(&dir_query, query) == QueryOrdering::Unordered {
            continue;
        }

        if let Some(readme) = readme {
            let dir = add_subtree_for_dir_path(&mut root, &path, &mut expander)?;
            dir.set_description(&readme);
            continue;
        }

        let spec = match loader.import_spec(suite, &path).await {
            Ok(spec) => spec,
            Err(e) => {
                log::warn!("{}", e);
                let dir = add_subtree_for_dir_path(&mut root, &path, &mut expander)?;
                let file_query = TestQuery::multi_test(suite, path.iter().cloned(), Vec::<String>::new())?;
                expander.is_collapsible(&file_query);
                if !dir.index.contains_key("") {
                    let readable_name = format!(
                        "{}{}{}",
                        path.last().map(String::as_str).unwrap_or_default(),
                        BIG_SEPARATOR,
                        WILDCARD
                    );
                    dir.push_child(
                        "",
                        TestTreeNode::Leaf(TestTreeLeaf {
                            query: file_query,
                            readable_name,
                            kind: LeafKind::LoadError(e),
                        }),
                    );
                }
                found_case = true;
                continue;
            }
        };

        let file = add_subtree_for_file_path(&mut root, &path, &mut expander)?;
        file.set_description(&spec.description);
        if spec.g.is_empty() {
            log::warn!("{} has no tests", file.query);
        }

        for (i, test) in spec.g.tests().iter().enumerate() {
            let test_query =
                TestQuery::multi_case(suite, path.iter().cloned(), test.path().iter().cloned(), CaseParams::new())?;
            if compare_queries(&test_query, query) == QueryOrdering::Unordered {
                continue;
            }

            let test_subtree = add_subtree_for_test_path(file, test.path(), &mut expander)?;
            test_subtree.counts.tests = 1;
            if !test.description().is_empty() {
                test_subtree.set_description(test.description());
            }

            for params in test.iterate_cases() {
                let Some(subcase_filter) = select_case(query, test, &params) else {
                    continue;
                };
                let mut case = match RunCase::new(spec.g.clone(), i, suite, &path, params) {
                    Ok(case) => case,
                    Err(e) => {
                        log::warn!("{}: {}", test_subtree.query, e);
                        add_leaf_for_bad_case(test_subtree, suite, &path, e.to_string());
                        found_case = true;
                        continue;
                    }
                };
                if let Some(filter) = subcase_filter {
                    case = case.with_subcase_filter(filter);
                }
                add_leaf_for_case(test_subtree, case, &mut expander)?;
                found_case = true;
            }
        }
    }

    for sq in expander.unseen() {
        log::warn!(
            "subquery to expand did not match anything (wrong, or redundant with a previous one): {}",
            sq
        );
    }
    if !found_case {
        return Err(ListingError::NoMatch(query.to_string()).into());
    }

    root.propagate_counts();
    Ok(TestTree {
        for_query: query.clone(),
        root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case_params;
    use crate::framework::{MockTestFileLoader, SuiteRegistry};
    use crate::logging::Logger;
    use pretty_assertions::assert_eq;

    fn registry() -> SuiteRegistry {
        let mut r = SuiteRegistry::new();
        r.add_readme("suite1", "", "desc 1a")
            .add_spec("suite1", "foo", "desc 1b", |g| {
                g.test("hello").test_fn(|_| async { Ok(()) });
                g.test("bonjour").test_fn(|_| async { Ok(()) });
                g.test("hola").desc("TODO: more languages").test_fn(|_| async { Ok(()) });
            })
            .add_readme("suite1", "bar", "desc 1c")
            .add_spec("suite1", "bar,buzz,buzz", "desc 1d", |g| {
                g.test("zap").test_fn(|_| async { Ok(()) });
            })
            .add_spec("suite1", "baz", "desc 1e", |g| {
                g.test("wye")
                    .params(|u| u.combine_with_params([case_params! {}, case_params! { "x" => 1 }]))
                    .test_fn(|_| async { Ok(()) });
                g.test("zed")
                    .params(|u| {
                        u.combine_with_params([
                            case_params! { "a" => 1, "b" => 2, "_c" => 0 },
                            case_params! { "b" => 3, "a" => 1, "_c" => 0 },
                        ])
                    })
                    .test_fn(|_| async { Ok(()) });
            })
            .add_readme("suite2", "", "desc 2a")
            .add_spec("suite2", "foof", "desc 2b", |g| {
                g.test("blah").test_fn(|t| async move {
                    t.debug("OK");
                    Ok(())
                });
                g.test("bleh")
                    .params(|u| u.combine_with_params([case_params! { "a" => 1 }]))
                    .test_fn(|t| async move {
                        t.debug("OK");
                        t.debug("OK");
                        Ok(())
                    });
                g.test("bluh,a").test_fn(|t| async move {
                    t.fail("bye");
                    Ok(())
                });
            })
            .add_spec("suite3", "sub", "with subcases", |g| {
                g.test("t")
                    .params(|u| u.combine("x", [1, 2]).begin_subcases().combine("y", [0, 1]))
                    .test_fn(|_| async { Ok(()) });
            });
        r
    }

    async fn load(filter: &str) -> Result<TestTree> {
        let query = TestQuery::parse(filter)?;
        load_tree(&registry(), &query, &[]).await
    }

    async fn count(filter: &str) -> usize {
        load(filter).await.unwrap().iterate_leaves().count()
    }

    fn names(tree: &TestTree) -> Vec<String> {
        tree.iterate_leaves().map(|l| l.query().to_string()).collect()
    }

    #[tokio::test]
    async fn test_suite_level() {
        assert!(load("suite1").await.is_err());
        assert!(load("suite1:").await.is_err());
        assert!(matches!(
            load("nosuite:*").await,
            Err(HarnessError::Listing(ListingError::SuiteNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_group_level() {
        assert_eq!(count("suite1:*").await, 8);
        assert_eq!(count("suite1:foo,*").await, 3);
        assert_eq!(count("suite1:bar,*").await, 1);
        assert_eq!(count("suite1:bar,buzz,buzz,*").await, 1);
        assert!(load("suite1:f*").await.is_err());
    }

    #[tokio::test]
    async fn test_test_level() {
        for bad in ["suite1::", "suite1:bar:", "suite1:bar,:", "suite1::*", "suite1:bar,:*", "suite1:bar:*"] {
            assert!(load(bad).await.is_err(), "{} should not load", bad);
        }
        assert_eq!(count("suite1:foo:*").await, 3);
        assert_eq!(count("suite1:bar,buzz,buzz:*").await, 1);
        assert_eq!(count("suite1:baz:*").await, 4);
        assert_eq!(count("suite2:foof:bluh,*").await, 1);
        assert_eq!(count("suite2:foof:bluh,a,*").await, 1);
    }

    #[tokio::test]
    async fn test_case_level() {
        for bad in [
            "suite1:foo::",
            "suite1:bar:zed,:",
            "suite1:foo:h*",
            "suite1:foo::*",
            "suite1:baz::*",
            "suite1:baz:zed,:*",
            "suite1:baz:zed:",
            "suite1:baz:zed:a=1;b=2*",
            "suite1:baz:zed:a=1;b=2;",
            "suite1:baz:zed:a=1;b=2,",
            "suite1:baz:zed:b=2*",
            "suite1:baz:zed:b=2;a=1;_c=0",
            "suite1:baz:zed:a=1,*",
        ] {
            assert!(load(bad).await.is_err(), "{} should not load", bad);
        }
        assert_eq!(count("suite1:baz:zed:*").await, 2);
        assert_eq!(count("suite1:baz:zed:a=1;*").await, 2);
        assert_eq!(count("suite1:baz:zed:b=2;*").await, 1);
        assert_eq!(count("suite1:baz:zed:a=1;b=2").await, 1);
        assert_eq!(count("suite1:baz:zed:b=2;a=1").await, 1);
        assert_eq!(count("suite1:baz:zed:a=1;b=2;*").await, 1);
        assert_eq!(count("suite1:baz:zed:b=3;a=1").await, 1);
        assert_eq!(count("suite1:foo:hello:").await, 1);
    }

    #[tokio::test]
    async fn test_leaf_order_and_private_params() {
        let tree = load("suite1:baz:*").await.unwrap();
        assert_eq!(
            names(&tree),
            vec![
                "suite1:baz:wye:",
                "suite1:baz:wye:x=1",
                "suite1:baz:zed:a=1;b=2",
                "suite1:baz:zed:b=3;a=1",
            ]
        );
        let zed = tree.iterate_leaves().nth(2).unwrap().run_case().unwrap();
        assert_eq!(zed.params().get("_c"), Some(&crate::params::ParamValue::from(0)));
    }

    #[tokio::test]
    async fn test_pruning_keeps_only_matching_files() {
        let tree = load("suite1:bar,*").await.unwrap();
        assert_eq!(names(&tree), vec!["suite1:bar,buzz,buzz:zap:"]);
    }

    #[tokio::test]
    async fn test_counts_and_descriptions() {
        let tree = load("suite1:*").await.unwrap();
        assert_eq!(tree.counts(), SubtreeCounts { tests: 6, nodes_with_todo: 1 });
        assert_eq!(tree.root().description(), Some("desc 1a"));
        assert_eq!(tree.for_query().to_string(), "suite1:*");
    }

    #[tokio::test]
    async fn test_collapsed_nodes() {
        let registry = registry();
        let query = TestQuery::parse("suite1:*").unwrap();
        let tree = load_tree(&registry, &query, &[]).await.unwrap();
        let nodes: Vec<String> = tree
            .iterate_collapsed_nodes(CollapseOptions::default())
            .iter()
            .map(|n| n.query().to_string())
            .collect();
        assert_eq!(nodes, vec!["suite1:foo,*", "suite1:bar,*", "suite1:baz,*"]);

        let expand = [TestQuery::parse("suite1:baz:zed:*").unwrap()];
        let tree = load_tree(&registry, &query, &expand).await.unwrap();
        let nodes: Vec<String> = tree
            .iterate_collapsed_nodes(CollapseOptions::default())
            .iter()
            .map(|n| n.query().to_string())
            .collect();
        assert_eq!(
            nodes,
            vec![
                "suite1:foo,*",
                "suite1:bar,*",
                "suite1:baz:wye,*",
                "suite1:baz:zed:*",
            ]
        );

        let expand = [TestQuery::parse("suite1:baz:zed:a=1;b=2").unwrap()];
        let tree = load_tree(&registry, &query, &expand).await.unwrap();
        let nodes = tree.iterate_collapsed_nodes(CollapseOptions::default());
        assert!(nodes.iter().any(|n| n.is_leaf() && n.query().to_string() == "suite1:baz:zed:a=1;b=2"));
    }

    #[tokio::test]
    async fn test_always_expand_through_level() {
        let tree = load("suite1:foo,*").await.unwrap();
        let nodes: Vec<String> = tree
            .iterate_collapsed_nodes(CollapseOptions {
                always_expand_through_level: 2,
                ..Default::default()
            })
            .iter()
            .map(|n| n.query().to_string())
            .collect();
        assert_eq!(nodes, vec!["suite1:foo:hello:*", "suite1:foo:bonjour:*", "suite1:foo:hola:*"]);
    }

    #[tokio::test]
    async fn test_subcase_query_selects_case_with_filter() {
        let tree = load("suite3:sub:t:x=1;y=1").await.unwrap();
        let leaves: Vec<&TestTreeLeaf> = tree.iterate_leaves().collect();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].query().to_string(), "suite3:sub:t:x=1");
        assert_eq!(
            leaves[0].run_case().unwrap().subcase_filters(),
            [case_params! { "y" => 1 }]
        );
        assert!(load("suite3:sub:t:x=1;y=7").await.is_err());
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let tree = load("suite2:foof:*").await.unwrap();
        let ctx = RunContext::new(Logger::new(crate::logging::LoggerOptions {
            debug: true,
            ..Default::default()
        }));
        let mut statuses = Vec::new();
        for leaf in tree.iterate_leaves() {
            statuses.push(leaf.run(&ctx).await);
        }
        assert_eq!(statuses, vec![Status::Pass, Status::Pass, Status::Fail]);
        let bleh = ctx.logger.get("suite2:foof:bleh:a=1").unwrap();
        assert_eq!(bleh.logs.len(), 2);
        let bluh = ctx.logger.get("suite2:foof:bluh,a:").unwrap();
        assert_eq!(bluh.logs[0].render(false), "EXPECTATION FAILED: bye");
    }

    #[tokio::test]
    async fn test_import_failure_becomes_failing_leaf() {
        let mut loader = MockTestFileLoader::new();
        loader.expect_listing().returning(|_| {
            Ok(vec![
                ListingEntry::Spec { path: vec!["bad".to_string()] },
                ListingEntry::Spec { path: vec!["good".to_string()] },
            ])
        });
        loader.expect_import_spec().returning(|suite, path| {
            if path[0] == "bad" {
                Err(SpecLoadError::new(suite, path, "syntax error"))
            } else {
                let mut g = crate::framework::TestGroup::new();
                g.test("t").test_fn(|_| async { Ok(()) });
                Ok(crate::framework::SpecFile {
                    description: String::new(),
                    g: std::sync::Arc::new(g),
                })
            }
        });
        let query = TestQuery::parse("s:*").unwrap();
        let tree = load_tree(&loader, &query, &[]).await.unwrap();
        let leaves: Vec<&TestTreeLeaf> = tree.iterate_leaves().collect();
        assert_eq!(leaves.len(), 2);
        assert!(leaves[0].load_error().is_some());
        assert_eq!(leaves[0].query().to_string(), "s:bad:*");

        let ctx = RunContext::new(Logger::default());
        assert_eq!(leaves[0].run(&ctx).await, Status::Fail);
        assert_eq!(leaves[1].run(&ctx).await, Status::Pass);
    }

    #[tokio::test]
    async fn test_unrepresentable_case_fails_only_its_test() {
        let mut r = SuiteRegistry::new();
        r.add_spec("s", "f", "", |g| {
            g.test("t")
                .params(|u| u.combine("v", ["ok", "a;b", "_nan_", "fine"]))
                .test_fn(|_| async { Ok(()) });
            g.test("u").test_fn(|_| async { Ok(()) });
        });
        let tree = load_tree(&r, &TestQuery::parse("s:*").unwrap(), &[]).await.unwrap();
        assert_eq!(
            names(&tree),
            vec!["s:f:t:v=\"ok\"", "s:f:t:*", "s:f:t:v=\"fine\"", "s:f:u:"]
        );

        let ctx = RunContext::new(Logger::default());
        let mut statuses = Vec::new();
        for leaf in tree.iterate_leaves() {
            statuses.push(leaf.run(&ctx).await);
        }
        assert_eq!(statuses, vec![Status::Pass, Status::Fail, Status::Pass, Status::Pass]);
        let logs = ctx.logger.get("s:f:t:*").unwrap().logs;
        assert!(logs[0].message.contains("a;b"), "{}", logs[0].message);
    }

    #[tokio::test]
    async fn test_unmatched_query_is_fatal() {
        assert!(matches!(
            load("suite1:nothere,*").await,
            Err(HarnessError::Listing(ListingError::NoMatch(_)))
        ));
    }

    #[tokio::test]
    async fn test_display_dump() {
        let tree = load("suite1:foo:hello:").await.unwrap();
        let dump = tree.to_string();
        assert!(dump.starts_with("+ 1 / 0 \"suite1:*\" => suite1:*"));
        assert!(dump.contains("> \"hello:\" => suite1:foo:hello:"));
    }
}
