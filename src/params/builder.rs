//! Parameter-space builder
//!
//! A builder is a pipeline of stages applied to a single empty base
//! assignment. Nothing is expanded until iteration, and every iteration
//! replays the same stages, so the output order is fully determined by the
//! builder definition:
//!
//! ```
//! use cts_harness::params::ParamsBuilder;
//! let b = ParamsBuilder::new().combine("x", [1, 2]).combine("y", [3, 4]);
//! let cases: Vec<String> = b.iterate_cases().map(|p| p.to_string()).collect();
//! assert_eq!(cases, ["x=1;y=3", "x=1;y=4", "x=2;y=3", "x=2;y=4"]);
//! ```

use super::{CaseParams, ParamValue};
use crate::query::is_valid_query_part;
use std::sync::Arc;

type ExpandFn = Arc<dyn Fn(&CaseParams) -> Vec<ParamValue> + Send + Sync>;
type ExpandParamsFn = Arc<dyn Fn(&CaseParams) -> Vec<CaseParams> + Send + Sync>;
type Predicate = Arc<dyn Fn(&CaseParams) -> bool + Send + Sync>;

#[derive(Clone)]
enum Stage {
    Combine { name: String, values: Vec<ParamValue> },
    CombineParams(Vec<CaseParams>),
    Expand { name: String, f: ExpandFn },
    ExpandParams(ExpandParamsFn),
    Filter(Predicate),
    Exclude(Vec<CaseParams>),
}

/// Describes a test's parameter space, split into case-level and
/// (optionally) subcase-level axes.
#[derive(Clone, Default)]
pub struct ParamsBuilder {
    case_stages: Vec<Stage>,
    subcase_stages: Option<Vec<Stage>>,
    axes: Vec<String>,
    definition_errors: Vec<String>,
}

impl ParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cartesian product with a new axis. Existing assignments form the
    /// outer loop and `values` the inner loop.
    pub fn combine<V: Into<ParamValue>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let name = name.into();
        self.declare_axis(&name);
        let values = values.into_iter().map(Into::into).collect();
        self.push(Stage::Combine { name, values });
        self
    }

    /// Cartesian product with a list of multi-key assignments
    pub fn combine_with_params(mut self, list: impl IntoIterator<Item = CaseParams>) -> Self {
        let list: Vec<CaseParams> = list.into_iter().collect();
        let mut keys: Vec<String> = Vec::new();
        for p in &list {
            for k in p.keys() {
                if !keys.iter().any(|seen| seen == k) {
                    keys.push(k.to_string());
                }
            }
        }
        for k in &keys {
            self.declare_axis(k);
        }
        self.push(Stage::CombineParams(list));
        self
    }

    /// Add an axis whose values depend on the assignment built so far
    pub fn expand<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&CaseParams) -> Vec<ParamValue> + Send + Sync + 'static,
    {
        let name = name.into();
        self.declare_axis(&name);
        self.push(Stage::Expand {
            name,
            f: Arc::new(f),
        });
        self
    }

    /// Like [`expand`](Self::expand), but `f` yields multi-key partial
    /// assignments. Their keys are only known once `f` runs, so collisions
    /// with keys already assigned show up in
    /// [`definition_errors`](Self::definition_errors).
    pub fn expand_with_params<F>(mut self, f: F) -> Self
    where
        F: Fn(&CaseParams) -> Vec<CaseParams> + Send + Sync + 'static,
    {
        self.push(Stage::ExpandParams(Arc::new(f)));
        self
    }

    /// Keep only assignments for which `pred` holds
    pub fn filter<F>(mut self, pred: F) -> Self
    where
        F: Fn(&CaseParams) -> bool + Send + Sync + 'static,
    {
        self.push(Stage::Filter(Arc::new(pred)));
        self
    }

    /// Drop assignments for which `pred` holds
    pub fn unless<F>(self, pred: F) -> Self
    where
        F: Fn(&CaseParams) -> bool + Send + Sync + 'static,
    {
        self.filter(move |p| !pred(p))
    }

    /// Drop every assignment that matches one of the partial assignments
    pub fn exclude(mut self, partials: impl IntoIterator<Item = CaseParams>) -> Self {
        self.push(Stage::Exclude(partials.into_iter().collect()));
        self
    }

    /// Axes added after this point expand into subcases of each case
    pub fn begin_subcases(mut self) -> Self {
        if self.subcase_stages.is_some() {
            self.definition_errors
                .push("begin_subcases() called more than once".to_string());
        } else {
            self.subcase_stages = Some(Vec::new());
        }
        self
    }

    pub fn has_subcases(&self) -> bool {
        self.subcase_stages.is_some()
    }

    /// Problems with how the builder was defined: duplicate or invalid axis
    /// names, repeated subcase boundaries, and `expand_with_params` partials
    /// that reuse an assigned key. The last check expands the whole space.
    pub fn definition_errors(&self) -> Vec<String> {
        let mut errors = self.definition_errors.clone();
        check_expanded_keys(&self.case_stages, &CaseParams::new(), &mut errors);
        if let Some(subcase_stages) = &self.subcase_stages
            && subcase_stages.iter().any(|s| matches!(s, Stage::ExpandParams(_)))
        {
            for case in apply_stages(&self.case_stages, CaseParams::new()) {
                check_expanded_keys(subcase_stages, &case, &mut errors);
            }
        }
        errors
    }

    /// Case-level assignments, in deterministic order.
    ///
    /// When subcases are declared, cases that expand to zero subcases are
    /// skipped.
    pub fn iterate_cases(&self) -> impl Iterator<Item = CaseParams> + '_ {
        apply_stages(&self.case_stages, CaseParams::new()).filter(move |case| {
            self.iterate_subcases(case)
                .is_none_or(|mut subcases| subcases.next().is_some())
        })
    }

    /// Subcase-local assignments for one case, or `None` if the builder has
    /// no subcase boundary. Yielded params hold only the subcase axes.
    pub fn iterate_subcases<'a>(
        &'a self,
        case: &CaseParams,
    ) -> Option<Box<dyn Iterator<Item = CaseParams> + 'a>> {
        let stages = self.subcase_stages.as_ref()?;
        let case_keys: Vec<String> = case.keys().map(str::to_string).collect();
        Some(Box::new(apply_stages(stages, case.clone()).map(
            move |full| full.without_keys(case_keys.iter().map(String::as_str)),
        )))
    }

    fn push(&mut self, stage: Stage) {
        match self.subcase_stages.as_mut() {
            Some(stages) => stages.push(stage),
            None => self.case_stages.push(stage),
        }
    }

    fn declare_axis(&mut self, name: &str) {
        if !is_valid_query_part(name) {
            self.definition_errors
                .push(format!("invalid parameter name `{}`", name));
        }
        if self.axes.iter().any(|a| a == name) {
            self.definition_errors
                .push(format!("duplicate parameter axis `{}`", name));
        } else {
            self.axes.push(name.to_string());
        }
    }
}

/// Check the keys yielded by every `ExpandParams` stage against the keys
/// already assigned when it runs
fn check_expanded_keys(stages: &[Stage], base: &CaseParams, errors: &mut Vec<String>) {
    for (i, stage) in stages.iter().enumerate() {
        let Stage::ExpandParams(f) = stage else {
            continue;
        };
        for p in apply_stages(&stages[..i], base.clone()) {
            for partial in (f.as_ref())(&p) {
                for key in partial.keys() {
                    let problem = if p.contains_key(key) {
                        format!("expand_with_params yielded key `{}` already assigned in {}", key, p)
                    } else if !is_valid_query_part(key) {
                        format!("invalid parameter name `{}`", key)
                    } else {
                        continue;
                    };
                    if !errors.contains(&problem) {
                        errors.push(problem);
                    }
                }
            }
        }
    }
}

fn apply_stages<'a>(
    stages: &'a [Stage],
    base: CaseParams,
) -> Box<dyn Iterator<Item = CaseParams> + 'a> {
    let mut iter: Box<dyn Iterator<Item = CaseParams> + 'a> = Box::new(std::iter::once(base));
    for stage in stages {
        iter = match stage {
            Stage::Combine { name, values } => Box::new(iter.flat_map(move |p| {
                values.iter().map(move |v| p.extended(name, v.clone()))
            })),
            Stage::CombineParams(list) => {
                Box::new(iter.flat_map(move |p| list.iter().map(move |q| p.merged(q))))
            }
            Stage::Expand { name, f } => Box::new(iter.flat_map(move |p| {
                let values = (f.as_ref())(&p);
                values.into_iter().map(move |v| p.extended(name, v))
            })),
            Stage::ExpandParams(f) => Box::new(iter.flat_map(move |p| {
                let partials = (f.as_ref())(&p);
                partials.into_iter().map(move |q| p.merged(&q))
            })),
            Stage::Filter(pred) => Box::new(iter.filter(move |p| (pred.as_ref())(p))),
            Stage::Exclude(partials) => {
                Box::new(iter.filter(move |p| !partials.iter().any(|e| p.matches_partial(e))))
            }
        };
    }
    iter
}
