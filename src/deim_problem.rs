//! Problems whose non-affine operators are replaced by discrete empirical interpolation.
use crate::affine::{AffineDecomposition, Operator};
use crate::context::ReductionContext;
use crate::eim::{
    ApproximationKind, EimApproximation, EimReductionMethod, EimSettings, ParametrizedTensorFactory,
};
use crate::expression::Classification;
use crate::io::Folder;
use crate::parameters::{Distribution, ParameterRange};
use crate::problem::{
    DeimSize, DifferentialProblem, ParametrizedProblem, PicardSettings, ProblemState, SolveOptions,
    TruthProblem,
};
use crate::space::FunctionSpace;
use eyre::eyre;
use log::{debug, info};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// One operator of a term of the decorated problem.
enum DeimEntry {
    /// A parametrized form, replaced by the basis tensors of its approximation.
    Approximated {
        index: usize,
        classification: Classification,
        approximation: EimApproximation,
    },
    /// An operator left as is.
    Unchanged {
        index: usize,
        classification: Classification,
        operator: Operator,
    },
}

#[derive(Default)]
struct DeimTerm {
    entries: Vec<DeimEntry>,
    num_operators: usize,
}

/// The DEIM approximations of all terms, and the online number of basis functions of each.
#[derive(Default)]
pub struct DeimStrategy {
    terms: BTreeMap<String, DeimTerm>,
    n_deim: BTreeMap<(String, usize), usize>,
    options: Option<SolveOptions>,
    updates: usize,
}

impl DeimStrategy {
    fn approximations(&self) -> impl Iterator<Item = (&str, usize, &EimApproximation)> {
        self.terms.iter().flat_map(|(term, record)| {
            record.entries.iter().filter_map(move |entry| match entry {
                DeimEntry::Approximated {
                    index, approximation, ..
                } => Some((term.as_str(), *index, approximation)),
                DeimEntry::Unchanged { .. } => None,
            })
        })
    }

    /// Number of approximated and unchanged operators of a term.
    fn counts(&self, term: &str) -> Option<(usize, usize)> {
        self.terms.get(term).map(|record| {
            let approximated = record
                .entries
                .iter()
                .filter(|e| matches!(e, DeimEntry::Approximated { .. }))
                .count();
            (approximated, record.entries.len() - approximated)
        })
    }
}

/// A differential problem whose parametrized forms are approximated by DEIM.
///
/// The decorated problem shares its identity and state with the wrapped problem, and solves with
/// the wrapped solver, which receives the decorated affine decomposition.
pub struct DeimDecoratedProblem<P> {
    inner: Rc<P>,
    strategy: RefCell<DeimStrategy>,
    folder: RefCell<Option<Folder>>,
}

impl<P: DifferentialProblem + 'static> DeimDecoratedProblem<P> {
    pub fn new(inner: &Rc<P>) -> Rc<Self> {
        Rc::new(Self {
            inner: Rc::clone(inner),
            strategy: RefCell::new(DeimStrategy::default()),
            folder: RefCell::new(None),
        })
    }

    pub fn inner(&self) -> &Rc<P> {
        &self.inner
    }

    /// Persists approximations created by the next call to
    /// [`set_mu_range`](ParametrizedProblem::set_mu_range) in subfolders of `folder`.
    pub fn set_folder(&self, folder: Folder) {
        *self.folder.borrow_mut() = Some(folder);
    }

    /// Classifies every operator and creates one approximation for each parametrized form.
    fn initialize_strategy(&self, range: &ParameterRange) -> eyre::Result<()> {
        let context = self.inner.context();
        let folder = self.folder.borrow();
        let mut terms = BTreeMap::new();
        for term in self.inner.terms() {
            let operators = self.inner.assemble_operator(&term)?;
            let mut record = DeimTerm {
                entries: Vec::new(),
                num_operators: operators.len(),
            };
            let mut unchanged = Vec::new();
            for (index, operator) in operators.into_iter().enumerate() {
                let classification = operator
                    .as_form()
                    .map(|form| form.classification())
                    .unwrap_or_default();
                match operator {
                    Operator::Form(form) if classification.parametrized => {
                        let kind = match (classification.time_dependent, self.inner.time_grid()) {
                            (true, Some(time_grid)) => {
                                ApproximationKind::TimeDependent { time_grid }
                            }
                            _ => ApproximationKind::Stationary,
                        };
                        let name = format!("{}_{}_{}", self.inner.name(), term, index);
                        let factory = ParametrizedTensorFactory::new(name, context, &form);
                        let mut approximation =
                            EimApproximation::new(context, Box::new(factory), kind);
                        if let Some(folder) = folder.as_ref() {
                            approximation = approximation.with_folder(folder);
                        }
                        approximation.set_mu_range(range.clone())?;
                        record.entries.push(DeimEntry::Approximated {
                            index,
                            classification,
                            approximation,
                        });
                    }
                    operator => unchanged.push(DeimEntry::Unchanged {
                        index,
                        classification,
                        operator,
                    }),
                }
            }
            record.entries.extend(unchanged);
            debug!(
                "Term {} of {}: {} DEIM approximations",
                term,
                self.inner.name(),
                record
                    .entries
                    .iter()
                    .filter(|e| matches!(e, DeimEntry::Approximated { .. }))
                    .count()
            );
            terms.insert(term, record);
        }
        let mut strategy = self.strategy.borrow_mut();
        strategy.terms = terms;
        strategy.n_deim.clear();
        strategy.options = None;
        Ok(())
    }

    /// Runs the offline phase of every approximation, in registration order.
    pub fn train_deim(
        &self,
        settings: &EimSettings,
        training_size: usize,
        distribution: Distribution,
    ) -> eyre::Result<()> {
        let mut strategy = self.strategy.borrow_mut();
        for record in strategy.terms.values_mut() {
            for entry in &mut record.entries {
                if let DeimEntry::Approximated { approximation, .. } = entry {
                    info!("Training DEIM approximation {}", approximation.name());
                    let mut method = EimReductionMethod::new(settings.clone());
                    method.initialize_training_set(approximation, training_size, distribution)?;
                    method.offline(approximation)?;
                }
            }
        }
        Ok(())
    }

    /// Number of DEIM approximations of a term and number of operators kept unchanged.
    pub fn deim_counts(&self, term: &str) -> Option<(usize, usize)> {
        self.strategy.borrow().counts(term)
    }

    /// The approximation of operator `index` of `term`, if that operator is approximated.
    pub fn approximation(&self, term: &str, index: usize) -> Option<Ref<'_, EimApproximation>> {
        Ref::filter_map(self.strategy.borrow(), |strategy| {
            strategy
                .approximations()
                .find(|&(t, i, _)| t == term && i == index)
                .map(|(_, _, approximation)| approximation)
        })
        .ok()
    }

    /// Names of all approximations, in registration order.
    pub fn approximation_names(&self) -> Vec<String> {
        self.strategy
            .borrow()
            .approximations()
            .map(|(_, _, approximation)| approximation.name().to_string())
            .collect()
    }

    /// Number of times the online DEIM sizes were recomputed from solve options.
    pub fn deim_option_updates(&self) -> usize {
        self.strategy.borrow().updates
    }

    /// The classification of operator `index` of `term`, computed when the parameter range was set.
    pub fn classification(&self, term: &str, index: usize) -> Option<Classification> {
        let strategy = self.strategy.borrow();
        let record = strategy.terms.get(term)?;
        record.entries.iter().find_map(|entry| match entry {
            DeimEntry::Approximated {
                index: i, classification, ..
            }
            | DeimEntry::Unchanged {
                index: i, classification, ..
            } if *i == index => Some(*classification),
            _ => None,
        })
    }

    pub fn solve_with_options(&self, options: &SolveOptions) -> eyre::Result<DVector<f64>> {
        self.update_solve_options(options)?;
        self.solve()
    }
}

impl<P: DifferentialProblem + 'static> ParametrizedProblem for DeimDecoratedProblem<P> {
    fn state(&self) -> &ProblemState {
        self.inner.state()
    }

    fn set_mu_range(&self, range: ParameterRange) -> eyre::Result<()> {
        self.inner.set_mu_range(range.clone())?;
        self.initialize_strategy(&range)
    }
}

impl<P: DifferentialProblem + 'static> TruthProblem for DeimDecoratedProblem<P> {
    fn space(&self) -> &Rc<FunctionSpace> {
        self.inner.space()
    }

    fn solve(&self) -> eyre::Result<DVector<f64>> {
        self.inner.solve_with(self)
    }

    fn components(&self) -> Vec<String> {
        self.inner.components()
    }

    fn inner_product(&self, component: &str) -> Option<CsrMatrix<f64>> {
        self.inner.inner_product(component)
    }
}

impl<P: DifferentialProblem + 'static> AffineDecomposition for DeimDecoratedProblem<P> {
    fn terms(&self) -> Vec<String> {
        self.inner.terms()
    }

    fn assemble_operator(&self, term: &str) -> eyre::Result<Vec<Operator>> {
        let strategy = self.strategy.borrow();
        let record = strategy
            .terms
            .get(term)
            .ok_or_else(|| eyre!("Unknown term {term}; was the parameter range set?"))?;
        let mut operators = Vec::new();
        for entry in &record.entries {
            match entry {
                DeimEntry::Approximated { approximation, .. } => operators.extend(
                    approximation
                        .basis_tensors()?
                        .into_iter()
                        .map(Operator::Tensor),
                ),
                DeimEntry::Unchanged { operator, .. } => operators.push(operator.clone()),
            }
        }
        Ok(operators)
    }

    fn compute_theta(&self, term: &str) -> eyre::Result<Vec<f64>> {
        let original = self.inner.compute_theta(term)?;
        let strategy = self.strategy.borrow();
        let record = strategy
            .terms
            .get(term)
            .ok_or_else(|| eyre!("Unknown term {term}; was the parameter range set?"))?;
        assert_eq!(
            original.len(),
            record.num_operators,
            "Number of coefficients of term {term} does not match its number of operators"
        );

        let mu = self.mu();
        let t = self.time();
        let mut thetas = Vec::new();
        for entry in &record.entries {
            match entry {
                DeimEntry::Approximated {
                    index, approximation, ..
                } => {
                    approximation.set_parameter_and_time(&mu, t);
                    let n = strategy.n_deim.get(&(term.to_string(), *index)).copied();
                    let interpolated = approximation.compute_interpolated_theta(n)?;
                    thetas.extend(interpolated.into_iter().map(|theta| theta * original[*index]));
                }
                DeimEntry::Unchanged { index, .. } => thetas.push(original[*index]),
            }
        }
        Ok(thetas)
    }

    /// # Errors
    ///
    /// Returns an error if per-term sizes do not cover every approximation.
    ///
    /// # Panics
    ///
    /// Panics if a size exceeds the number of trained basis functions of its approximation, or
    /// refers to an operator that is not approximated.
    fn update_solve_options(&self, options: &SolveOptions) -> eyre::Result<()> {
        self.inner.update_solve_options(options)?;
        let mut strategy = self.strategy.borrow_mut();
        if strategy.options.as_ref() == Some(options) {
            return Ok(());
        }

        let mut n_deim = BTreeMap::new();
        match &options.deim {
            None => {}
            Some(DeimSize::Uniform(n)) => {
                for (term, index, approximation) in strategy.approximations() {
                    assert!(
                        *n <= approximation.len(),
                        "N_DEIM = {n} exceeds the {} trained basis functions of {}",
                        approximation.len(),
                        approximation.name()
                    );
                    n_deim.insert((term.to_string(), index), *n);
                }
            }
            Some(DeimSize::PerTerm(per_term)) => {
                for (term, sizes) in per_term {
                    for (index, n) in sizes {
                        let approximation = strategy
                            .approximations()
                            .find(|&(t, i, _)| t == term.as_str() && i == *index)
                            .map(|(_, _, approximation)| approximation)
                            .unwrap_or_else(|| {
                                panic!("Operator {index} of term {term} is not approximated")
                            });
                        assert!(
                            *n <= approximation.len(),
                            "N_DEIM = {n} exceeds the {} trained basis functions of {}",
                            approximation.len(),
                            approximation.name()
                        );
                        n_deim.insert((term.clone(), *index), *n);
                    }
                }
                if let Some((term, index, approximation)) = strategy
                    .approximations()
                    .find(|&(term, index, _)| !n_deim.contains_key(&(term.to_string(), index)))
                {
                    return Err(eyre!(
                        "No DEIM size given for operator {index} of term {term} ({})",
                        approximation.name()
                    ));
                }
            }
        }
        strategy.n_deim = n_deim;
        strategy.options = Some(options.clone());
        strategy.updates += 1;
        drop(strategy);
        self.state().invalidate();
        Ok(())
    }
}

impl<P: DifferentialProblem + 'static> DifferentialProblem for DeimDecoratedProblem<P> {
    fn context(&self) -> &Rc<ReductionContext> {
        self.inner.context()
    }

    fn solve_with(&self, operators: &dyn AffineDecomposition) -> eyre::Result<DVector<f64>> {
        self.inner.solve_with(operators)
    }

    fn time_grid(&self) -> Option<Vec<f64>> {
        self.inner.time_grid()
    }

    fn picard_settings(&self) -> Option<PicardSettings> {
        self.inner.picard_settings()
    }
}
