//! Reduced dimensions of multi-component problems.
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::AddAssign;

/// The number of basis functions per component of a reduced problem.
///
/// Comparisons against a plain number compare every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineSize(Vec<(String, usize)>);

impl OnlineSize {
    /// The same size for every component.
    pub fn uniform<S: AsRef<str>>(components: &[S], n: usize) -> Self {
        Self(components.iter().map(|c| (c.as_ref().to_string(), n)).collect())
    }

    /// # Panics
    ///
    /// Panics unless `sizes` names exactly the given components.
    pub fn from_components<S: AsRef<str>>(components: &[S], sizes: &[(&str, usize)]) -> Self {
        assert_eq!(
            sizes.len(),
            components.len(),
            "Online size must be given for every component"
        );
        let entries = components
            .iter()
            .map(|component| {
                let component = component.as_ref();
                let n = sizes
                    .iter()
                    .find(|(name, _)| *name == component)
                    .map(|(_, n)| *n)
                    .unwrap_or_else(|| panic!("Missing online size for component {component}"));
                (component.to_string(), n)
            })
            .collect();
        Self(entries)
    }

    /// Sizes from a function of the component name.
    pub fn generate<S: AsRef<str>>(components: &[S], mut f: impl FnMut(&str) -> usize) -> Self {
        Self(
            components
                .iter()
                .map(|c| (c.as_ref().to_string(), f(c.as_ref())))
                .collect(),
        )
    }

    pub fn get(&self, component: &str) -> Option<usize> {
        self.0.iter().find(|(name, _)| name == component).map(|(_, n)| *n)
    }

    pub fn total(&self) -> usize {
        self.0.iter().map(|(_, n)| n).sum()
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(name, n)| (name.as_str(), *n))
    }

    /// Component-wise minimum.
    pub fn min(&self, other: &OnlineSize) -> OnlineSize {
        Self::generate(&self.components().collect::<Vec<_>>(), |c| {
            let n = self.get(c).unwrap_or(0);
            other.get(c).map_or(n, |m| n.min(m))
        })
    }
}

impl AddAssign<usize> for OnlineSize {
    fn add_assign(&mut self, rhs: usize) {
        for (_, n) in &mut self.0 {
            *n += rhs;
        }
    }
}

impl PartialEq<usize> for OnlineSize {
    fn eq(&self, other: &usize) -> bool {
        self.0.iter().all(|(_, n)| n == other)
    }
}

impl PartialOrd<usize> for OnlineSize {
    /// Defined only when all components compare the same way.
    fn partial_cmp(&self, other: &usize) -> Option<Ordering> {
        let mut orderings = self.0.iter().map(|(_, n)| n.cmp(other));
        let first = orderings.next()?;
        orderings.all(|o| o == first).then_some(first)
    }

    fn lt(&self, other: &usize) -> bool {
        self.0.iter().all(|(_, n)| n < other)
    }

    fn le(&self, other: &usize) -> bool {
        self.0.iter().all(|(_, n)| n <= other)
    }

    fn gt(&self, other: &usize) -> bool {
        self.0.iter().all(|(_, n)| n > other)
    }

    fn ge(&self, other: &usize) -> bool {
        self.0.iter().all(|(_, n)| n >= other)
    }
}

impl fmt::Display for OnlineSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [(_, n)] = self.0.as_slice() {
            return write!(f, "{n}");
        }
        write!(f, "{{")?;
        for (i, (name, n)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {n}")?;
        }
        write!(f, "}}")
    }
}
