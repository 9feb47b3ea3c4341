use super::model::Dataset;
use super::predicate::Predicate;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Filter criteria and the subsets they produce
// ---------------------------------------------------------------------------

/// A named predicate over a feature's attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub name: String,
    pub predicate: Predicate,
}

impl Criterion {
    pub fn new(name: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }

    /// Parse the predicate from its textual form, e.g. `AWDT_2023>0 & CNT2LOADDIF<-20`.
    pub fn parse(name: impl Into<String>, expr: &str) -> Result<Self> {
        let name = name.into();
        let predicate = expr
            .parse::<Predicate>()
            .map_err(|e| PipelineError::Config(format!("criterion '{name}': {e}")))?;
        Ok(Self { name, predicate })
    }
}

/// The features of one dataset that satisfy one criterion, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Subset {
    pub criterion: String,
    pub data: Dataset,
}

/// Evaluate each criterion independently against `dataset`.
///
/// Returns one subset per criterion, in criterion order.  A feature may land
/// in zero, one or many subsets.  Every attribute a predicate mentions must be
/// present on every feature; the check does not depend on short-circuiting.
pub fn apply(dataset: &Dataset, criteria: &[Criterion]) -> Result<Vec<Subset>> {
    criteria
        .iter()
        .map(|criterion| {
            let subset = filter_one(dataset, criterion)?;
            log::debug!(
                "'{}' on '{}': {} of {} features",
                criterion.name,
                dataset.name,
                subset.data.len(),
                dataset.len()
            );
            if subset.data.is_empty() && !dataset.is_empty() {
                log::warn!("criterion '{}' matched no features", criterion.name);
            }
            Ok(subset)
        })
        .collect()
}

/// Indices of features in `dataset` that satisfy `criterion`.
pub fn matching_indices(dataset: &Dataset, criterion: &Criterion) -> Result<Vec<usize>> {
    let attributes = criterion.predicate.attributes();
    let mut indices = Vec::new();

    for (i, feature) in dataset.features.iter().enumerate() {
        if let Some(missing) = attributes.iter().find(|a| feature.get(a).is_none()) {
            return Err(PipelineError::AttributeMissing {
                attribute: missing.to_string(),
                context: format!("criterion '{}'", criterion.name),
                dataset: dataset.name.clone(),
            });
        }
        if criterion.predicate.matches(feature) {
            indices.push(i);
        }
    }
    Ok(indices)
}

fn filter_one(dataset: &Dataset, criterion: &Criterion) -> Result<Subset> {
    let features = matching_indices(dataset, criterion)?
        .into_iter()
        .map(|i| dataset.features[i].clone())
        .collect();
    Ok(Subset {
        criterion: criterion.name.clone(),
        data: dataset.derive(criterion.name.clone(), features),
    })
}
