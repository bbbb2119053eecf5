//! Canonicalization of multi-hot treatment indicators into treatment-set ids.
//!
//! Every distinct indicator row becomes one [`TreatmentSet`]; ids are dense and
//! assigned in order of first appearance in the input.

use std::collections::HashMap;

use thiserror::Error;

use crate::types::TreatmentSet;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("treatment row {row} has {found} columns, expected {expected}")]
    WidthMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("treatment row {row} column {column} has indicator value {value}, expected 0 or 1")]
    InvalidIndicator { row: usize, column: usize, value: u8 },
    #[error("treatment row {row} matches no treatment set")]
    NoMatch { row: usize },
    #[error("treatment row {row} matches several treatment sets: {matches:?}")]
    Ambiguous { row: usize, matches: Vec<usize> },
}

impl IntegrityError {
    pub fn row(&self) -> usize {
        match self {
            IntegrityError::WidthMismatch { row, .. }
            | IntegrityError::InvalidIndicator { row, .. }
            | IntegrityError::NoMatch { row }
            | IntegrityError::Ambiguous { row, .. } => *row,
        }
    }

    /// Same error reported against another row index.
    pub fn at_row(mut self, new_row: usize) -> Self {
        match &mut self {
            IntegrityError::WidthMismatch { row, .. }
            | IntegrityError::InvalidIndicator { row, .. }
            | IntegrityError::NoMatch { row }
            | IntegrityError::Ambiguous { row, .. } => *row = new_row,
        }
        self
    }
}

/// Membership bit-vector, the lookup key of a treatment set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MembershipKey(Vec<bool>);

impl MembershipKey {
    /// Validate one raw indicator row.
    pub fn from_indicators(row: usize, indicators: &[u8], width: usize) -> Result<Self, IntegrityError> {
        if indicators.len() != width {
            return Err(IntegrityError::WidthMismatch {
                row,
                expected: width,
                found: indicators.len(),
            });
        }

        indicators
            .iter()
            .enumerate()
            .map(|(column, &value)| match value {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(IntegrityError::InvalidIndicator { row, column, value }),
            })
            .collect::<Result<Vec<bool>, _>>()
            .map(MembershipKey)
    }

    pub fn bits(&self) -> &[bool] {
        &self.0
    }
}

/// Ordered list of treatment sets with an exact-match index.
#[derive(Debug, Clone)]
pub struct TreatmentCatalogue {
    agents: Vec<String>,
    sets: Vec<TreatmentSet>,
    index: HashMap<MembershipKey, Vec<usize>>,
}

impl TreatmentCatalogue {
    /// Build a catalogue from explicit membership vectors; ids follow the
    /// given order. Repeated vectors are kept and make matching rows ambiguous.
    pub fn from_sets(agents: &[String], memberships: Vec<Vec<bool>>) -> Self {
        let mut catalogue = Self {
            agents: agents.to_vec(),
            sets: Vec::with_capacity(memberships.len()),
            index: HashMap::new(),
        };
        for membership in memberships {
            catalogue.push(MembershipKey(membership));
        }
        catalogue
    }

    fn push(&mut self, key: MembershipKey) -> usize {
        let id = self.sets.len();
        let member_agents = key
            .bits()
            .iter()
            .zip(self.agents.iter())
            .filter(|(bit, _)| **bit)
            .map(|(_, name)| name.clone())
            .collect();

        self.sets.push(TreatmentSet {
            id,
            member_agents,
            membership: key.bits().to_vec(),
        });
        self.index.entry(key).or_default().push(id);
        id
    }

    /// Map one validated row to its treatment-set id.
    pub fn assign(&self, row: usize, key: &MembershipKey) -> Result<usize, IntegrityError> {
        match self.index.get(key).map(Vec::as_slice) {
            None | Some([]) => Err(IntegrityError::NoMatch { row }),
            Some([id]) => Ok(*id),
            Some(ids) => Err(IntegrityError::Ambiguous {
                row,
                matches: ids.to_vec(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn sets(&self) -> &[TreatmentSet] {
        &self.sets
    }

    pub fn get(&self, id: usize) -> Option<&TreatmentSet> {
        self.sets.get(id)
    }

    pub fn agents(&self) -> &[String] {
        &self.agents
    }
}

/// Catalogue plus the arm id of every input row.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub catalogue: TreatmentCatalogue,
    pub arms: Vec<usize>,
}

impl Resolution {
    /// Observed sample count per arm
    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.catalogue.len()];
        for &arm in &self.arms {
            counts[arm] += 1;
        }
        counts
    }
}

pub struct TreatmentSetResolver {
    agents: Vec<String>,
}

impl TreatmentSetResolver {
    pub fn new(agents: Vec<String>) -> Self {
        Self { agents }
    }

    pub fn agents(&self) -> &[String] {
        &self.agents
    }

    /// Build the catalogue from the distinct rows of `raw`, then assign every
    /// row against it.
    pub fn resolve(&self, raw: &[Vec<u8>]) -> Result<Resolution, IntegrityError> {
        let width = self.agents.len();
        let keys = raw
            .iter()
            .enumerate()
            .map(|(row, indicators)| MembershipKey::from_indicators(row, indicators, width))
            .collect::<Result<Vec<_>, _>>()?;

        let mut catalogue = TreatmentCatalogue::from_sets(&self.agents, Vec::new());
        for key in &keys {
            if !catalogue.index.contains_key(key) {
                catalogue.push(key.clone());
            }
        }

        self.resolve_against(catalogue, &keys)
    }

    /// Assign every row of `raw` against an existing catalogue.
    pub fn resolve_with(
        &self,
        catalogue: TreatmentCatalogue,
        raw: &[Vec<u8>],
    ) -> Result<Resolution, IntegrityError> {
        let width = self.agents.len();
        let keys = raw
            .iter()
            .enumerate()
            .map(|(row, indicators)| MembershipKey::from_indicators(row, indicators, width))
            .collect::<Result<Vec<_>, _>>()?;
        self.resolve_against(catalogue, &keys)
    }

    fn resolve_against(
        &self,
        catalogue: TreatmentCatalogue,
        keys: &[MembershipKey],
    ) -> Result<Resolution, IntegrityError> {
        let arms = keys
            .iter()
            .enumerate()
            .map(|(row, key)| catalogue.assign(row, key))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            rows = keys.len(),
            treatment_sets = catalogue.len(),
            "resolved treatment sets"
        );

        Ok(Resolution { catalogue, arms })
    }
}
