//! The observation model: everything a tool or specialist produces is an
//! [`Observation`] filed under a [`SourceKey`], and a run accumulates them
//! in an insertion-ordered [`ObservationSet`].

use serde::{Deserialize, Serialize};

use crate::model::{
    EhrRecord, GuidanceReport, GuidelineHit, ImagingReport, Interaction, LabPanel,
    MedicationList, RiskReport, TrendReport,
};

/// Where a piece of evidence came from. The `as_str` forms double as the
/// citation tags a narrative must carry (`[EHR]`, `[LABS]`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKey {
    Ehr,
    Labs,
    Meds,
    Imaging,
    Ddi,
    Guide,
    Analysis,
    Risks,
    Guidelines,
}

impl SourceKey {
    pub const ALL: [SourceKey; 9] = [
        SourceKey::Ehr,
        SourceKey::Labs,
        SourceKey::Meds,
        SourceKey::Imaging,
        SourceKey::Ddi,
        SourceKey::Guide,
        SourceKey::Analysis,
        SourceKey::Risks,
        SourceKey::Guidelines,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKey::Ehr => "EHR",
            SourceKey::Labs => "LABS",
            SourceKey::Meds => "MEDS",
            SourceKey::Imaging => "IMAGING",
            SourceKey::Ddi => "DDI",
            SourceKey::Guide => "GUIDE",
            SourceKey::Analysis => "ANALYSIS",
            SourceKey::Risks => "RISKS",
            SourceKey::Guidelines => "GUIDELINES",
        }
    }

    /// The citation tag form, e.g. `[LABS]`.
    pub fn tag(&self) -> &'static str {
        match self {
            SourceKey::Ehr => "[EHR]",
            SourceKey::Labs => "[LABS]",
            SourceKey::Meds => "[MEDS]",
            SourceKey::Imaging => "[IMAGING]",
            SourceKey::Ddi => "[DDI]",
            SourceKey::Guide => "[GUIDE]",
            SourceKey::Analysis => "[ANALYSIS]",
            SourceKey::Risks => "[RISKS]",
            SourceKey::Guidelines => "[GUIDELINES]",
        }
    }
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One piece of evidence. Tool failures become `Error` observations so a
/// run always has a record under every key it attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    Ehr(EhrRecord),
    Labs(LabPanel),
    Meds(MedicationList),
    Imaging(ImagingReport),
    Interactions(Vec<Interaction>),
    Guidelines(Vec<GuidelineHit>),
    Trends(TrendReport),
    Risks(RiskReport),
    Guidance(GuidanceReport),
    Error { reason: String },
}

impl Observation {
    pub fn is_error(&self) -> bool {
        matches!(self, Observation::Error { .. })
    }
}

/// Insertion-ordered map from source key to observation. Re-inserting an
/// existing key replaces the value but keeps the original position, so a
/// rendered narrative cites sources in the order they were gathered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationSet {
    entries: Vec<(SourceKey, Observation)>,
}

impl ObservationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: SourceKey, observation: Observation) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = observation;
        } else {
            self.entries.push((key, observation));
        }
    }

    pub fn get(&self, key: SourceKey) -> Option<&Observation> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, obs)| obs)
    }

    pub fn contains(&self, key: SourceKey) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = SourceKey> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SourceKey, &Observation)> {
        self.entries.iter().map(|(k, obs)| (*k, obs))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ehr(&self) -> Option<&EhrRecord> {
        match self.get(SourceKey::Ehr) {
            Some(Observation::Ehr(record)) => Some(record),
            _ => None,
        }
    }

    pub fn labs(&self) -> Option<&LabPanel> {
        match self.get(SourceKey::Labs) {
            Some(Observation::Labs(panel)) => Some(panel),
            _ => None,
        }
    }

    pub fn meds(&self) -> Option<&MedicationList> {
        match self.get(SourceKey::Meds) {
            Some(Observation::Meds(list)) => Some(list),
            _ => None,
        }
    }

    pub fn interactions(&self) -> Option<&[Interaction]> {
        match self.get(SourceKey::Ddi) {
            Some(Observation::Interactions(list)) => Some(list),
            _ => None,
        }
    }

    pub fn guidelines(&self) -> Option<&[GuidelineHit]> {
        match self.get(SourceKey::Guide) {
            Some(Observation::Guidelines(hits)) => Some(hits),
            _ => None,
        }
    }

    pub fn imaging(&self) -> Option<&ImagingReport> {
        match self.get(SourceKey::Imaging) {
            Some(Observation::Imaging(report)) => Some(report),
            _ => None,
        }
    }
}
