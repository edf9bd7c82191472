use std::collections::HashMap;
use tracing::{debug, info, instrument};

use crate::config::{Config, PreacherFragment};
use crate::constants::{EVALUATE_PREACHER, UNKNOWN_PREACHER};
use crate::domain::PreScrapingRecord;
use crate::metrics as metric_names;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceOutcome {
    pub records: Vec<PreScrapingRecord>,
    /// Records that were marked for evaluation
    pub evaluated: usize,
    /// Of those, how many ended up with a known preacher
    pub resolved: usize,
}

/// Resolves "evaluate" preachers from name fragments in the title.
///
/// Fragments are tried in configured order and the first one contained in the
/// lower-cased title wins; there is no longest-match preference.
pub struct PreacherInference {
    fragments: Vec<(String, String)>,
}

impl PreacherInference {
    pub fn new(fragments: &[PreacherFragment]) -> Self {
        Self {
            fragments: fragments
                .iter()
                .map(|f| (f.fragment.to_lowercase(), f.preacher.clone()))
                .collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.preacher_fragments)
    }

    /// Canonical preacher for a title, if any fragment matches
    pub fn resolve(&self, title: &str) -> Option<&str> {
        let title = title.to_lowercase();
        self.fragments
            .iter()
            .find(|(fragment, _)| title.contains(fragment.as_str()))
            .map(|(_, preacher)| preacher.as_str())
    }

    /// A resolved preacher also rewrites the title to `"<preacher> <section>"`,
    /// since such titles were usually just the speaker's name.
    pub fn infer(&self, record: &PreScrapingRecord) -> PreScrapingRecord {
        let mut patched = record.clone();
        match self.resolve(&record.title) {
            Some(preacher) => {
                patched.preacher = preacher.to_string();
                patched.title = format!("{} {}", preacher, record.section);
            }
            None => {
                patched.preacher = UNKNOWN_PREACHER.to_string();
            }
        }
        patched
    }

    /// Patch every "evaluate" record and merge the patches back by id.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub fn apply(&self, records: Vec<PreScrapingRecord>) -> InferenceOutcome {
        let patches: HashMap<u64, PreScrapingRecord> = records
            .iter()
            .filter(|r| r.preacher == EVALUATE_PREACHER)
            .map(|r| (r.id, self.infer(r)))
            .collect();

        let evaluated = patches.len();
        let resolved = patches
            .values()
            .filter(|r| r.preacher != UNKNOWN_PREACHER)
            .count();

        let records = records
            .into_iter()
            .map(|r| match patches.get(&r.id) {
                Some(patch) => {
                    debug!(id = r.id, preacher = %patch.preacher, "Inferred preacher");
                    patch.clone()
                }
                None => r,
            })
            .collect();

        metrics::counter!(metric_names::PREACHERS_INFERRED).increment(resolved as u64);
        info!(
            "Evaluated {} record(s) for preacher inference, resolved {}",
            evaluated, resolved
        );

        InferenceOutcome {
            records,
            evaluated,
            resolved,
        }
    }
}
