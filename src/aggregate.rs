//! Consensus aggregation.
//!
//! Folds annotation records into one summary:
//! - scalars: one `ScalarPolicy` applied to every scalar field
//! - flat collections: union of meaningful values, sorted
//! - players with numbers: deduplicated on (name, jersey_number, team), first
//!   occurrence kept
//! - `frames_analyzed`: one per folded record, fallback records included
//!
//! The result depends only on the order of folded records, never on hash
//! iteration order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::record::{
    is_meaningful, AnnotationRecord, CollectionField, EventDescription, PlayerEntry, ScalarField,
    SummaryRecord,
};

/// How a scalar field picks its value across records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarPolicy {
    /// Most frequent meaningful value; ties go to the value seen first.
    #[default]
    Majority,
    /// First meaningful value seen; later values are ignored.
    FirstMeaningful,
}

impl ScalarPolicy {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "majority" => Some(ScalarPolicy::Majority),
            "first_meaningful" | "first" => Some(ScalarPolicy::FirstMeaningful),
            _ => None,
        }
    }
}

/// Meaningful values seen for one scalar, in first-seen order.
#[derive(Clone, Debug, Default)]
struct ScalarTally {
    counts: Vec<(String, u64)>,
}

impl ScalarTally {
    fn observe(&mut self, value: &str) {
        match self.counts.iter_mut().find(|(seen, _)| seen == value) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((value.to_string(), 1)),
        }
    }

    fn pick(&self, policy: ScalarPolicy) -> Option<&str> {
        let picked = match policy {
            ScalarPolicy::FirstMeaningful => self.counts.first(),
            ScalarPolicy::Majority => self
                .counts
                .iter()
                .fold(None, |best: Option<&(String, u64)>, candidate| match best {
                    Some(best) if best.1 >= candidate.1 => Some(best),
                    _ => Some(candidate),
                }),
        };
        picked.map(|(value, _)| value.as_str())
    }
}

/// Running consensus over a sequence of annotation records.
#[derive(Clone, Debug)]
pub struct ConsensusAggregator {
    policy: ScalarPolicy,
    tallies: BTreeMap<ScalarField, ScalarTally>,
    teams: BTreeSet<String>,
    players: BTreeSet<String>,
    notable_players: Vec<PlayerEntry>,
    notable_keys: HashSet<(String, String, String)>,
    frames_analyzed: u64,
}

impl ConsensusAggregator {
    pub fn new(policy: ScalarPolicy) -> Self {
        Self {
            policy,
            tallies: BTreeMap::new(),
            teams: BTreeSet::new(),
            players: BTreeSet::new(),
            notable_players: Vec::new(),
            notable_keys: HashSet::new(),
            frames_analyzed: 0,
        }
    }

    pub fn policy(&self) -> ScalarPolicy {
        self.policy
    }

    /// Fold one record into the running consensus.
    pub fn fold(&mut self, record: &AnnotationRecord) {
        self.frames_analyzed += 1;
        let event = &record.event;

        for field in ScalarField::ALL {
            let value = event.scalar(field).trim();
            if is_meaningful(value) {
                self.tallies.entry(field).or_default().observe(value);
            }
        }
        for field in CollectionField::ALL {
            let target = match field {
                CollectionField::Teams => &mut self.teams,
                CollectionField::Players => &mut self.players,
            };
            for value in event.collection(field) {
                let value = value.trim();
                if is_meaningful(value) {
                    target.insert(value.to_string());
                }
            }
        }
        for player in &event.notable_players_with_numbers {
            if !is_meaningful(&player.name) {
                continue;
            }
            if self.notable_keys.insert(player.key()) {
                self.notable_players.push(player.clone());
            }
        }
    }

    pub fn frames_analyzed(&self) -> u64 {
        self.frames_analyzed
    }

    /// Number of distinct teams seen so far.
    pub fn distinct_teams(&self) -> usize {
        self.teams.len()
    }

    /// Current pick for one scalar field, if any meaningful value was seen.
    pub fn scalar(&self, field: ScalarField) -> Option<&str> {
        self.tallies.get(&field).and_then(|tally| tally.pick(self.policy))
    }

    /// Snapshot of the consensus so far.
    pub fn summary(&self) -> SummaryRecord {
        let mut event = EventDescription::default();
        for field in ScalarField::ALL {
            if let Some(value) = self.scalar(field) {
                *event.scalar_mut(field) = value.to_string();
            }
        }
        event.teams = self.teams.iter().cloned().collect();
        event.players = self.players.iter().cloned().collect();
        event.notable_players_with_numbers = self.notable_players.clone();
        SummaryRecord {
            event,
            frames_analyzed: self.frames_analyzed,
        }
    }
}

impl Default for ConsensusAggregator {
    fn default() -> Self {
        Self::new(ScalarPolicy::default())
    }
}

/// Reduce a whole sequence of records in one call.
pub fn finalize<'a, I>(records: I, policy: ScalarPolicy) -> SummaryRecord
where
    I: IntoIterator<Item = &'a AnnotationRecord>,
{
    let mut aggregator = ConsensusAggregator::new(policy);
    for record in records {
        aggregator.fold(record);
    }
    aggregator.summary()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::UNKNOWN;

    fn sport_teams(sport: &str, teams: &[&str]) -> AnnotationRecord {
        AnnotationRecord::default()
            .with_scalar(ScalarField::Sport, sport)
            .with_collection(CollectionField::Teams, teams.iter().copied())
    }

    #[test]
    fn basketball_scenario() {
        let records = [
            sport_teams("Basketball", &["Lakers"]),
            sport_teams("unknown", &["Heat"]),
            sport_teams("Basketball", &["Lakers", "Heat"]),
        ];
        for policy in [ScalarPolicy::Majority, ScalarPolicy::FirstMeaningful] {
            let summary = finalize(&records, policy);
            assert_eq!(summary.event.sport, "Basketball");
            assert_eq!(summary.event.teams, vec!["Heat", "Lakers"]);
            assert_eq!(summary.frames_analyzed, 3);
        }
    }

    #[test]
    fn majority_picks_most_frequent_value() {
        let records = [
            AnnotationRecord::default().with_scalar(ScalarField::League, "NCAA"),
            AnnotationRecord::default().with_scalar(ScalarField::League, "NBA"),
            AnnotationRecord::default().with_scalar(ScalarField::League, "NBA"),
        ];
        assert_eq!(finalize(&records, ScalarPolicy::Majority).event.league, "NBA");
        assert_eq!(finalize(&records, ScalarPolicy::FirstMeaningful).event.league, "NCAA");
    }

    #[test]
    fn majority_ties_go_to_first_seen() {
        let records = [
            AnnotationRecord::default().with_scalar(ScalarField::Score, "98-97"),
            AnnotationRecord::default().with_scalar(ScalarField::Score, "100-97"),
            AnnotationRecord::default().with_scalar(ScalarField::Score, "100-97"),
            AnnotationRecord::default().with_scalar(ScalarField::Score, "98-97"),
        ];
        assert_eq!(finalize(&records, ScalarPolicy::Majority).event.score, "98-97");
    }

    #[test]
    fn first_meaningful_value_is_never_overwritten() {
        let mut aggregator = ConsensusAggregator::new(ScalarPolicy::FirstMeaningful);
        aggregator.fold(&AnnotationRecord::default());
        assert_eq!(aggregator.summary().event.sport, UNKNOWN);
        aggregator.fold(&AnnotationRecord::default().with_scalar(ScalarField::Sport, "Hockey"));
        for _ in 0..3 {
            aggregator.fold(&AnnotationRecord::default().with_scalar(ScalarField::Sport, "Soccer"));
        }
        assert_eq!(aggregator.summary().event.sport, "Hockey");
    }

    #[test]
    fn folding_the_same_record_twice_does_not_duplicate_entries() {
        let record = sport_teams("Basketball", &["Lakers", "Heat"])
            .with_collection(CollectionField::Players, ["LeBron James"])
            .with_player(PlayerEntry::new("LeBron James", "6", "Lakers"));
        let mut aggregator = ConsensusAggregator::default();
        aggregator.fold(&record);
        let once = aggregator.summary();
        aggregator.fold(&record);
        let twice = aggregator.summary();
        assert_eq!(once.event, twice.event);
        assert_eq!(twice.frames_analyzed, 2);
    }

    #[test]
    fn sentinels_never_enter_collections() {
        let record = AnnotationRecord::default()
            .with_collection(CollectionField::Teams, ["unknown", "", " ", "[]", "{}", "Bulls"])
            .with_collection(CollectionField::Players, ["N/A", "null"])
            .with_player(PlayerEntry::new("none", "23", "Bulls"));
        let summary = finalize([&record], ScalarPolicy::Majority);
        assert_eq!(summary.event.teams, vec!["Bulls"]);
        assert!(summary.event.players.is_empty());
        assert!(summary.event.notable_players_with_numbers.is_empty());
    }

    #[test]
    fn structured_players_dedup_on_full_key() {
        let records = [
            AnnotationRecord::default()
                .with_player(PlayerEntry::new("Jordan", "23", "Bulls"))
                .with_player(PlayerEntry::new("Jordan", "45", "Bulls")),
            AnnotationRecord::default()
                .with_player(PlayerEntry::new("Pippen", "33", "Bulls"))
                .with_player(PlayerEntry::new("Jordan", "23", "Bulls")),
        ];
        let summary = finalize(&records, ScalarPolicy::Majority);
        assert_eq!(
            summary.event.notable_players_with_numbers,
            vec![
                PlayerEntry::new("Jordan", "23", "Bulls"),
                PlayerEntry::new("Jordan", "45", "Bulls"),
                PlayerEntry::new("Pippen", "33", "Bulls"),
            ]
        );
    }

    #[test]
    fn collections_do_not_depend_on_record_order() {
        let records = vec![
            sport_teams("Soccer", &["Arsenal"]).with_collection(CollectionField::Players, ["Saka"]),
            sport_teams("Soccer", &["Chelsea", "Arsenal"]),
            sport_teams("unknown", &[]).with_collection(CollectionField::Players, ["Palmer", "Saka"]),
        ];
        let forward = finalize(&records, ScalarPolicy::Majority);
        let backward = finalize(records.iter().rev(), ScalarPolicy::Majority);
        assert_eq!(forward.event.teams, backward.event.teams);
        assert_eq!(forward.event.players, backward.event.players);
        assert_eq!(forward.event.sport, backward.event.sport);
    }

    #[test]
    fn incremental_fold_matches_finalize() {
        let records = [
            sport_teams("Basketball", &["Lakers"]),
            AnnotationRecord::fallback("garbled"),
            sport_teams("Basketball", &["Heat"]).with_scalar(ScalarField::League, "NBA"),
        ];
        let mut aggregator = ConsensusAggregator::default();
        for record in &records {
            aggregator.fold(record);
        }
        assert_eq!(aggregator.summary(), finalize(&records, ScalarPolicy::Majority));
        assert_eq!(aggregator.frames_analyzed(), 3);
        assert_eq!(aggregator.distinct_teams(), 2);
    }

    #[test]
    fn empty_input_yields_blank_summary() {
        let summary = finalize(std::iter::empty(), ScalarPolicy::Majority);
        assert!(summary.event.is_blank());
        assert_eq!(summary.frames_analyzed, 0);
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!(ScalarPolicy::parse("Majority"), Some(ScalarPolicy::Majority));
        assert_eq!(ScalarPolicy::parse("first_meaningful"), Some(ScalarPolicy::FirstMeaningful));
        assert_eq!(ScalarPolicy::parse("random"), None);
    }
}
