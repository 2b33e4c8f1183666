//! Annotation and summary records.
//!
//! Every record has the same fixed shape: a set of scalar fields that hold one
//! value or the `"unknown"` sentinel, and a set of collection fields that hold
//! ordered sequences. Missing information is represented by sentinels, never by
//! absent keys, so the aggregator never has to probe for optional fields.

use serde::{Deserialize, Serialize};

/// Sentinel stored in a scalar field that carries no information.
pub const UNKNOWN: &str = "unknown";

const SENTINELS: [&str; 4] = ["unknown", "none", "null", "n/a"];

/// Returns true when a value carries information.
///
/// Empty strings, the sentinel words (case-insensitive) and textual empty
/// collections (`[]`, `{}`) are not meaningful.
pub fn is_meaningful(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "[]" || trimmed == "{}" {
        return false;
    }
    !SENTINELS
        .iter()
        .any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
}

/// Scalar fields of an event description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarField {
    Sport,
    League,
    EventType,
    GameNumber,
    ApproximateDate,
    Score,
    ArenaOrLocation,
    Broadcaster,
    SeriesStatus,
    HomeTeam,
    AwayTeam,
}

impl ScalarField {
    pub const ALL: [ScalarField; 11] = [
        ScalarField::Sport,
        ScalarField::League,
        ScalarField::EventType,
        ScalarField::GameNumber,
        ScalarField::ApproximateDate,
        ScalarField::Score,
        ScalarField::ArenaOrLocation,
        ScalarField::Broadcaster,
        ScalarField::SeriesStatus,
        ScalarField::HomeTeam,
        ScalarField::AwayTeam,
    ];

    /// JSON key used in backend payloads and in serialized records.
    pub fn key(self) -> &'static str {
        match self {
            ScalarField::Sport => "sport",
            ScalarField::League => "league",
            ScalarField::EventType => "event_type",
            ScalarField::GameNumber => "game_number",
            ScalarField::ApproximateDate => "approximate_date",
            ScalarField::Score => "score",
            ScalarField::ArenaOrLocation => "arena_or_location",
            ScalarField::Broadcaster => "broadcaster",
            ScalarField::SeriesStatus => "series_status",
            ScalarField::HomeTeam => "home_team",
            ScalarField::AwayTeam => "away_team",
        }
    }

    /// Alternative keys backends have been seen to use for the same field.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            ScalarField::ApproximateDate => &["approximate_year", "year", "date"],
            ScalarField::ArenaOrLocation => &["location", "arena", "venue"],
            ScalarField::GameNumber => &["game"],
            ScalarField::Broadcaster => &["network", "channel"],
            _ => &[],
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|field| field.key().eq_ignore_ascii_case(key))
    }
}

/// Flat collection fields of an event description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CollectionField {
    Teams,
    Players,
}

impl CollectionField {
    pub const ALL: [CollectionField; 2] = [CollectionField::Teams, CollectionField::Players];

    pub fn key(self) -> &'static str {
        match self {
            CollectionField::Teams => "teams",
            CollectionField::Players => "players",
        }
    }

    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            CollectionField::Teams => &[],
            CollectionField::Players => &["star_players"],
        }
    }
}

/// Key of the structured players-with-numbers collection.
pub const NOTABLE_PLAYERS_KEY: &str = "notable_players_with_numbers";

/// A player identified on screen together with a jersey number and team.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub name: String,
    pub jersey_number: String,
    pub team: String,
}

impl PlayerEntry {
    pub fn new(name: &str, jersey_number: &str, team: &str) -> Self {
        Self {
            name: name.to_string(),
            jersey_number: jersey_number.to_string(),
            team: team.to_string(),
        }
    }

    /// Composite identity used for deduplication.
    pub fn key(&self) -> (String, String, String) {
        (
            self.name.clone(),
            self.jersey_number.clone(),
            self.team.clone(),
        )
    }
}

/// The fields shared by annotation and summary records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescription {
    pub sport: String,
    pub league: String,
    pub event_type: String,
    pub game_number: String,
    pub approximate_date: String,
    pub score: String,
    pub arena_or_location: String,
    pub broadcaster: String,
    pub series_status: String,
    pub home_team: String,
    pub away_team: String,
    pub teams: Vec<String>,
    pub players: Vec<String>,
    pub notable_players_with_numbers: Vec<PlayerEntry>,
}

impl Default for EventDescription {
    fn default() -> Self {
        let unknown = || UNKNOWN.to_string();
        Self {
            sport: unknown(),
            league: unknown(),
            event_type: unknown(),
            game_number: unknown(),
            approximate_date: unknown(),
            score: unknown(),
            arena_or_location: unknown(),
            broadcaster: unknown(),
            series_status: unknown(),
            home_team: unknown(),
            away_team: unknown(),
            teams: Vec::new(),
            players: Vec::new(),
            notable_players_with_numbers: Vec::new(),
        }
    }
}

impl EventDescription {
    pub fn scalar(&self, field: ScalarField) -> &str {
        match field {
            ScalarField::Sport => &self.sport,
            ScalarField::League => &self.league,
            ScalarField::EventType => &self.event_type,
            ScalarField::GameNumber => &self.game_number,
            ScalarField::ApproximateDate => &self.approximate_date,
            ScalarField::Score => &self.score,
            ScalarField::ArenaOrLocation => &self.arena_or_location,
            ScalarField::Broadcaster => &self.broadcaster,
            ScalarField::SeriesStatus => &self.series_status,
            ScalarField::HomeTeam => &self.home_team,
            ScalarField::AwayTeam => &self.away_team,
        }
    }

    pub fn scalar_mut(&mut self, field: ScalarField) -> &mut String {
        match field {
            ScalarField::Sport => &mut self.sport,
            ScalarField::League => &mut self.league,
            ScalarField::EventType => &mut self.event_type,
            ScalarField::GameNumber => &mut self.game_number,
            ScalarField::ApproximateDate => &mut self.approximate_date,
            ScalarField::Score => &mut self.score,
            ScalarField::ArenaOrLocation => &mut self.arena_or_location,
            ScalarField::Broadcaster => &mut self.broadcaster,
            ScalarField::SeriesStatus => &mut self.series_status,
            ScalarField::HomeTeam => &mut self.home_team,
            ScalarField::AwayTeam => &mut self.away_team,
        }
    }

    pub fn collection(&self, field: CollectionField) -> &[String] {
        match field {
            CollectionField::Teams => &self.teams,
            CollectionField::Players => &self.players,
        }
    }

    pub fn collection_mut(&mut self, field: CollectionField) -> &mut Vec<String> {
        match field {
            CollectionField::Teams => &mut self.teams,
            CollectionField::Players => &mut self.players,
        }
    }

    /// True when every scalar is a sentinel and every collection is empty.
    pub fn is_blank(&self) -> bool {
        ScalarField::ALL
            .iter()
            .all(|field| !is_meaningful(self.scalar(*field)))
            && self.teams.is_empty()
            && self.players.is_empty()
            && self.notable_players_with_numbers.is_empty()
    }
}

/// Structured result of analyzing one frame, or one frame of a batch.
///
/// Records are built once by the normalizer and only read afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    #[serde(flatten)]
    pub event: EventDescription,
    /// Free text kept for diagnostics: the backend's reasoning, or the whole
    /// reply when it could not be parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
}

impl AnnotationRecord {
    /// Record produced when a reply could not be parsed at all.
    pub fn fallback(raw_text: &str) -> Self {
        Self {
            event: EventDescription::default(),
            additional_context: Some(raw_text.to_string()),
        }
    }

    pub fn with_scalar(mut self, field: ScalarField, value: &str) -> Self {
        *self.event.scalar_mut(field) = value.to_string();
        self
    }

    pub fn with_collection<I, S>(mut self, field: CollectionField, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.event.collection_mut(field) = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_player(mut self, player: PlayerEntry) -> Self {
        self.event.notable_players_with_numbers.push(player);
        self
    }
}

/// Consensus description across every folded annotation record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    #[serde(flatten)]
    pub event: EventDescription,
    pub frames_analyzed: u64,
}

impl SummaryRecord {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_not_meaningful() {
        for value in ["", "  ", "unknown", "Unknown", "NONE", "null", "N/A", "[]", "{}"] {
            assert!(!is_meaningful(value), "{value:?} should be a sentinel");
        }
        assert!(is_meaningful("Basketball"));
        assert!(is_meaningful("0"));
    }

    #[test]
    fn default_description_is_blank() {
        let description = EventDescription::default();
        assert!(description.is_blank());
        for field in ScalarField::ALL {
            assert_eq!(description.scalar(field), UNKNOWN);
        }
    }

    #[test]
    fn summary_serializes_every_field() {
        let summary = SummaryRecord::default();
        let value = serde_json::to_value(&summary).unwrap();
        let object = value.as_object().unwrap();
        for field in ScalarField::ALL {
            assert_eq!(object[field.key()], "unknown");
        }
        for field in CollectionField::ALL {
            assert_eq!(object[field.key()], serde_json::json!([]));
        }
        assert_eq!(object[NOTABLE_PLAYERS_KEY], serde_json::json!([]));
        assert_eq!(object["frames_analyzed"], 0);
    }

    #[test]
    fn fallback_record_keeps_raw_text() {
        let record = AnnotationRecord::fallback("no idea, sorry");
        assert!(record.event.is_blank());
        assert_eq!(record.additional_context.as_deref(), Some("no idea, sorry"));
    }

    #[test]
    fn scalar_field_lookup_is_case_insensitive() {
        assert_eq!(ScalarField::from_key("Event_Type"), Some(ScalarField::EventType));
        assert_eq!(ScalarField::from_key("teams"), None);
    }
}
