use serde::{Deserialize, Serialize};

/// Stable identifier of a participant (the chat user id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub i64);

impl ParticipantId {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ParticipantId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Who the participant is; only equal roles are ever paired
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Worker,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Student, Role::Worker];

    /// Parse a role tag; case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "student" => Some(Self::Student),
            "worker" => Some(Self::Worker),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Student => write!(f, "student"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

/// How a participant is willing to meet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MeetingFormat {
    Online,
    Offline,
    /// Either online or offline
    #[default]
    Any,
}

impl MeetingFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "online" => Some(Self::Online),
            "offline" => Some(Self::Offline),
            "any" => Some(Self::Any),
            _ => None,
        }
    }

    /// Whether preferred places matter for this format
    #[must_use]
    pub fn uses_places(self) -> bool {
        !matches!(self, Self::Online)
    }
}

impl std::fmt::Display for MeetingFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Any => write!(f, "any"),
        }
    }
}

/// Interest tags a participant can pick in their profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Interest {
    Sport,
    Music,
    Art,
    Science,
    Technology,
    Travel,
    Books,
    Movies,
    Games,
    Food,
    Languages,
    Business,
    Volunteering,
    Photography,
    SelfDevelopment,
}

impl Interest {
    pub const ALL: [Interest; 15] = [
        Interest::Sport,
        Interest::Music,
        Interest::Art,
        Interest::Science,
        Interest::Technology,
        Interest::Travel,
        Interest::Books,
        Interest::Movies,
        Interest::Games,
        Interest::Food,
        Interest::Languages,
        Interest::Business,
        Interest::Volunteering,
        Interest::Photography,
        Interest::SelfDevelopment,
    ];

    /// Parse an interest tag (e.g. from a pool record)
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|interest| interest.as_str() == normalized)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sport => "sport",
            Self::Music => "music",
            Self::Art => "art",
            Self::Science => "science",
            Self::Technology => "technology",
            Self::Travel => "travel",
            Self::Books => "books",
            Self::Movies => "movies",
            Self::Games => "games",
            Self::Food => "food",
            Self::Languages => "languages",
            Self::Business => "business",
            Self::Volunteering => "volunteering",
            Self::Photography => "photography",
            Self::SelfDevelopment => "self-development",
        }
    }
}

impl std::fmt::Display for Interest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Places where an offline meeting can happen
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Place {
    Campus,
    Office,
    Cafe,
    Park,
    Coworking,
    Downtown,
}

impl Place {
    pub const ALL: [Place; 6] = [
        Place::Campus,
        Place::Office,
        Place::Cafe,
        Place::Park,
        Place::Coworking,
        Place::Downtown,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|place| place.as_str() == normalized)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Campus => "campus",
            Self::Office => "office",
            Self::Cafe => "cafe",
            Self::Park => "park",
            Self::Coworking => "coworking",
            Self::Downtown => "downtown",
        }
    }
}

impl std::fmt::Display for Place {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
