use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;
use std::fmt::{self};
use std::str::FromStr;

use crate::error::SyncError;

/// A pending result of a fetch or a mutation. The work it stands for is already running; awaiting is only needed to
/// observe the outcome.
pub type Pending<T> = BoxFuture<'static, Result<T, SyncError>>;

/// Which aspect of an item a cache entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    AnimeStatus,
    Favourite,
    Score,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnimeStatus => "anime_status",
            Self::Favourite => "favourite",
            Self::Score => "score",
        }
    }

    // Status and score come from the same endpoint, hence share a single in-flight request.
    pub(crate) fn fetch_kind(self) -> EntityKind {
        match self {
            Self::Score => Self::AnimeStatus,
            kind => kind,
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchStatus {
    Watching,
    Planned,
    Completed,
    #[serde(alias = "on-hold")]
    OnHold,
    Dropped,
    #[default]
    None,
}

impl WatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Watching => "watching",
            Self::Planned => "planned",
            Self::Completed => "completed",
            Self::OnHold => "on_hold",
            Self::Dropped => "dropped",
            Self::None => "none",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl Display for WatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WatchStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "watching" => Self::Watching,
            "planned" => Self::Planned,
            "completed" => Self::Completed,
            "on_hold" | "on-hold" => Self::OnHold,
            "dropped" => Self::Dropped,
            "none" | "" => Self::None,
            other => return Err(SyncError::InvalidInput(format!("unknown watch status '{other}'"))),
        })
    }
}

/// User score on the doubled scale: `0` is "not rated", `1..=10` stand for `0.5..=5.0` stars. Odd values are half
/// stars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub const MAX: u8 = 10;

    pub fn new(raw: u8) -> Result<Self, SyncError> {
        if raw > Self::MAX {
            return Err(SyncError::InvalidScore(format!("{raw} is above {}", Self::MAX)));
        }
        Ok(Self(raw))
    }

    pub fn unrated() -> Self {
        Self(0)
    }

    /// Convert a star rating as tapped in the UI. Only whole and half stars between 0 and 5 are accepted.
    pub fn from_stars(stars: f32) -> Result<Self, SyncError> {
        let doubled = stars * 2.0;
        if !doubled.is_finite() || doubled < 0.0 || doubled > f32::from(Self::MAX) || doubled.fract() != 0.0 {
            return Err(SyncError::InvalidScore(format!("{stars} is not a half-star step in 0..=5")));
        }
        Ok(Self(doubled as u8))
    }

    pub fn raw(self) -> u8 {
        self.0
    }

    pub fn stars(self) -> f32 {
        f32::from(self.0) / 2.0
    }

    pub fn is_rated(self) -> bool {
        self.0 > 0
    }

    pub fn is_half_star(self) -> bool {
        self.0 % 2 == 1
    }
}

impl TryFrom<u8> for Score {
    type Error = SyncError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A cached value. The variant determines the [`EntityKind`] of the entry it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Status(WatchStatus),
    Favourite(bool),
    Score(Score),
}

impl Value {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Status(_) => EntityKind::AnimeStatus,
            Self::Favourite(_) => EntityKind::Favourite,
            Self::Score(_) => EntityKind::Score,
        }
    }

    pub fn as_status(&self) -> Option<WatchStatus> {
        match self {
            Self::Status(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_favourite(&self) -> Option<bool> {
        match self {
            Self::Favourite(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_score(&self) -> Option<Score> {
        match self {
            Self::Score(s) => Some(*s),
            _ => None,
        }
    }

    /// What a `404` from the backend means for the given kind.
    pub fn empty_for(kind: EntityKind) -> Self {
        match kind {
            EntityKind::AnimeStatus => Self::Status(WatchStatus::None),
            EntityKind::Favourite => Self::Favourite(false),
            EntityKind::Score => Self::Score(Score::unrated()),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(s) => write!(f, "status={s}"),
            Self::Favourite(v) => write!(f, "favourite={v}"),
            Self::Score(s) => write!(f, "score={s}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    #[default]
    Anime,
    Manga,
    Novel,
    Character,
    Person,
    Collection,
    Article,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anime => "anime",
            Self::Manga => "manga",
            Self::Novel => "novel",
            Self::Character => "character",
            Self::Person => "person",
            Self::Collection => "collection",
            Self::Article => "article",
        }
    }
}

impl Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "anime" => Self::Anime,
            "manga" => Self::Manga,
            "novel" => Self::Novel,
            "character" => Self::Character,
            "person" | "staff" => Self::Person,
            "collection" => Self::Collection,
            "article" => Self::Article,
            other => return Err(SyncError::InvalidInput(format!("unknown content kind '{other}'"))),
        })
    }
}

/// Addresses a catalog item. A bare slug is an anime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    content: ContentKind,
    slug:    String,
}

impl ItemKey {
    pub fn new<S: Into<String>>(content: ContentKind, slug: S) -> Self {
        Self {
            content,
            slug: slug.into(),
        }
    }

    pub fn anime<S: Into<String>>(slug: S) -> Self {
        Self::new(ContentKind::Anime, slug)
    }

    pub fn content(&self) -> ContentKind {
        self.content
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }
}

impl Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.content, self.slug)
    }
}

impl FromStr for ItemKey {
    type Err = SyncError;

    /// Accepts `content/slug` or a bare anime slug.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (content, slug) = match s.split_once('/') {
            Some((content, slug)) => (content.parse()?, slug),
            None => (ContentKind::Anime, s),
        };
        if slug.is_empty() {
            return Err(SyncError::InvalidInput(format!("empty slug in '{s}'")));
        }
        Ok(Self::new(content, slug))
    }
}

impl From<&str> for ItemKey {
    fn from(slug: &str) -> Self {
        Self::anime(slug)
    }
}

impl From<String> for ItemKey {
    fn from(slug: String) -> Self {
        Self::anime(slug)
    }
}

impl From<&ItemKey> for ItemKey {
    fn from(key: &ItemKey) -> Self {
        key.clone()
    }
}

/// The address of a single cache entry: an item and the aspect of it being cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: EntityKind,
    item: ItemKey,
}

impl CacheKey {
    pub fn new(kind: EntityKind, item: impl Into<ItemKey>) -> Self {
        Self {
            kind,
            item: item.into(),
        }
    }

    pub fn status(item: impl Into<ItemKey>) -> Self {
        Self::new(EntityKind::AnimeStatus, item)
    }

    pub fn score(item: impl Into<ItemKey>) -> Self {
        Self::new(EntityKind::Score, item)
    }

    pub fn favourite(item: impl Into<ItemKey>) -> Self {
        Self::new(EntityKind::Favourite, item)
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn item(&self) -> &ItemKey {
        &self.item
    }

    pub(crate) fn fetch_key(&self) -> CacheKey {
        Self::new(self.kind.fetch_kind(), self.item.clone())
    }

    /// The other half of the same watch record: status for score and vice versa.
    pub(crate) fn record_sibling(&self) -> Option<CacheKey> {
        match self.kind {
            EntityKind::AnimeStatus => Some(Self::score(self.item.clone())),
            EntityKind::Score => Some(Self::status(self.item.clone())),
            EntityKind::Favourite => None,
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.item)
    }
}

/// The complete watch record as the backend stores it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WatchRecord {
    pub status:    WatchStatus,
    pub score:     Score,
    pub episodes:  u32,
    pub rewatches: u32,
    pub note:      Option<String>,
}
