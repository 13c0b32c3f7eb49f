use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod id_index;

pub use id_index::{IdIndex, IdMappings};

/// Identifier as it appears in the source dataset.
pub type RawId = i64;

/// One row of the ratings source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRating {
    #[serde(rename = "userId")]
    pub user_id: RawId,
    #[serde(rename = "movieId")]
    pub movie_id: RawId,
    pub rating: f32,
}

/// One row of the movie catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    #[serde(rename = "movieId")]
    pub movie_id: RawId,
    pub title: String,
    #[serde(default)]
    pub genres: String,
}

/// A rating translated into embedding-table coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSample {
    pub user_index: usize,
    pub movie_index: usize,
    pub rating: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: RawId,
    pub title: String,
    pub score: f32,
}

/// Per-user ranked recommendations keyed by the raw user id rendered as a string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecommendationTable {
    entries: BTreeMap<String, Vec<Recommendation>>,
}

impl RecommendationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, user_id: RawId, recommendations: Vec<Recommendation>) {
        self.entries.insert(user_id.to_string(), recommendations);
    }

    pub fn get(&self, user_id: RawId) -> Option<&[Recommendation]> {
        self.entries.get(&user_id.to_string()).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Recommendation])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl Movie {
    pub fn new(movie_id: RawId, title: impl Into<String>) -> Self {
        Self {
            movie_id,
            title: title.into(),
            genres: String::new(),
        }
    }

    pub fn with_genres(mut self, genres: impl Into<String>) -> Self {
        self.genres = genres.into();
        self
    }
}

impl RawRating {
    pub fn new(user_id: RawId, movie_id: RawId, rating: f32) -> Self {
        Self {
            user_id,
            movie_id,
            rating,
        }
    }
}
