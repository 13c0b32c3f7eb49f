use crate::algorithms::ranker::positive_top_k;
use crate::algorithms::AffinityScorer;
use crate::config::RecommendationConfig;
use crate::error::RecResult;
use crate::models::*;
use crate::utils::ensure_parent_dir;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const RECOMMENDATIONS_FILE: &str = "recommendations.json";
pub const UNKNOWN_TITLE: &str = "Unknown";
pub const MAX_TOP_K: usize = 20;
pub const MAX_USERS: usize = 1000;

/// Title lookup over the movie catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    titles: HashMap<RawId, String>,
}

impl Catalog {
    pub fn new(movies: &[Movie]) -> Self {
        let mut titles = HashMap::with_capacity(movies.len());
        for movie in movies {
            // first row wins on duplicate ids
            titles
                .entry(movie.movie_id)
                .or_insert_with(|| movie.title.clone());
        }
        Self { titles }
    }

    pub fn title(&self, movie_id: RawId) -> &str {
        self.titles
            .get(&movie_id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_TITLE)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

/// Pre-computes ranked recommendations for a bounded set of users.
#[derive(Debug, Clone)]
pub struct BatchRecommender {
    top_k: usize,
    user_limit: usize,
}

impl BatchRecommender {
    pub fn new(top_k: usize, user_limit: usize) -> Self {
        Self {
            top_k: top_k.min(MAX_TOP_K),
            user_limit: user_limit.min(MAX_USERS),
        }
    }

    pub fn from_config(config: &RecommendationConfig) -> Self {
        Self::new(config.top_k, config.user_limit)
    }

    /// Effective K for a catalog of `movie_count` known movies.
    pub fn k_for(&self, movie_count: usize) -> usize {
        self.top_k.min(movie_count)
    }

    /// Scores every known movie for one user and returns the filtered top-K.
    pub fn recommend_for_user<S: AffinityScorer + ?Sized>(
        &self,
        scorer: &S,
        user_index: usize,
        mappings: &IdMappings,
        catalog: &Catalog,
    ) -> RecResult<Vec<Recommendation>> {
        let movie_count = mappings.movies.len();
        let movies: Vec<usize> = (0..movie_count).collect();
        let users = vec![user_index; movie_count];
        let scores = scorer.score_batch(&users, &movies)?;

        positive_top_k(&scores, self.k_for(movie_count))
            .into_iter()
            .map(|(movie_index, score)| {
                let id = mappings.movies.raw_id(movie_index)?;
                Ok(Recommendation {
                    id,
                    title: catalog.title(id).to_string(),
                    score,
                })
            })
            .collect()
    }

    /// Builds the table for users `0 .. min(user_limit, known users)`.
    pub fn generate<S: AffinityScorer + ?Sized>(
        &self,
        scorer: &S,
        mappings: &IdMappings,
        movies: &[Movie],
    ) -> RecResult<RecommendationTable> {
        let catalog = Catalog::new(movies);
        let user_count = self.user_limit.min(mappings.users.len());
        let mut table = RecommendationTable::new();

        for user_index in 0..user_count {
            let recommendations = self.recommend_for_user(scorer, user_index, mappings, &catalog)?;
            let raw_user = mappings.users.raw_id(user_index)?;
            debug!("User {}: {} recommendations", raw_user, recommendations.len());
            table.insert(raw_user, recommendations);
        }

        info!(
            "Generated recommendations for {} users (k = {})",
            table.len(),
            self.k_for(mappings.movies.len())
        );
        Ok(table)
    }

    /// Writes `recommendations.json` under `output_dir`, creating the directory.
    pub fn write(&self, table: &RecommendationTable, output_dir: &Path) -> RecResult<PathBuf> {
        let path = output_dir.join(RECOMMENDATIONS_FILE);
        ensure_parent_dir(&path)?;
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, table)?;
        writer.flush()?;
        info!("Wrote recommendations to {}", path.display());
        Ok(path)
    }
}

pub fn read_table(path: &Path) -> RecResult<RecommendationTable> {
    let json = std::fs::read_to_string(path)?;
    Ok(RecommendationTable::from_json(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecommenderError;

    /// Scores from a fixed per-movie table, identical for every user.
    struct FixedScorer {
        users: usize,
        scores: Vec<f32>,
    }

    impl AffinityScorer for FixedScorer {
        fn num_users(&self) -> usize {
            self.users
        }

        fn num_movies(&self) -> usize {
            self.scores.len()
        }

        fn score_batch(&self, users: &[usize], movies: &[usize]) -> RecResult<Vec<f32>> {
            assert_eq!(users.len(), movies.len());
            Ok(movies.iter().map(|&m| self.scores[m]).collect())
        }
    }

    fn mappings(users: Vec<RawId>, movies: Vec<RawId>) -> IdMappings {
        IdMappings {
            users: IdIndex::build(users),
            movies: IdIndex::build(movies),
        }
    }

    fn catalog() -> Vec<Movie> {
        vec![
            Movie::new(11, "Heat (1995)"),
            Movie::new(22, "Casino (1995)"),
            Movie::new(33, "Sabrina (1995)"),
            Movie::new(44, "GoldenEye (1995)"),
        ]
    }

    #[test]
    fn test_non_positive_scores_are_excluded() {
        let scorer = FixedScorer {
            users: 1,
            scores: vec![0.9, -0.1, 0.4, 0.0, 0.7],
        };
        let mappings = mappings(vec![501], vec![11, 22, 33, 44, 55]);
        let table = BatchRecommender::new(20, 1000)
            .generate(&scorer, &mappings, &catalog())
            .unwrap();

        let recs = table.get(501).unwrap();
        let scores: Vec<f32> = recs.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.4]);
        let ids: Vec<RawId> = recs.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![11, 55, 33]);
        assert_eq!(recs[0].title, "Heat (1995)");
        assert_eq!(recs[1].title, UNKNOWN_TITLE);
    }

    #[test]
    fn test_k_is_bounded_by_catalog_and_cap() {
        let recommender = BatchRecommender::new(50, 5000);
        assert_eq!(recommender.k_for(7), 7);
        assert_eq!(recommender.k_for(300), MAX_TOP_K);

        let scorer = FixedScorer {
            users: 1,
            scores: (1..=30).map(|i| i as f32 / 100.0).collect(),
        };
        let mappings = mappings(vec![1], (100..130).collect());
        let table = recommender.generate(&scorer, &mappings, &[]).unwrap();
        let recs = table.get(1).unwrap();
        assert_eq!(recs.len(), 20);
        assert_eq!(recs[0].id, 129);
        assert!(recs.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_user_range_caps_at_known_users() {
        let scorer = FixedScorer {
            users: 3,
            scores: vec![0.5, 0.6],
        };
        let mappings = mappings(vec![7, 3, 9], vec![11, 22]);
        let table = BatchRecommender::new(20, 1000)
            .generate(&scorer, &mappings, &catalog())
            .unwrap();
        assert_eq!(table.len(), 3);
        for user in [7, 3, 9] {
            assert_eq!(table.get(user).unwrap().len(), 2);
        }

        let limited = BatchRecommender::new(20, 2)
            .generate(&scorer, &mappings, &catalog())
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert!(limited.get(9).is_none());
    }

    #[test]
    fn test_scorer_errors_propagate() {
        struct Failing;
        impl AffinityScorer for Failing {
            fn num_users(&self) -> usize {
                1
            }
            fn num_movies(&self) -> usize {
                1
            }
            fn score_batch(&self, _: &[usize], _: &[usize]) -> RecResult<Vec<f32>> {
                Err(RecommenderError::IndexOutOfRange {
                    table: "movie_embeddings",
                    index: 1,
                    size: 1,
                })
            }
        }
        let result = BatchRecommender::new(20, 10).generate(&Failing, &mappings(vec![1], vec![2]), &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_write_creates_directory_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frontend").join("public").join("data");

        let scorer = FixedScorer {
            users: 2,
            scores: vec![0.25, 0.75, 0.5],
        };
        let mappings = mappings(vec![4, 8], vec![11, 22, 33]);
        let recommender = BatchRecommender::new(20, 1000);
        let table = recommender.generate(&scorer, &mappings, &catalog()).unwrap();

        let path = recommender.write(&table, &out).unwrap();
        assert_eq!(path, out.join(RECOMMENDATIONS_FILE));
        assert_eq!(read_table(&path).unwrap(), table);
    }
}
