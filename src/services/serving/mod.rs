use crate::algorithms::{AffinityScorer, MovieRecommender};
use crate::config::Config;
use crate::error::{RecResult, RecommenderError};
use crate::models::*;
use crate::services::dataset::load_movies;
use crate::services::recommendation::{BatchRecommender, Catalog};
use crate::services::storage::{load_mappings, load_model};
use anyhow::{Context, Result};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Read-only inference over a trained checkpoint.
///
/// The model is loaded once and shared across requests; nothing here mutates it.
pub struct ServingService {
    model: Arc<MovieRecommender>,
    mappings: Arc<IdMappings>,
    catalog: Arc<Catalog>,
    recommender: BatchRecommender,
    serving_stats: Arc<DashMap<String, u64>>,
}

impl ServingService {
    /// Loads the ID index, the checkpoint and the movie catalog named by `config`.
    ///
    /// A missing catalog is tolerated; titles then fall back to "Unknown".
    pub fn load(config: &Config) -> Result<Self> {
        let mappings = load_mappings(&config.output.id_index_path).with_context(|| {
            format!(
                "failed to load id index from {}",
                config.output.id_index_path.display()
            )
        })?;

        let model = load_model(
            &config.output.checkpoint_path,
            mappings.users.len(),
            mappings.movies.len(),
            config.model.embedding_dim,
        )
        .with_context(|| {
            format!(
                "failed to load checkpoint from {}",
                config.output.checkpoint_path.display()
            )
        })?;

        let movies_path = config.data.movies_path();
        let movies = match load_movies(&movies_path) {
            Ok(movies) => movies,
            Err(e) => {
                warn!("Movie catalog unavailable ({}), titles will be unknown", e);
                Vec::new()
            }
        };

        Ok(Self::from_parts(
            model,
            mappings,
            &movies,
            BatchRecommender::from_config(&config.recommendation),
        ))
    }

    pub fn from_parts(
        mut model: MovieRecommender,
        mappings: IdMappings,
        movies: &[Movie],
        recommender: BatchRecommender,
    ) -> Self {
        model.eval();
        info!(
            "Serving model with {} users, {} movies, {} titles",
            mappings.users.len(),
            mappings.movies.len(),
            movies.len()
        );
        Self {
            model: Arc::new(model),
            mappings: Arc::new(mappings),
            catalog: Arc::new(Catalog::new(movies)),
            recommender,
            serving_stats: Arc::new(DashMap::new()),
        }
    }

    fn user_index(&self, user_id: RawId) -> RecResult<usize> {
        self.mappings
            .users
            .index_of(user_id)
            .ok_or(RecommenderError::UnknownUser(user_id))
    }

    fn movie_index(&self, movie_id: RawId) -> RecResult<usize> {
        self.mappings
            .movies
            .index_of(movie_id)
            .ok_or(RecommenderError::UnknownMovie(movie_id))
    }

    /// Affinity of one user for one movie, in (0, 1).
    pub async fn score(&self, user_id: RawId, movie_id: RawId) -> RecResult<f32> {
        self.increment_stat("score_requests");
        let start_time = Instant::now();

        let result = self
            .user_index(user_id)
            .and_then(|u| Ok((u, self.movie_index(movie_id)?)))
            .and_then(|(u, m)| self.model.score(u, m));

        self.finish_request(start_time, result.is_ok());
        result
    }

    /// Ranked recommendations for a known user, same rules as the batch table.
    ///
    /// Scoring covers the whole catalog, so it runs on the blocking pool.
    pub async fn top_k(&self, user_id: RawId) -> RecResult<Vec<Recommendation>> {
        self.increment_stat("recommend_requests");
        let start_time = Instant::now();

        let result = match self.user_index(user_id) {
            Ok(user_index) => self.rank_blocking(user_index).await,
            Err(e) => Err(e),
        };

        if let Ok(recs) = &result {
            debug!("Served {} recommendations for user {}", recs.len(), user_id);
        }
        self.finish_request(start_time, result.is_ok());
        result
    }

    async fn rank_blocking(&self, user_index: usize) -> RecResult<Vec<Recommendation>> {
        let model = Arc::clone(&self.model);
        let mappings = Arc::clone(&self.mappings);
        let catalog = Arc::clone(&self.catalog);
        let recommender = self.recommender.clone();

        tokio::task::spawn_blocking(move || {
            recommender.recommend_for_user(model.as_ref(), user_index, &mappings, &catalog)
        })
        .await
        .unwrap_or_else(|e| Err(RecommenderError::TaskFailed(e.to_string())))
    }

    pub fn health_check(&self) -> HashMap<String, serde_json::Value> {
        let mut health = HashMap::new();
        health.insert("model_loaded".to_string(), serde_json::Value::Bool(true));
        health.insert("num_users".to_string(), self.model.num_users().into());
        health.insert("num_movies".to_string(), self.model.num_movies().into());
        health.insert("catalog_titles".to_string(), self.catalog.len().into());
        health
    }

    pub fn get_serving_stats(&self) -> HashMap<String, u64> {
        self.serving_stats
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    fn increment_stat(&self, key: &str) {
        let mut counter = self.serving_stats.entry(key.to_string()).or_insert(0);
        *counter += 1;
    }

    fn finish_request(&self, start_time: Instant, ok: bool) {
        self.increment_stat("total_requests");
        self.increment_stat(if ok { "successful_requests" } else { "failed_requests" });
        self.update_latency_stat(start_time.elapsed().as_micros() as u64);
    }

    fn update_latency_stat(&self, latency_us: u64) {
        let current_avg = self.serving_stats.get("avg_latency_us").map(|v| *v).unwrap_or(0);
        let request_count = self.serving_stats.get("total_requests").map(|v| *v).unwrap_or(1);

        let new_avg = if request_count <= 1 {
            latency_us
        } else {
            (current_avg * (request_count - 1) + latency_us) / request_count
        };
        self.serving_stats.insert("avg_latency_us".to_string(), new_avg);

        let current_max = self.serving_stats.get("max_latency_us").map(|v| *v).unwrap_or(0);
        if latency_us > current_max {
            self.serving_stats.insert("max_latency_us".to_string(), latency_us);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ServingService {
        let mappings = IdMappings {
            users: IdIndex::build(vec![42, 7]),
            movies: IdIndex::build(vec![1, 2, 3]),
        };
        let model = MovieRecommender::with_seed(2, 3, 4, 9).unwrap();
        let movies = vec![Movie::new(1, "Toy Story (1995)"), Movie::new(3, "Heat (1995)")];
        ServingService::from_parts(model, mappings, &movies, BatchRecommender::new(20, 1000))
    }

    #[tokio::test]
    async fn test_score_translates_raw_ids() {
        let svc = service();
        let direct = svc.model.score(1, 2).unwrap();
        assert_eq!(svc.score(7, 3).await.unwrap(), direct);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_rejected() {
        let svc = service();
        assert!(matches!(svc.score(999, 1).await, Err(RecommenderError::UnknownUser(999))));
        assert!(matches!(svc.score(42, 999).await, Err(RecommenderError::UnknownMovie(999))));
        assert!(matches!(svc.top_k(5).await, Err(RecommenderError::UnknownUser(5))));

        let stats = svc.get_serving_stats();
        assert_eq!(stats["failed_requests"], 3);
        assert_eq!(stats["total_requests"], 3);
    }

    #[tokio::test]
    async fn test_top_k_is_sorted_and_positive() {
        let svc = service();
        let recs = svc.top_k(42).await.unwrap();
        // sigmoid output is always positive, so every known movie is returned
        assert_eq!(recs.len(), 3);
        assert!(recs.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(recs.iter().all(|r| r.score > 0.0));

        let two = recs.iter().find(|r| r.id == 2).unwrap();
        assert_eq!(two.title, "Unknown");
        assert_eq!(svc.get_serving_stats()["recommend_requests"], 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_top_k_matches_direct_ranking() {
        let svc = Arc::new(service());
        let expected = svc
            .recommender
            .recommend_for_user(svc.model.as_ref(), 1, &svc.mappings, &svc.catalog)
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move { svc.top_k(7).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), expected);
        }
        assert_eq!(svc.get_serving_stats()["recommend_requests"], 8);
    }
}
