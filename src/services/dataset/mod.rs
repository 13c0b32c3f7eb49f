use crate::error::{RecResult, RecommenderError};
use crate::models::*;
use crate::utils::validation::validate_rating;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;
use tracing::{info, warn};

/// Fails before anything else happens if the dataset directory is absent.
pub fn ensure_dataset_dir(path: &Path) -> RecResult<()> {
    if !path.is_dir() {
        return Err(RecommenderError::DatasetNotFound(path.to_path_buf()));
    }
    Ok(())
}

pub fn load_movies(path: &Path) -> RecResult<Vec<Movie>> {
    let mut reader = csv::Reader::from_path(path)?;
    let movies = reader
        .deserialize::<Movie>()
        .collect::<Result<Vec<_>, _>>()?;
    info!("Loaded {} movies from {}", movies.len(), path.display());
    Ok(movies)
}

/// Reads at most `max_samples` leading rows of the ratings file.
pub fn load_ratings(path: &Path, max_samples: usize) -> RecResult<Vec<RawRating>> {
    let mut reader = csv::Reader::from_path(path)?;
    let ratings = reader
        .deserialize::<RawRating>()
        .take(max_samples)
        .collect::<Result<Vec<_>, _>>()?;
    info!(
        "Loaded {} ratings (limit {}) from {}",
        ratings.len(),
        max_samples,
        path.display()
    );
    Ok(ratings)
}

/// Indexed training set built from one slice of raw ratings.
#[derive(Debug, Clone)]
pub struct RatingDataset {
    samples: Vec<RatingSample>,
    mappings: IdMappings,
}

impl RatingDataset {
    /// Assigns dense indices in first-seen order and translates every rating.
    pub fn from_ratings(ratings: &[RawRating]) -> RecResult<Self> {
        let mut mappings = IdMappings::default();
        let mut samples = Vec::with_capacity(ratings.len());
        let mut skipped = 0usize;

        for rating in ratings {
            if let Err(e) = validate_rating(rating) {
                warn!("Skipping rating: {}", e);
                skipped += 1;
                continue;
            }
            samples.push(RatingSample {
                user_index: mappings.users.insert(rating.user_id),
                movie_index: mappings.movies.insert(rating.movie_id),
                rating: rating.rating,
            });
        }

        if samples.is_empty() {
            return Err(RecommenderError::EmptyDataset(format!(
                "no usable ratings among {} rows",
                ratings.len()
            )));
        }

        info!(
            "Number of users: {}, Number of movies: {}, samples: {}, skipped: {}",
            mappings.users.len(),
            mappings.movies.len(),
            samples.len(),
            skipped
        );
        Ok(Self { samples, mappings })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_users(&self) -> usize {
        self.mappings.users.len()
    }

    pub fn num_movies(&self) -> usize {
        self.mappings.movies.len()
    }

    pub fn samples(&self) -> &[RatingSample] {
        &self.samples
    }

    pub fn mappings(&self) -> &IdMappings {
        &self.mappings
    }

    pub fn into_mappings(self) -> IdMappings {
        self.mappings
    }

    pub fn num_batches(&self, batch_size: usize) -> usize {
        self.samples.len().div_ceil(batch_size.max(1))
    }

    /// Splits the samples into mini-batches, optionally in a fresh random order.
    pub fn batches<R: Rng + ?Sized>(&self, batch_size: usize, shuffle: bool, rng: &mut R) -> Vec<Batch> {
        let mut order: Vec<usize> = (0..self.samples.len()).collect();
        if shuffle {
            order.shuffle(rng);
        }
        order
            .chunks(batch_size.max(1))
            .map(|chunk| {
                let mut batch = Batch::with_capacity(chunk.len());
                for &i in chunk {
                    let s = self.samples[i];
                    batch.users.push(s.user_index);
                    batch.movies.push(s.movie_index);
                    batch.ratings.push(s.rating);
                }
                batch
            })
            .collect()
    }
}

/// Column-major view of one mini-batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub users: Vec<usize>,
    pub movies: Vec<usize>,
    pub ratings: Vec<f32>,
}

impl Batch {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            users: Vec::with_capacity(n),
            movies: Vec::with_capacity(n),
            ratings: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn ratings() -> Vec<RawRating> {
        vec![
            RawRating::new(10, 500, 4.0),
            RawRating::new(20, 300, 3.5),
            RawRating::new(10, 300, 5.0),
            RawRating::new(30, 500, 1.0),
            RawRating::new(20, 700, 2.0),
        ]
    }

    #[test]
    fn test_indices_follow_first_seen_order() {
        let ds = RatingDataset::from_ratings(&ratings()).unwrap();
        assert_eq!(ds.num_users(), 3);
        assert_eq!(ds.num_movies(), 3);
        assert_eq!(ds.mappings().users.index_of(20), Some(1));
        assert_eq!(ds.mappings().movies.index_of(700), Some(2));
        assert_eq!(
            ds.samples()[2],
            RatingSample { user_index: 0, movie_index: 1, rating: 5.0 }
        );
    }

    #[test]
    fn test_batches_cover_every_sample_once() {
        let ds = RatingDataset::from_ratings(&ratings()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let batches = ds.batches(2, true, &mut rng);
        assert_eq!(batches.len(), 3);
        assert_eq!(ds.num_batches(2), 3);
        assert_eq!(batches[2].len(), 1);

        let seen: HashSet<(usize, usize)> = batches
            .iter()
            .flat_map(|b| b.users.iter().copied().zip(b.movies.iter().copied()))
            .collect();
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_unshuffled_batches_keep_order() {
        let ds = RatingDataset::from_ratings(&ratings()).unwrap();
        let batches = ds.batches(10, false, &mut StdRng::seed_from_u64(0));
        assert_eq!(batches[0].ratings, vec![4.0, 3.5, 5.0, 1.0, 2.0]);
    }

    #[test]
    fn test_empty_and_invalid_ratings() {
        assert!(matches!(
            RatingDataset::from_ratings(&[]),
            Err(RecommenderError::EmptyDataset(_))
        ));
        let ds = RatingDataset::from_ratings(&[
            RawRating::new(1, 1, f32::NAN),
            RawRating::new(2, 2, 3.0),
        ])
        .unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.mappings().users.index_of(1), None);
    }

    #[test]
    fn test_csv_loading_respects_prefix_limit() {
        let dir = tempfile::tempdir().unwrap();
        let ratings_path = dir.path().join("ratings.csv");
        std::fs::write(
            &ratings_path,
            "userId,movieId,rating,timestamp\n1,17,4.0,944249077\n1,25,1.0,944250228\n2,29,2.0,943230976\n",
        )
        .unwrap();
        let movies_path = dir.path().join("movies.csv");
        std::fs::write(
            &movies_path,
            "movieId,title,genres\n1,Toy Story (1995),Adventure|Animation\n2,\"American President, The (1995)\",Comedy\n",
        )
        .unwrap();

        let ratings = load_ratings(&ratings_path, 2).unwrap();
        assert_eq!(ratings, vec![RawRating::new(1, 17, 4.0), RawRating::new(1, 25, 1.0)]);

        let movies = load_movies(&movies_path).unwrap();
        assert_eq!(movies[1].title, "American President, The (1995)");
        assert_eq!(movies[0].genres, "Adventure|Animation");

        assert!(ensure_dataset_dir(dir.path()).is_ok());
        assert!(matches!(
            ensure_dataset_dir(&dir.path().join("ml-32m")),
            Err(RecommenderError::DatasetNotFound(_))
        ));
    }
}
