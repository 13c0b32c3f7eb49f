use movierec::algorithms::MovieRecommender;
use movierec::services::dataset::RatingDataset;
use movierec::services::recommendation::BatchRecommender;
use movierec::services::storage::FileCheckpointStore;
use movierec::services::training::Trainer;
use movierec::utils::metrics::InMemoryMetrics;
use movierec::*;

fn main() -> anyhow::Result<()> {
    init_tracing();

    println!("movierec basic usage");

    // 1. A tiny synthetic rating set: even users like even movies.
    let mut ratings = Vec::new();
    for user in 1..=20 {
        for movie in 1..=15 {
            let rating = if user % 2 == movie % 2 { 0.9 } else { 0.1 };
            ratings.push(RawRating::new(user, movie * 100, rating));
        }
    }
    let movies: Vec<Movie> = (1..=15)
        .map(|m| Movie::new(m * 100, format!("Film #{}", m)).with_genres("Drama"))
        .collect();

    // 2. Index the ids and build the model.
    let dataset = RatingDataset::from_ratings(&ratings)?;
    println!(
        "{} ratings, {} users, {} movies",
        dataset.len(),
        dataset.num_users(),
        dataset.num_movies()
    );

    let mut config = Config::default();
    config.model.embedding_dim = 16;
    config.training.batch_size = 64;
    config.training.epochs = 20;
    config.training.seed = Some(42);

    let mut model = MovieRecommender::with_seed(
        dataset.num_users(),
        dataset.num_movies(),
        config.model.embedding_dim,
        42,
    )?;

    // 3. Train, checkpointing into a scratch directory.
    let scratch = std::env::temp_dir().join("movierec-demo");
    let mut store = FileCheckpointStore::new(scratch.join("saved_model.json"));
    let mut metrics = InMemoryMetrics::new();
    let summary = Trainer::new(config.training.clone()).fit(&mut model, &dataset, &mut store, &mut metrics)?;
    println!(
        "trained {} epochs, best loss {:.4} at epoch {:?}, {} checkpoint writes",
        summary.epochs_run,
        summary.best_loss,
        summary.best_epoch.map(|e| e + 1),
        store.writes()
    );

    // 4. Recommend.
    model.eval();
    let table = BatchRecommender::from_config(&config.recommendation).generate(&model, dataset.mappings(), &movies)?;
    for user in [1, 2] {
        println!("\nuser {}:", user);
        for rec in table.get(user).unwrap_or_default().iter().take(5) {
            println!("  {:>6} {:<10} {:.3}", rec.id, rec.title, rec.score);
        }
    }

    Ok(())
}
