use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dotenv::dotenv;
use time::OffsetDateTime;
use time::format_description;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use warehouse_sim::{DefaultObserver, Env, SimulationResult, Simulator, VerboseObserver};

fn get_env_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.parse::<T>().ok())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warehouse_sim=info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn timestamp() -> Result<String, Box<dyn std::error::Error>> {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let format = format_description::parse("[year][month][day]-[hour][minute][second]")?;
    Ok(now.format(&format)?)
}

fn write_result(dir: &Path, result: &SimulationResult) -> Result<PathBuf, Box<dyn std::error::Error>> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}_{}_{}.json", result.env_name, result.seed, timestamp()?));
    fs::write(&path, result.to_json()?)?;
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let env_path = env::var("WAREHOUSE_ENV")
        .expect("WAREHOUSE_ENV environment variable is required");
    let output = env::var("WAREHOUSE_OUTPUT").ok().map(PathBuf::from);
    let total = get_env_var::<usize>("WAREHOUSE_TOTAL").unwrap_or(1);
    let concurrent = get_env_var::<usize>("WAREHOUSE_CONCURRENT").unwrap_or(1).max(1);
    let base_seed = get_env_var::<u64>("WAREHOUSE_SEED");
    let verbose = get_env_var::<bool>("WAREHOUSE_VERBOSE").unwrap_or(false);

    let env = Arc::new(Env::load(&env_path)?);
    tracing::info!(
        total,
        concurrent,
        seed = ?base_seed,
        verbose,
        "Running {} replicas of {}",
        total,
        env.name
    );

    let mut started = 0;
    while started < total {
        let batch = concurrent.min(total - started);
        let mut handles = Vec::with_capacity(batch);
        for k in started..started + batch {
            let env = Arc::clone(&env);
            let seed = base_seed.map_or_else(rand::random::<u64>, |base| base.wrapping_add(k as u64));
            handles.push(tokio::spawn(async move {
                let mut sim = if verbose {
                    Simulator::new(env, seed, VerboseObserver::new())
                } else {
                    Simulator::new(env, seed, DefaultObserver)
                };
                sim.run().await
            }));
        }

        for handle in handles {
            let result = handle.await??;
            match &output {
                Some(dir) => {
                    let path = write_result(dir, &result)?;
                    tracing::info!(path = %path.display(), "Result written");
                }
                None => tracing::info!("{}", result.to_json()?),
            }
        }
        started += batch;
    }

    Ok(())
}
